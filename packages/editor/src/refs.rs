//! Path, point and range references.
//!
//! A reference is a location registered with the document that is kept up to
//! date as operations are applied. Once the referenced content is removed the
//! reference resolves to `None` for good.

use crate::operations::Operation;
use crate::path::{Affinity, Path};
use crate::point::{Point, Range, RangeAffinity};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathRef(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PointRef(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RangeRef(u64);

#[derive(Debug, Clone)]
enum Tracked {
    Path(Option<Path>, Option<Affinity>),
    Point(Option<Point>, Option<Affinity>),
    Range(Option<Range>, RangeAffinity),
}

impl Tracked {
    fn transform(&mut self, op: &Operation) {
        match self {
            Tracked::Path(current, affinity) => {
                *current = current.take().and_then(|p| p.transform(op, *affinity));
            }
            Tracked::Point(current, affinity) => {
                *current = current.take().and_then(|p| p.transform(op, *affinity));
            }
            Tracked::Range(current, affinity) => {
                *current = current.take().and_then(|r| r.transform(op, *affinity));
            }
        }
    }
}

/// Registry of live references.
#[derive(Debug, Default, Clone)]
pub struct RefRegistry {
    next_id: u64,
    entries: BTreeMap<u64, Tracked>,
}

impl RefRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&mut self, tracked: Tracked) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(id, tracked);
        id
    }

    pub fn path_ref(&mut self, path: Path, affinity: Option<Affinity>) -> PathRef {
        PathRef(self.register(Tracked::Path(Some(path), affinity)))
    }

    pub fn point_ref(&mut self, point: Point, affinity: Option<Affinity>) -> PointRef {
        PointRef(self.register(Tracked::Point(Some(point), affinity)))
    }

    pub fn range_ref(&mut self, range: Range, affinity: RangeAffinity) -> RangeRef {
        RangeRef(self.register(Tracked::Range(Some(range), affinity)))
    }

    pub fn path(&self, r: PathRef) -> Option<Path> {
        match self.entries.get(&r.0) {
            Some(Tracked::Path(current, _)) => current.clone(),
            _ => None,
        }
    }

    pub fn point(&self, r: PointRef) -> Option<Point> {
        match self.entries.get(&r.0) {
            Some(Tracked::Point(current, _)) => current.clone(),
            _ => None,
        }
    }

    pub fn range(&self, r: RangeRef) -> Option<Range> {
        match self.entries.get(&r.0) {
            Some(Tracked::Range(current, _)) => current.clone(),
            _ => None,
        }
    }

    /// Stop tracking a path and return its last value.
    pub fn unref_path(&mut self, r: PathRef) -> Option<Path> {
        let current = self.path(r);
        self.entries.remove(&r.0);
        current
    }

    pub fn unref_point(&mut self, r: PointRef) -> Option<Point> {
        let current = self.point(r);
        self.entries.remove(&r.0);
        current
    }

    pub fn unref_range(&mut self, r: RangeRef) -> Option<Range> {
        let current = self.range(r);
        self.entries.remove(&r.0);
        current
    }

    /// Transform every live reference through `op`.
    pub fn transform(&mut self, op: &Operation) {
        for tracked in self.entries.values_mut() {
            tracked.transform(op);
        }
    }

    /// Mark every reference as unresolvable, e.g. after the content was
    /// replaced wholesale.
    pub fn invalidate(&mut self) {
        for tracked in self.entries.values_mut() {
            match tracked {
                Tracked::Path(current, _) => *current = None,
                Tracked::Point(current, _) => *current = None,
                Tracked::Range(current, _) => *current = None,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;

    #[test]
    fn test_refs_follow_operations() {
        let mut refs = RefRegistry::new();
        let path = refs.path_ref(Path::from([1]), None);
        let point = refs.point_ref(Point::new([1, 0], 2), Some(Affinity::Forward));

        refs.transform(&Operation::InsertNode {
            path: Path::from([0]),
            node: Node::text("x"),
        });
        assert_eq!(refs.path(path), Some(Path::from([2])));
        assert_eq!(refs.point(point), Some(Point::new([2, 0], 2)));

        refs.transform(&Operation::RemoveNode {
            path: Path::from([2]),
            node: Node::text("x"),
        });
        assert_eq!(refs.path(path), None);
        assert_eq!(refs.unref_point(point), None);
        assert_eq!(refs.len(), 1);
    }
}
