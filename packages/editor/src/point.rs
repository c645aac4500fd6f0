//! Points and ranges inside text nodes.

use crate::operations::Operation;
use crate::path::{Affinity, Path};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A location inside a text node: its path plus a character offset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub path: Path,
    pub offset: usize,
}

impl Point {
    pub fn new(path: impl Into<Path>, offset: usize) -> Self {
        Self {
            path: path.into(),
            offset,
        }
    }

    pub fn compare(&self, other: &Point) -> Ordering {
        match self.path.compare(&other.path) {
            Ordering::Equal => self.offset.cmp(&other.offset),
            ord => ord,
        }
    }

    pub fn is_before(&self, other: &Point) -> bool {
        self.compare(other) == Ordering::Less
    }

    pub fn is_after(&self, other: &Point) -> bool {
        self.compare(other) == Ordering::Greater
    }

    /// Transform the point through an operation. `None` means the point was
    /// inside removed content (or, with no affinity, exactly on a split).
    pub fn transform(&self, op: &Operation, affinity: Option<Affinity>) -> Option<Point> {
        let mut p = self.clone();

        match op {
            Operation::InsertNode { .. } | Operation::MoveNode { .. } => {
                p.path = self.path.transform(op, affinity)?;
            }

            Operation::InsertText { path, offset, text } => {
                if path == &self.path
                    && (*offset < self.offset
                        || (*offset == self.offset && affinity == Some(Affinity::Forward)))
                {
                    p.offset += text.len();
                }
            }

            Operation::MergeNode { path, position, .. } => {
                if path == &self.path {
                    p.offset += position;
                }
                p.path = self.path.transform(op, affinity)?;
            }

            Operation::RemoveText { path, offset, text } => {
                if path == &self.path && *offset <= self.offset {
                    p.offset -= (self.offset - offset).min(text.len());
                }
            }

            Operation::RemoveNode { path, .. } => {
                if path == &self.path || path.is_ancestor(&self.path) {
                    return None;
                }
                p.path = self.path.transform(op, affinity)?;
            }

            Operation::SplitNode { path, position, .. } => {
                if path == &self.path {
                    if *position == self.offset && affinity.is_none() {
                        return None;
                    } else if *position < self.offset
                        || (*position == self.offset && affinity == Some(Affinity::Forward))
                    {
                        p.offset -= position;
                        p.path = self.path.transform(op, Some(Affinity::Forward))?;
                    }
                } else {
                    p.path = self.path.transform(op, affinity)?;
                }
            }

            Operation::SetNode { .. } | Operation::SetSelection { .. } => {}
        }

        Some(p)
    }
}

/// How the two ends of a range react to edits exactly at their boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeAffinity {
    Forward,
    Backward,
    /// Shrink towards the inside of the range.
    Inward,
    /// Grow to cover content inserted on the boundary.
    Outward,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub anchor: Point,
    pub focus: Point,
}

impl Range {
    pub fn new(anchor: Point, focus: Point) -> Self {
        Self { anchor, focus }
    }

    pub fn collapsed(point: Point) -> Self {
        Self {
            anchor: point.clone(),
            focus: point,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    pub fn is_backward(&self) -> bool {
        self.anchor.is_after(&self.focus)
    }

    pub fn is_forward(&self) -> bool {
        !self.is_backward()
    }

    /// Start and end in document order.
    pub fn edges(&self) -> (&Point, &Point) {
        if self.is_backward() {
            (&self.focus, &self.anchor)
        } else {
            (&self.anchor, &self.focus)
        }
    }

    pub fn transform(&self, op: &Operation, affinity: RangeAffinity) -> Option<Range> {
        let (anchor_affinity, focus_affinity) = match affinity {
            RangeAffinity::Inward => {
                let collapsed = self.is_collapsed();
                if self.is_forward() {
                    let anchor = Affinity::Forward;
                    (anchor, if collapsed { anchor } else { Affinity::Backward })
                } else {
                    let anchor = Affinity::Backward;
                    (anchor, if collapsed { anchor } else { Affinity::Forward })
                }
            }
            RangeAffinity::Outward => {
                if self.is_forward() {
                    (Affinity::Backward, Affinity::Forward)
                } else {
                    (Affinity::Forward, Affinity::Backward)
                }
            }
            RangeAffinity::Forward => (Affinity::Forward, Affinity::Forward),
            RangeAffinity::Backward => (Affinity::Backward, Affinity::Backward),
        };

        let anchor = self.anchor.transform(op, Some(anchor_affinity))?;
        let focus = self.focus.transform(op, Some(focus_affinity))?;
        Some(Range { anchor, focus })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_transform_insert_text() {
        let op = Operation::InsertText {
            path: Path::from([0, 0]),
            offset: 2,
            text: "xy".into(),
        };
        let at = Point::new([0, 0], 2);
        assert_eq!(at.transform(&op, Some(Affinity::Forward)), Some(Point::new([0, 0], 4)));
        assert_eq!(at.transform(&op, Some(Affinity::Backward)), Some(at.clone()));
        assert_eq!(
            Point::new([0, 0], 5).transform(&op, None),
            Some(Point::new([0, 0], 7))
        );
    }

    #[test]
    fn test_point_transform_remove_text_clamps() {
        let op = Operation::RemoveText {
            path: Path::from([0, 0]),
            offset: 1,
            text: "bcd".into(),
        };
        assert_eq!(
            Point::new([0, 0], 3).transform(&op, None),
            Some(Point::new([0, 0], 1))
        );
        assert_eq!(
            Point::new([0, 0], 6).transform(&op, None),
            Some(Point::new([0, 0], 3))
        );
    }

    #[test]
    fn test_point_transform_split_and_merge() {
        let split = Operation::SplitNode {
            path: Path::from([0, 0]),
            position: 3,
            properties: Default::default(),
        };
        let p = Point::new([0, 0], 5);
        let split_point = p.transform(&split, Some(Affinity::Forward));
        assert_eq!(split_point, Some(Point::new([0, 1], 2)));

        let merge = Operation::MergeNode {
            path: Path::from([0, 1]),
            position: 3,
            properties: Default::default(),
        };
        assert_eq!(split_point.and_then(|p| p.transform(&merge, None)), Some(p));
    }

    #[test]
    fn test_range_inward_affinity() {
        let range = Range::new(Point::new([0, 0], 1), Point::new([0, 0], 3));
        let op = Operation::InsertText {
            path: Path::from([0, 0]),
            offset: 3,
            text: "z".into(),
        };
        let r = range.transform(&op, RangeAffinity::Inward).unwrap();
        assert_eq!(r.focus.offset, 3);

        let r = range.transform(&op, RangeAffinity::Outward).unwrap();
        assert_eq!(r.focus.offset, 4);
    }
}
