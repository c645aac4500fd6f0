//! # Paths
//!
//! A [`Path`] is the list of child indices leading from the document root to
//! a node. Paths are positional, not identities: any structural operation may
//! shift them, so they are recomputed with [`Path::transform`] instead of
//! being cached.

use crate::operations::Operation;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Deref, DerefMut};

/// Which side of a split a path or point sticks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Affinity {
    Forward,
    Backward,
}

/// Child-index path from the document root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(pub Vec<usize>);

impl Path {
    pub fn new(indices: Vec<usize>) -> Self {
        Self(indices)
    }

    /// The empty path, addressing the document root.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Index of the node within its parent.
    pub fn last(&self) -> Option<usize> {
        self.0.last().copied()
    }

    pub fn parent(&self) -> Option<Path> {
        if self.0.is_empty() {
            return None;
        }
        Some(Path(self.0[..self.0.len() - 1].to_vec()))
    }

    pub fn child(&self, index: usize) -> Path {
        let mut indices = self.0.clone();
        indices.push(index);
        Path(indices)
    }

    /// Path of the next sibling. The root has no siblings and maps to itself.
    pub fn next(&self) -> Path {
        let mut p = self.clone();
        if let Some(last) = p.0.last_mut() {
            *last += 1;
        }
        p
    }

    /// Path of the previous sibling, if there is one.
    pub fn previous(&self) -> Option<Path> {
        match self.0.last() {
            Some(&last) if last > 0 => {
                let mut p = self.clone();
                if let Some(l) = p.0.last_mut() {
                    *l = last - 1;
                }
                Some(p)
            }
            _ => None,
        }
    }

    pub fn has_previous(&self) -> bool {
        matches!(self.0.last(), Some(&last) if last > 0)
    }

    /// Compare two paths in document order. Ancestors compare equal to
    /// their descendants.
    pub fn compare(&self, other: &Path) -> Ordering {
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            match a.cmp(b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }

    pub fn is_before(&self, other: &Path) -> bool {
        self.compare(other) == Ordering::Less
    }

    pub fn is_after(&self, other: &Path) -> bool {
        self.compare(other) == Ordering::Greater
    }

    pub fn is_ancestor(&self, other: &Path) -> bool {
        self.0.len() < other.0.len() && self.compare(other) == Ordering::Equal
    }

    pub fn is_sibling(&self, other: &Path) -> bool {
        if self.0.is_empty() || self.0.len() != other.0.len() {
            return false;
        }
        let n = self.0.len() - 1;
        self.0[..n] == other.0[..n] && self.0[n] != other.0[n]
    }

    /// True when `self` ends before `other` at the same level, i.e. `self`
    /// is an earlier sibling of `other` or of one of its ancestors.
    pub fn ends_before(&self, other: &Path) -> bool {
        if self.0.is_empty() || other.0.len() < self.0.len() {
            return false;
        }
        let i = self.0.len() - 1;
        self.0[..i] == other.0[..i] && self.0[i] < other.0[i]
    }

    /// Longest shared prefix.
    pub fn common(&self, other: &Path) -> Path {
        Path(
            self.0
                .iter()
                .zip(other.0.iter())
                .take_while(|(a, b)| a == b)
                .map(|(a, _)| *a)
                .collect(),
        )
    }

    /// Transform this path through an operation. Returns `None` when the
    /// addressed node no longer exists afterwards.
    pub fn transform(&self, op: &Operation, affinity: Option<Affinity>) -> Option<Path> {
        let mut p = self.clone();
        if p.0.is_empty() {
            return Some(p);
        }

        match op {
            Operation::InsertNode { path: op, .. } => {
                if op == &p || op.ends_before(&p) || op.is_ancestor(&p) {
                    p.0[op.len() - 1] += 1;
                }
            }

            Operation::RemoveNode { path: op, .. } => {
                if op == &p || op.is_ancestor(&p) {
                    return None;
                } else if op.ends_before(&p) {
                    p.0[op.len() - 1] -= 1;
                }
            }

            Operation::MergeNode { path: op, position, .. } => {
                if op == &p || op.ends_before(&p) {
                    p.0[op.len() - 1] -= 1;
                } else if op.is_ancestor(&p) {
                    p.0[op.len() - 1] -= 1;
                    p.0[op.len()] += position;
                }
            }

            Operation::SplitNode { path: op, position, .. } => {
                if op == &p {
                    match affinity {
                        Some(Affinity::Forward) => {
                            let n = p.0.len() - 1;
                            p.0[n] += 1;
                        }
                        Some(Affinity::Backward) => {}
                        None => return None,
                    }
                } else if op.ends_before(&p) {
                    p.0[op.len() - 1] += 1;
                } else if op.is_ancestor(&p) && self.0[op.len()] >= *position {
                    p.0[op.len() - 1] += 1;
                    p.0[op.len()] -= position;
                }
            }

            Operation::MoveNode { path: op, new_path: onp } => {
                if op == onp {
                    return Some(p);
                }

                if op.is_ancestor(&p) || op == &p {
                    let mut copy = onp.clone();
                    if op.ends_before(onp) && op.len() < onp.len() {
                        copy.0[op.len() - 1] -= 1;
                    }
                    copy.0.extend_from_slice(&p.0[op.len()..]);
                    return Some(copy);
                } else if op.is_sibling(onp) && (onp.is_ancestor(&p) || onp == &p) {
                    if op.ends_before(&p) {
                        p.0[op.len() - 1] -= 1;
                    } else {
                        p.0[op.len() - 1] += 1;
                    }
                } else if onp.ends_before(&p) || onp == &p || onp.is_ancestor(&p) {
                    if op.ends_before(&p) {
                        p.0[op.len() - 1] -= 1;
                    }
                    p.0[onp.len() - 1] += 1;
                } else if op.ends_before(&p) {
                    if onp == &p {
                        p.0[onp.len() - 1] += 1;
                    }
                    p.0[op.len() - 1] -= 1;
                }
            }

            Operation::InsertText { .. }
            | Operation::RemoveText { .. }
            | Operation::SetNode { .. }
            | Operation::SetSelection { .. } => {}
        }

        Some(p)
    }
}

impl Deref for Path {
    type Target = Vec<usize>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Path {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Vec<usize>> for Path {
    fn from(indices: Vec<usize>) -> Self {
        Path(indices)
    }
}

impl From<&[usize]> for Path {
    fn from(indices: &[usize]) -> Self {
        Path(indices.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for Path {
    fn from(indices: [usize; N]) -> Self {
        Path(indices.to_vec())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;

    #[test]
    fn test_path_relations() {
        let a = Path::from([0, 1]);
        let b = Path::from([0, 1, 2]);
        let c = Path::from([0, 2]);

        assert!(a.is_ancestor(&b));
        assert!(!b.is_ancestor(&a));
        assert!(a.is_sibling(&c));
        assert!(a.ends_before(&c));
        assert!(a.ends_before(&Path::from([0, 2, 5])));
        assert!(!c.ends_before(&b));
        assert_eq!(a.compare(&b), Ordering::Equal);
        assert_eq!(a.common(&c), Path::from([0]));
        assert_eq!(c.previous(), Some(a.clone()));
        assert_eq!(Path::from([0, 0]).previous(), None);
        assert_eq!(b.parent(), Some(a));
    }

    #[test]
    fn test_transform_insert_and_remove() {
        let insert = Operation::InsertNode {
            path: Path::from([1]),
            node: Node::text(""),
        };
        assert_eq!(Path::from([1, 0]).transform(&insert, None), Some(Path::from([2, 0])));
        assert_eq!(Path::from([0, 3]).transform(&insert, None), Some(Path::from([0, 3])));

        let remove = Operation::RemoveNode {
            path: Path::from([1]),
            node: Node::text(""),
        };
        assert_eq!(Path::from([1, 0]).transform(&remove, None), None);
        assert_eq!(Path::from([2]).transform(&remove, None), Some(Path::from([1])));
    }

    #[test]
    fn test_transform_split_respects_affinity() {
        let split = Operation::SplitNode {
            path: Path::from([0, 0]),
            position: 2,
            properties: Default::default(),
        };
        let p = Path::from([0, 0]);
        assert_eq!(p.transform(&split, Some(Affinity::Forward)), Some(Path::from([0, 1])));
        assert_eq!(p.transform(&split, Some(Affinity::Backward)), Some(p.clone()));
        assert_eq!(p.transform(&split, None), None);

        let element_split = Operation::SplitNode {
            path: Path::from([0]),
            position: 1,
            properties: Default::default(),
        };
        assert_eq!(
            Path::from([0, 2]).transform(&element_split, Some(Affinity::Forward)),
            Some(Path::from([1, 1]))
        );
    }

    #[test]
    fn test_transform_move_between_parents() {
        let op = Operation::MoveNode {
            path: Path::from([0, 1]),
            new_path: Path::from([2, 0]),
        };
        assert_eq!(Path::from([0, 1, 3]).transform(&op, None), Some(Path::from([2, 0, 3])));
        assert_eq!(Path::from([0, 2]).transform(&op, None), Some(Path::from([0, 1])));
        assert_eq!(Path::from([2, 0]).transform(&op, None), Some(Path::from([2, 1])));
    }
}
