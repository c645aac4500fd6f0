//! # Normalization
//!
//! Operations can leave the tree in shapes the editor does not want to keep
//! around, e.g. two adjacent text leaves with the same marks. Normalizers
//! inspect one child list at a time and propose the next fixing operation.
//!
//! ## Design
//!
//! - **One step at a time**: a normalizer returns a single operation; the
//!   document applies it and asks again, so every fix is an ordinary,
//!   invertible operation (and therefore shows up in history and sync)
//! - **Fixpoint**: normalization stops when no normalizer proposes anything
//! - **Bounded**: a runaway normalizer is reported as an error instead of
//!   looping forever

use crate::node::{Node, Properties};
use crate::operations::Operation;
use crate::path::Path;

/// Passes per node before normalization is considered runaway.
pub const ITERATIONS_PER_NODE: usize = 42;

/// A rule that keeps child lists in canonical shape.
pub trait Normalizer: std::fmt::Debug {
    /// Next operation needed to fix the children of the node at `parent`
    /// (the root list for the empty path), if any.
    fn normalize(&self, parent: &Path, children: &[Node]) -> Option<Operation>;
}

/// Merge adjacent texts with equal marks and drop empty texts next to other
/// texts.
#[derive(Debug)]
pub struct MergeAdjacentTexts;

impl Normalizer for MergeAdjacentTexts {
    fn normalize(&self, parent: &Path, children: &[Node]) -> Option<Operation> {
        for (i, pair) in children.windows(2).enumerate() {
            let (Node::Text(prev), Node::Text(current)) = (&pair[0], &pair[1]) else {
                continue;
            };
            let index = i + 1;

            if prev.properties == current.properties {
                return Some(Operation::MergeNode {
                    path: parent.child(index),
                    position: prev.text.len(),
                    properties: current.properties.clone(),
                });
            }
            if prev.text.is_empty() {
                return Some(Operation::RemoveNode {
                    path: parent.child(i),
                    node: pair[0].clone(),
                });
            }
            if current.text.is_empty() {
                return Some(Operation::RemoveNode {
                    path: parent.child(index),
                    node: pair[1].clone(),
                });
            }
        }
        None
    }
}

/// Elements always hold at least one child; an empty element gets an empty
/// text leaf.
#[derive(Debug)]
pub struct EnsureChildren;

impl Normalizer for EnsureChildren {
    fn normalize(&self, parent: &Path, children: &[Node]) -> Option<Operation> {
        if parent.is_root() || !children.is_empty() {
            return None;
        }
        Some(Operation::InsertNode {
            path: parent.child(0),
            node: Node::Text(crate::node::Text {
                text: String::new(),
                properties: Properties::new(),
            }),
        })
    }
}

/// Runs all registered normalizers over a tree.
#[derive(Debug)]
pub struct NormalizerEngine {
    normalizers: Vec<Box<dyn Normalizer>>,
}

impl NormalizerEngine {
    /// Create engine with default normalizers
    pub fn new() -> Self {
        Self {
            normalizers: vec![Box::new(EnsureChildren), Box::new(MergeAdjacentTexts)],
        }
    }

    /// Engine without any rules.
    pub fn empty() -> Self {
        Self {
            normalizers: Vec::new(),
        }
    }

    pub fn register(&mut self, normalizer: Box<dyn Normalizer>) {
        self.normalizers.push(normalizer);
    }

    pub fn len(&self) -> usize {
        self.normalizers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.normalizers.is_empty()
    }

    /// First fixing operation found in a depth-first walk, deepest lists
    /// first.
    pub fn next_operation(&self, root: &[Node]) -> Option<Operation> {
        self.visit(&Path::root(), root)
    }

    fn visit(&self, parent: &Path, children: &[Node]) -> Option<Operation> {
        for (i, child) in children.iter().enumerate() {
            if let Node::Element(e) = child {
                if let Some(op) = self.visit(&parent.child(i), &e.children) {
                    return Some(op);
                }
            }
        }
        self.normalizers
            .iter()
            .find_map(|n| n.normalize(parent, children))
    }
}

impl Default for NormalizerEngine {
    fn default() -> Self {
        Self::new()
    }
}
