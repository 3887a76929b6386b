//! Matching index over a target's binary descriptors.
//!
//! Bright and dark keypoints never match each other, so every polarity gets
//! its own [`ClusterTree`]. Leaves reference keypoints by their ordinal in
//! the target (level-major).

pub mod error;
mod rng;
pub mod tree;

use imt_core::{Descriptor, IndexConfig, Polarity};
use log::debug;

pub use error::{IndexError, IndexResult};
pub use tree::{ClusterChild, ClusterNode, ClusterTree, Neighbor, NodeId};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TargetIndex {
    pub bright: ClusterTree,
    pub dark: ClusterTree,
}

impl TargetIndex {
    /// `polarities[i]` is the polarity of `descriptors[i]`
    pub fn build(descriptors: &[Descriptor], polarities: &[Polarity], cfg: &IndexConfig) -> IndexResult<Self> {
        let ids_of = |wanted: Polarity| -> Vec<u32> {
            polarities
                .iter()
                .enumerate()
                .filter(|(_, &p)| p == wanted)
                .map(|(i, _)| i as u32)
                .collect()
        };

        let bright = ClusterTree::build(descriptors, &ids_of(Polarity::Bright), cfg)?;
        let dark = ClusterTree::build(descriptors, &ids_of(Polarity::Dark), cfg)?;

        debug!(
            "index: {} bright points in {} nodes (depth {}), {} dark points in {} nodes (depth {})",
            bright.point_count(),
            bright.nodes().len(),
            bright.depth(),
            dark.point_count(),
            dark.nodes().len(),
            dark.depth()
        );

        Ok(Self { bright, dark })
    }

    pub fn tree(&self, polarity: Polarity) -> &ClusterTree {
        match polarity {
            Polarity::Bright => &self.bright,
            Polarity::Dark => &self.dark,
        }
    }

    /// Both trees together cover each point exactly once, and each tree
    /// only holds points of its own polarity. `polarities[i]` is the
    /// polarity of point `i`.
    pub fn validate(&self, polarities: &[Polarity]) -> IndexResult<()> {
        let point_count = polarities.len();
        self.bright.validate(point_count)?;
        self.dark.validate(point_count)?;

        let mut seen = vec![false; point_count];
        for (tree, polarity) in [(&self.bright, Polarity::Bright), (&self.dark, Polarity::Dark)] {
            for node in tree.nodes() {
                if let ClusterNode::Leaf { points } = node {
                    for &p in points {
                        // in range, checked per tree above
                        if std::mem::replace(&mut seen[p as usize], true) {
                            return Err(IndexError::DuplicatePoint(p));
                        }
                        let actual = polarities[p as usize];
                        if actual != polarity {
                            return Err(IndexError::WrongPolarity {
                                point: p,
                                tree: polarity,
                                actual,
                            });
                        }
                    }
                }
            }
        }
        match seen.iter().position(|&s| !s) {
            Some(missing) => Err(IndexError::MissingPoint(missing as u32)),
            None => Ok(()),
        }
    }

    pub fn nearest(
        &self,
        query: &Descriptor,
        polarity: Polarity,
        descriptors: &[Descriptor],
        max_leaves: usize,
    ) -> Option<Neighbor> {
        self.tree(polarity).nearest(query, descriptors, max_leaves)
    }
}
