use std::cmp::Reverse;
use std::collections::BinaryHeap;

use imt_core::{hamming_distance, Descriptor, IndexConfig};

use crate::error::{IndexError, IndexResult};
use crate::rng::SplitMix64;

pub type NodeId = u32;

/// Branch of an internal node: medoid descriptor and the subtree it heads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterChild {
    pub center: Descriptor,
    pub node: NodeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterNode {
    /// References into the target's descriptor list
    Leaf { points: Vec<u32> },
    Internal { children: Vec<ClusterChild> },
}

/// Result of a lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Neighbor {
    pub distance: u32,
    pub point: u32,
}

/// Hierarchical k-medoids tree stored as an arena; node 0 is the root.
///
/// An empty arena is a tree over zero points.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClusterTree {
    nodes: Vec<ClusterNode>,
}

struct Split {
    cost: u64,
    centers: Vec<u32>,
    assignment: Vec<usize>,
}

impl ClusterTree {
    pub fn validate_config(cfg: &IndexConfig) -> IndexResult<()> {
        if cfg.branching < 2 {
            return Err(IndexError::InvalidBranching(cfg.branching));
        }
        if cfg.leaf_size == 0 {
            return Err(IndexError::InvalidLeafSize(cfg.leaf_size));
        }
        if cfg.hypotheses == 0 {
            return Err(IndexError::InvalidHypotheses(cfg.hypotheses));
        }
        Ok(())
    }

    /// Cluster the points `ids` (indices into `descriptors`).
    ///
    /// The generator is seeded from `cfg.seed` for every tree, so the result
    /// depends only on the descriptors, the id order and the config.
    pub fn build(descriptors: &[Descriptor], ids: &[u32], cfg: &IndexConfig) -> IndexResult<Self> {
        Self::validate_config(cfg)?;
        if let Some(&point) = ids.iter().find(|&&id| id as usize >= descriptors.len()) {
            return Err(IndexError::PointOutOfRange {
                point,
                len: descriptors.len(),
            });
        }
        if ids.is_empty() {
            return Ok(Self::default());
        }

        let mut rng = SplitMix64::new(cfg.seed);
        let mut nodes = vec![ClusterNode::Leaf { points: Vec::new() }];
        let mut pending: Vec<(NodeId, Vec<u32>)> = vec![(0, ids.to_vec())];

        while let Some((node_id, members)) = pending.pop() {
            let slot = node_id as usize;
            if members.len() <= cfg.leaf_size {
                nodes[slot] = ClusterNode::Leaf { points: members };
                continue;
            }

            let split = Self::best_split(descriptors, &members, cfg, &mut rng);

            let mut groups: Vec<Vec<u32>> = vec![Vec::new(); split.centers.len()];
            for (&point, &cluster) in members.iter().zip(&split.assignment) {
                groups[cluster].push(point);
            }

            let non_empty = groups.iter().filter(|g| !g.is_empty()).count();
            if non_empty < 2 {
                // Every point is identical to one medoid
                nodes[slot] = ClusterNode::Leaf { points: members };
                continue;
            }

            let mut children = Vec::with_capacity(non_empty);
            for (center, group) in split.centers.iter().zip(groups) {
                if group.is_empty() {
                    continue;
                }
                let child = nodes.len() as NodeId;
                nodes.push(ClusterNode::Leaf { points: Vec::new() });
                children.push(ClusterChild {
                    center: descriptors[*center as usize],
                    node: child,
                });
                pending.push((child, group));
            }
            nodes[slot] = ClusterNode::Internal { children };
        }

        Ok(Self { nodes })
    }

    /// Try `hypotheses` random medoid sets and keep the cheapest assignment
    fn best_split(descriptors: &[Descriptor], members: &[u32], cfg: &IndexConfig, rng: &mut SplitMix64) -> Split {
        let k = cfg.branching.min(members.len());
        let mut best: Option<Split> = None;
        let mut positions: Vec<usize> = (0..members.len()).collect();

        for _ in 0..cfg.hypotheses {
            // Partial Fisher-Yates over member positions
            for i in 0..k {
                let j = i + rng.below(members.len() - i);
                positions.swap(i, j);
            }
            let centers: Vec<u32> = positions[..k].iter().map(|&p| members[p]).collect();

            let mut cost = 0u64;
            let assignment: Vec<usize> = members
                .iter()
                .map(|&point| {
                    let d = &descriptors[point as usize];
                    let (cluster, dist) = centers
                        .iter()
                        .enumerate()
                        .map(|(c, &center)| (c, hamming_distance(d, &descriptors[center as usize])))
                        .min_by_key(|&(c, dist)| (dist, c))
                        .unwrap_or((0, 0));
                    cost += dist as u64;
                    cluster
                })
                .collect();

            if best.as_ref().map_or(true, |b| cost < b.cost) {
                best = Some(Split {
                    cost,
                    centers,
                    assignment,
                });
            }
        }

        best.unwrap_or(Split {
            cost: 0,
            centers: vec![members[0]],
            assignment: vec![0; members.len()],
        })
    }

    /// Rebuild from a decoded arena; call [`ClusterTree::validate`] before use
    pub fn from_nodes(nodes: Vec<ClusterNode>) -> Self {
        Self { nodes }
    }

    pub fn nodes(&self) -> &[ClusterNode] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of points referenced by leaves
    pub fn point_count(&self) -> usize {
        self.nodes
            .iter()
            .map(|n| match n {
                ClusterNode::Leaf { points } => points.len(),
                ClusterNode::Internal { .. } => 0,
            })
            .sum()
    }

    pub fn depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }
        let mut deepest = 0;
        let mut stack = vec![(0 as NodeId, 1usize)];
        while let Some((id, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            if let Some(ClusterNode::Internal { children }) = self.nodes.get(id as usize) {
                stack.extend(children.iter().map(|c| (c.node, depth + 1)));
            }
        }
        deepest
    }

    /// Check the arena is a tree rooted at 0 over distinct points `< point_count`
    pub fn validate(&self, point_count: usize) -> IndexResult<()> {
        if self.nodes.is_empty() {
            return Ok(());
        }

        let mut seen_node = vec![false; self.nodes.len()];
        let mut seen_point = vec![false; point_count];
        let mut stack: Vec<NodeId> = vec![0];
        seen_node[0] = true;

        while let Some(id) = stack.pop() {
            match &self.nodes[id as usize] {
                ClusterNode::Leaf { points } => {
                    for &point in points {
                        let slot = seen_point.get_mut(point as usize).ok_or(IndexError::PointOutOfRange {
                            point,
                            len: point_count,
                        })?;
                        if *slot {
                            return Err(IndexError::DuplicatePoint(point));
                        }
                        *slot = true;
                    }
                }
                ClusterNode::Internal { children } => {
                    if children.is_empty() {
                        return Err(IndexError::EmptyInternal(id));
                    }
                    for child in children {
                        let seen = seen_node.get_mut(child.node as usize).ok_or(IndexError::DanglingChild {
                            node: id,
                            child: child.node,
                        })?;
                        if *seen {
                            return Err(IndexError::SharedNode(child.node));
                        }
                        *seen = true;
                        stack.push(child.node);
                    }
                }
            }
        }

        if let Some(unreached) = seen_node.iter().position(|&s| !s) {
            return Err(IndexError::UnreachableNode(unreached as NodeId));
        }
        Ok(())
    }

    /// Best-bin-first search for the `k` nearest points.
    ///
    /// Branches are explored in order of Hamming distance to their medoid;
    /// the search stops after `max_leaves` leaves (`usize::MAX` for an exact
    /// answer). Results are sorted by distance, then point.
    pub fn search(&self, query: &Descriptor, descriptors: &[Descriptor], k: usize, max_leaves: usize) -> Vec<Neighbor> {
        if self.nodes.is_empty() || k == 0 || max_leaves == 0 {
            return Vec::new();
        }

        let mut best: Vec<Neighbor> = Vec::with_capacity(k + 1);
        let mut frontier = BinaryHeap::new();
        frontier.push(Reverse((0u32, 0 as NodeId)));
        let mut leaves = 0usize;

        while let Some(Reverse((_, id))) = frontier.pop() {
            match self.nodes.get(id as usize) {
                Some(ClusterNode::Leaf { points }) => {
                    for &point in points {
                        let Some(d) = descriptors.get(point as usize) else {
                            continue;
                        };
                        let candidate = Neighbor {
                            distance: hamming_distance(query, d),
                            point,
                        };
                        let at = best.partition_point(|n| *n < candidate);
                        if at < k {
                            best.insert(at, candidate);
                            best.truncate(k);
                        }
                    }
                    leaves += 1;
                    if leaves >= max_leaves {
                        break;
                    }
                }
                Some(ClusterNode::Internal { children }) => {
                    for child in children {
                        frontier.push(Reverse((hamming_distance(query, &child.center), child.node)));
                    }
                }
                None => {}
            }
        }

        best
    }

    pub fn nearest(&self, query: &Descriptor, descriptors: &[Descriptor], max_leaves: usize) -> Option<Neighbor> {
        self.search(query, descriptors, 1, max_leaves).into_iter().next()
    }
}
