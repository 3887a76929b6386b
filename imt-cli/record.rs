use imt_core::{Descriptor, Polarity};
use imt_index::TargetIndex;

use crate::error::CompileResult;
use crate::format;

/// Keypoint as stored in a target, coordinates local to its level
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetKeypoint {
    pub x: f32,
    pub y: f32,
    /// Detector response
    pub strength: f32,
    pub angle: f32,
    pub polarity: Polarity,
    pub descriptor: Descriptor,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LevelRecord {
    /// Input size divided by level size
    pub scale: f32,
    pub width: u32,
    pub height: u32,
    pub keypoints: Vec<TargetKeypoint>,
}

/// Everything the tracker needs about one reference image
#[derive(Debug, Clone, PartialEq)]
pub struct TargetRecord {
    pub width: u32,
    pub height: u32,
    pub levels: Vec<LevelRecord>,
    /// Leaves reference keypoints by level-major ordinal
    pub index: TargetIndex,
}

impl TargetRecord {
    pub fn keypoint_count(&self) -> usize {
        self.levels.iter().map(|l| l.keypoints.len()).sum()
    }

    /// Keypoints in ordinal order with their level
    pub fn keypoints(&self) -> impl Iterator<Item = (usize, &TargetKeypoint)> + '_ {
        self.levels
            .iter()
            .enumerate()
            .flat_map(|(level, l)| l.keypoints.iter().map(move |kp| (level, kp)))
    }

    pub fn descriptors(&self) -> Vec<Descriptor> {
        self.keypoints().map(|(_, kp)| kp.descriptor).collect()
    }

    pub fn polarities(&self) -> Vec<Polarity> {
        self.keypoints().map(|(_, kp)| kp.polarity).collect()
    }

    /// Closest stored keypoint of the same polarity, with its level and Hamming distance
    pub fn lookup(
        &self,
        query: &Descriptor,
        polarity: Polarity,
        max_leaves: usize,
    ) -> Option<(usize, TargetKeypoint, u32)> {
        let descriptors = self.descriptors();
        let hit = self.index.nearest(query, polarity, &descriptors, max_leaves)?;
        let (level, kp) = self.keypoints().nth(hit.point as usize)?;
        Some((level, *kp, hit.distance))
    }
}

/// Ordered targets, one per input image
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledBundle {
    pub targets: Vec<TargetRecord>,
}

impl CompiledBundle {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Export in the current binary format
    pub fn to_bytes(&self) -> Vec<u8> {
        format::write_bundle(self)
    }

    /// Parse and validate an exported bundle
    pub fn from_bytes(bytes: &[u8]) -> CompileResult<Self> {
        format::read_bundle(bytes)
    }
}
