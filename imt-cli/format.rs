//! Binary bundle format, version 1.
//!
//! Little-endian, fixed-width fields:
//!
//! ```text
//! magic "IMTB" | version u32 | descriptor_len u32 | target_count u32
//! per target:
//!   width u32 | height u32 | level_count u32
//!   level_count x (scale f32 | width u32 | height u32 | keypoint_count u32)
//!   keypoints, level order: x f32 | y f32 | strength f32 | angle f32 | polarity u8 | descriptor
//!   bright tree, dark tree: node_count u32, then per node
//!     0u8 | count u32 | count x point u32
//!     1u8 | count u32 | count x (center descriptor | child u32)
//! ```

use imt_core::{Descriptor, Polarity, DESCRIPTOR_BYTES};
use imt_index::{ClusterChild, ClusterNode, ClusterTree, TargetIndex};

use crate::error::{CompileError, CompileResult, FormatError};
use crate::record::{CompiledBundle, LevelRecord, TargetKeypoint, TargetRecord};

pub const MAGIC: [u8; 4] = *b"IMTB";
pub const FORMAT_VERSION: u32 = 1;

const HEADER_BYTES: usize = 16;
const TARGET_MIN_BYTES: usize = 3 * 4 + 2 * 4;
const LEVEL_BYTES: usize = 4 * 4;
const KEYPOINT_BYTES: usize = 4 * 4 + 1 + DESCRIPTOR_BYTES;
const NODE_MIN_BYTES: usize = 1 + 4;
const CHILD_BYTES: usize = DESCRIPTOR_BYTES + 4;

const LEAF_TAG: u8 = 0;
const INTERNAL_TAG: u8 = 1;

struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    fn bytes(&mut self, b: &[u8]) {
        self.buf.extend_from_slice(b);
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn u32(&mut self, v: u32) {
        self.bytes(&v.to_le_bytes());
    }

    fn count(&mut self, v: usize) {
        self.u32(v as u32);
    }

    fn f32(&mut self, v: f32) {
        self.bytes(&v.to_le_bytes());
    }
}

struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], FormatError> {
        if needed > self.remaining() {
            return Err(FormatError::Truncated {
                offset: self.pos,
                needed,
                available: self.remaining(),
            });
        }
        let out = &self.buf[self.pos..self.pos + needed];
        self.pos += needed;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], FormatError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, FormatError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, FormatError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn f32(&mut self) -> Result<f32, FormatError> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    fn descriptor(&mut self) -> Result<Descriptor, FormatError> {
        self.array()
    }

    /// Count field whose items take at least `unit` bytes each; rejected
    /// before anything is allocated if the data cannot hold them
    fn count(&mut self, unit: usize) -> Result<usize, FormatError> {
        let count = self.u32()? as usize;
        let needed = count.saturating_mul(unit);
        if needed > self.remaining() {
            return Err(FormatError::Truncated {
                offset: self.pos,
                needed,
                available: self.remaining(),
            });
        }
        Ok(count)
    }
}

pub fn write_bundle(bundle: &CompiledBundle) -> Vec<u8> {
    let keypoints: usize = bundle.targets.iter().map(TargetRecord::keypoint_count).sum();
    let mut w = ByteWriter::with_capacity(HEADER_BYTES + keypoints * (KEYPOINT_BYTES + 8));

    w.bytes(&MAGIC);
    w.u32(FORMAT_VERSION);
    w.count(DESCRIPTOR_BYTES);
    w.count(bundle.targets.len());

    for target in &bundle.targets {
        w.u32(target.width);
        w.u32(target.height);
        w.count(target.levels.len());
        for level in &target.levels {
            w.f32(level.scale);
            w.u32(level.width);
            w.u32(level.height);
            w.count(level.keypoints.len());
        }
        for (_, kp) in target.keypoints() {
            w.f32(kp.x);
            w.f32(kp.y);
            w.f32(kp.strength);
            w.f32(kp.angle);
            w.u8(kp.polarity.to_u8());
            w.bytes(&kp.descriptor);
        }
        write_tree(&mut w, &target.index.bright);
        write_tree(&mut w, &target.index.dark);
    }

    w.buf
}

fn write_tree(w: &mut ByteWriter, tree: &ClusterTree) {
    w.count(tree.nodes().len());
    for node in tree.nodes() {
        match node {
            ClusterNode::Leaf { points } => {
                w.u8(LEAF_TAG);
                w.count(points.len());
                for &p in points {
                    w.u32(p);
                }
            }
            ClusterNode::Internal { children } => {
                w.u8(INTERNAL_TAG);
                w.count(children.len());
                for child in children {
                    w.bytes(&child.center);
                    w.u32(child.node);
                }
            }
        }
    }
}

pub fn read_bundle(bytes: &[u8]) -> CompileResult<CompiledBundle> {
    let mut r = ByteReader::new(bytes);

    let magic: [u8; 4] = r.array()?;
    if magic != MAGIC {
        return Err(FormatError::BadMagic(magic).into());
    }
    let version = r.u32()?;
    if version != FORMAT_VERSION {
        return Err(CompileError::UnsupportedVersion {
            found: version,
            supported: FORMAT_VERSION,
        });
    }
    let descriptor_len = r.u32()?;
    if descriptor_len as usize != DESCRIPTOR_BYTES {
        return Err(FormatError::DescriptorLength(descriptor_len).into());
    }

    let target_count = r.count(TARGET_MIN_BYTES)?;
    let mut targets = Vec::with_capacity(target_count);
    for t in 0..target_count {
        targets.push(read_target(&mut r, t)?);
    }

    if r.remaining() > 0 {
        return Err(FormatError::TrailingBytes(r.remaining()).into());
    }
    Ok(CompiledBundle { targets })
}

fn read_target(r: &mut ByteReader<'_>, target: usize) -> Result<TargetRecord, FormatError> {
    let width = r.u32()?;
    let height = r.u32()?;

    let level_count = r.count(LEVEL_BYTES)?;
    let mut levels = Vec::with_capacity(level_count);
    let mut counts = Vec::with_capacity(level_count);
    for _ in 0..level_count {
        levels.push(LevelRecord {
            scale: r.f32()?,
            width: r.u32()?,
            height: r.u32()?,
            keypoints: Vec::new(),
        });
        counts.push(r.u32()? as usize);
    }

    for (level, count) in levels.iter_mut().zip(counts) {
        let needed = count.saturating_mul(KEYPOINT_BYTES);
        if needed > r.remaining() {
            return Err(FormatError::Truncated {
                offset: r.pos,
                needed,
                available: r.remaining(),
            });
        }
        level.keypoints.reserve_exact(count);
        for _ in 0..count {
            level.keypoints.push(read_keypoint(r)?);
        }
    }

    let bright = read_tree(r)?;
    let dark = read_tree(r)?;
    let record = TargetRecord {
        width,
        height,
        levels,
        index: TargetIndex { bright, dark },
    };
    record
        .index
        .validate(&record.polarities())
        .map_err(|source| FormatError::Index { target, source })?;
    Ok(record)
}

fn read_keypoint(r: &mut ByteReader<'_>) -> Result<TargetKeypoint, FormatError> {
    let x = r.f32()?;
    let y = r.f32()?;
    let strength = r.f32()?;
    let angle = r.f32()?;
    let code = r.u8()?;
    let polarity = Polarity::from_u8(code).ok_or(FormatError::InvalidPolarity(code))?;
    let descriptor = r.descriptor()?;
    Ok(TargetKeypoint {
        x,
        y,
        strength,
        angle,
        polarity,
        descriptor,
    })
}

fn read_tree(r: &mut ByteReader<'_>) -> Result<ClusterTree, FormatError> {
    let node_count = r.count(NODE_MIN_BYTES)?;
    let mut nodes = Vec::with_capacity(node_count);
    for _ in 0..node_count {
        let node = match r.u8()? {
            LEAF_TAG => {
                let count = r.count(4)?;
                let points = (0..count).map(|_| r.u32()).collect::<Result<Vec<u32>, FormatError>>()?;
                ClusterNode::Leaf { points }
            }
            INTERNAL_TAG => {
                let count = r.count(CHILD_BYTES)?;
                let children = (0..count)
                    .map(|_| -> Result<ClusterChild, FormatError> {
                        Ok(ClusterChild {
                            center: r.descriptor()?,
                            node: r.u32()?,
                        })
                    })
                    .collect::<Result<Vec<_>, FormatError>>()?;
                ClusterNode::Internal { children }
            }
            tag => return Err(FormatError::InvalidNodeTag(tag)),
        };
        nodes.push(node);
    }
    Ok(ClusterTree::from_nodes(nodes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use imt_core::IndexConfig;
    use imt_index::IndexError;
    use proptest::prelude::*;

    fn sample_target(n: usize) -> TargetRecord {
        let keypoints: Vec<TargetKeypoint> = (0..n)
            .map(|i| TargetKeypoint {
                x: 13.0 + i as f32,
                y: 20.5,
                strength: 100.0 - i as f32,
                angle: -1.25 + 0.1 * i as f32,
                polarity: if i % 2 == 0 { Polarity::Bright } else { Polarity::Dark },
                descriptor: [(i * 7) as u8; DESCRIPTOR_BYTES],
            })
            .collect();
        let (first, second) = keypoints.split_at(n / 2);
        let levels = vec![
            LevelRecord {
                scale: 1.0,
                width: 200,
                height: 100,
                keypoints: first.to_vec(),
            },
            LevelRecord {
                scale: 1.26,
                width: 158,
                height: 79,
                keypoints: second.to_vec(),
            },
        ];
        let descriptors: Vec<_> = keypoints.iter().map(|k| k.descriptor).collect();
        let polarities: Vec<_> = keypoints.iter().map(|k| k.polarity).collect();
        TargetRecord {
            width: 200,
            height: 100,
            levels,
            index: TargetIndex::build(&descriptors, &polarities, &IndexConfig::default()).unwrap(),
        }
    }

    #[test]
    fn test_header_layout() {
        let bytes = write_bundle(&CompiledBundle::default());
        assert_eq!(bytes.len(), HEADER_BYTES);
        assert_eq!(&bytes[..4], b"IMTB");
        assert_eq!(&bytes[4..8], &1u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &32u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &0u32.to_le_bytes());
        assert_eq!(read_bundle(&bytes).unwrap(), CompiledBundle::default());
    }

    #[test]
    fn test_keypoint_field_order() {
        let target = sample_target(2);
        let bytes = write_bundle(&CompiledBundle {
            targets: vec![target.clone()],
        });
        // header, target dims, two level entries, then the first keypoint
        let at = HEADER_BYTES + 12 + 2 * LEVEL_BYTES;
        let kp = &target.levels[0].keypoints[0];
        assert_eq!(&bytes[at..at + 4], &kp.x.to_le_bytes());
        assert_eq!(&bytes[at + 12..at + 16], &kp.angle.to_le_bytes());
        assert_eq!(bytes[at + 16], 0);
        assert_eq!(&bytes[at + 17..at + 17 + DESCRIPTOR_BYTES], &kp.descriptor);
    }

    #[test]
    fn test_bundle_survives_export() {
        let bundle = CompiledBundle {
            targets: vec![sample_target(40), sample_target(3)],
        };
        let parsed = read_bundle(&write_bundle(&bundle)).unwrap();
        assert_eq!(parsed, bundle);
    }

    #[test]
    fn test_rejects_bad_magic_and_descriptor_length() {
        let mut bytes = write_bundle(&CompiledBundle::default());
        bytes[0] = b'X';
        assert!(matches!(
            read_bundle(&bytes),
            Err(CompileError::Format(FormatError::BadMagic(_)))
        ));

        let mut bytes = write_bundle(&CompiledBundle::default());
        bytes[8..12].copy_from_slice(&64u32.to_le_bytes());
        assert!(matches!(
            read_bundle(&bytes),
            Err(CompileError::Format(FormatError::DescriptorLength(64)))
        ));
    }

    #[test]
    fn test_rejects_bad_polarity_and_trailing_bytes() {
        let bundle = CompiledBundle {
            targets: vec![sample_target(2)],
        };
        let mut bytes = write_bundle(&bundle);
        let at = HEADER_BYTES + 12 + 2 * LEVEL_BYTES + 16;
        bytes[at] = 9;
        assert!(matches!(
            read_bundle(&bytes),
            Err(CompileError::Format(FormatError::InvalidPolarity(9)))
        ));

        let mut bytes = write_bundle(&bundle);
        bytes.push(0);
        assert!(matches!(
            read_bundle(&bytes),
            Err(CompileError::Format(FormatError::TrailingBytes(1)))
        ));
    }

    #[test]
    fn test_huge_counts_do_not_allocate() {
        let mut bytes = write_bundle(&CompiledBundle::default());
        bytes[12..16].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            read_bundle(&bytes),
            Err(CompileError::Format(FormatError::Truncated { .. }))
        ));
    }

    #[test]
    fn test_every_truncation_is_an_error() {
        let bytes = write_bundle(&CompiledBundle {
            targets: vec![sample_target(30)],
        });
        for len in 0..bytes.len() {
            assert!(read_bundle(&bytes[..len]).is_err(), "prefix of {len} bytes parsed");
        }
    }

    #[test]
    fn test_broken_index_is_rejected() {
        let mut target = sample_target(4);
        target.index.dark = ClusterTree::from_nodes(vec![ClusterNode::Leaf { points: vec![0, 1] }]);
        let bytes = write_bundle(&CompiledBundle {
            targets: vec![target],
        });
        assert!(matches!(
            read_bundle(&bytes),
            Err(CompileError::Format(FormatError::Index { target: 0, .. }))
        ));
    }

    #[test]
    fn test_swapped_polarity_trees_are_rejected() {
        let mut target = sample_target(8);
        std::mem::swap(&mut target.index.bright, &mut target.index.dark);
        let bytes = write_bundle(&CompiledBundle {
            targets: vec![target],
        });
        assert!(matches!(
            read_bundle(&bytes),
            Err(CompileError::Format(FormatError::Index {
                target: 0,
                source: IndexError::WrongPolarity { .. },
            }))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn arbitrary_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            let _ = read_bundle(&bytes);
        }

        #[test]
        fn corrupted_byte_is_rejected_or_parsed(pos in any::<usize>(), value in any::<u8>()) {
            let mut bytes = write_bundle(&CompiledBundle {
                targets: vec![sample_target(12)],
            });
            let at = pos % bytes.len();
            bytes[at] = value;
            if let Ok(parsed) = read_bundle(&bytes) {
                let target = &parsed.targets[0];
                prop_assert!(target.index.validate(&target.polarities()).is_ok());
            }
        }
    }
}
