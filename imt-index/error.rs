use imt_core::Polarity;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    #[error("invalid branching factor: {0} (must be at least 2)")]
    InvalidBranching(usize),
    #[error("invalid leaf size: {0} (must be > 0)")]
    InvalidLeafSize(usize),
    #[error("invalid hypothesis count: {0} (must be > 0)")]
    InvalidHypotheses(usize),
    #[error("point {point} out of range for {len} descriptors")]
    PointOutOfRange { point: u32, len: usize },
    #[error("point {0} referenced more than once")]
    DuplicatePoint(u32),
    #[error("point {point} is {actual:?} but sits in the {tree:?} tree")]
    WrongPolarity { point: u32, tree: Polarity, actual: Polarity },
    #[error("point {0} not referenced by any leaf")]
    MissingPoint(u32),
    #[error("node {node} references missing child {child}")]
    DanglingChild { node: u32, child: u32 },
    #[error("node {0} reached more than once")]
    SharedNode(u32),
    #[error("node {0} not reachable from the root")]
    UnreachableNode(u32),
    #[error("internal node {0} has no children")]
    EmptyInternal(u32),
}

pub type IndexResult<T> = Result<T, IndexError>;
