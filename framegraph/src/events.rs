//! Outcomes of the coordinate system requests, as delivered to observers.
use crate::graph::FrameId;
use crate::transform::Transform;

/// A computed transform mapping points of `source` into `destination`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformToResult {
    pub transform: Transform,
    pub source: FrameId,
    pub destination: FrameId,
    /// The lowest common ancestor used for the computation, `None` when source is destination.
    pub common_ancestor: Option<FrameId>,
}

/// A transform request that could not produce a transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformToErrorResult {
    pub source: FrameId,
    pub destination: Option<FrameId>,
}

/// A parent link change: `destination` is the child, `source` the parent.
/// On a detach, `source` is the parent that was left, or `None` if there was none.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetTransformResult {
    pub transform: Transform,
    pub source: Option<FrameId>,
    pub destination: FrameId,
    pub is_attach: bool,
}

/// Every outcome a node can report. Invalid requests are only logged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoordinateSystemEvent {
    TransformTo(TransformToResult),
    TransformToNullTarget(TransformToErrorResult),
    TransformToDisconnected(TransformToErrorResult),
    SetTransform(SetTransformResult),
    NullParent { node: FrameId },
    ThisParent { node: FrameId },
    ParentCycle { node: FrameId, rejected_parent: FrameId },
}

impl CoordinateSystemEvent {
    /// The node that emitted the event.
    pub fn node(&self) -> FrameId {
        match self {
            Self::TransformTo(result) => result.source,
            Self::TransformToNullTarget(result) | Self::TransformToDisconnected(result) => {
                result.source
            }
            Self::SetTransform(result) => result.destination,
            Self::NullParent { node }
            | Self::ThisParent { node }
            | Self::ParentCycle { node, .. } => *node,
        }
    }

    pub fn is_error(&self) -> bool {
        !matches!(self, Self::TransformTo(_) | Self::SetTransform(_))
    }
}
