//! A coordinate system node and the protocol its requests go through.
//!
//! Every request is turned into an input of the node's own state machine. The machine decides
//! which action runs, and the action reports the outcome to the node's observers as a
//! [`CoordinateSystemEvent`]. Pairs that make no sense (updating the transform of a root, an
//! ancestor search result outside of a search) run [`CoordinateSystemAction::InvalidRequest`],
//! which only logs.
use crate::events::{
    CoordinateSystemEvent, SetTransformResult, TransformToErrorResult, TransformToResult,
};
use crate::graph::{FrameGraph, FrameId, Observer, ObserverId};
use crate::transform::Transform;
use compact_str::CompactString;
use framegraph_fsm::{process_inputs, StateMachine, StateMachineOwner};
use log::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoordinateSystemState {
    /// No parent.
    Initialized,
    ParentSet,
    /// Ancestor search running for a node with a parent.
    AttemptingComputeTransformTo,
    /// Ancestor search running for a root.
    AttemptingComputeTransformToInInitialized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoordinateSystemInput {
    NullCoordinateSystem,
    ThisCoordinateSystem,
    ValidCoordinateSystem,
    NullParent,
    ThisParent,
    ValidParent,
    AncestorFound,
    Disconnected,
    ParentCausesCycle,
    UpdateTransformToParent,
    DetachFromParent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateSystemAction {
    SetTransformAndParent,
    SetTransformAndParentNullParent,
    SetTransformAndParentThisParent,
    SetTransformAndParentCycle,
    UpdateTransformToParent,
    ComputeTransformToNullTarget,
    ComputeTransformToThisTarget,
    ComputeTransformToValidTarget,
    ComputeTransformToAncestorFound,
    ComputeTransformToDisconnected,
    DetachFromParent,
    InvalidRequest,
}

pub type CoordinateSystemStateMachine =
    StateMachine<CoordinateSystemState, CoordinateSystemInput, CoordinateSystemAction>;

/// Builds the protocol every coordinate system runs, ready to run in `Initialized`.
pub fn coordinate_system_state_machine() -> CoordinateSystemStateMachine {
    use CoordinateSystemAction as A;
    use CoordinateSystemInput as I;
    use CoordinateSystemState as S;

    let mut machine: CoordinateSystemStateMachine = StateMachine::new("CoordinateSystem");
    let states = [
        S::Initialized,
        S::ParentSet,
        S::AttemptingComputeTransformTo,
        S::AttemptingComputeTransformToInInitialized,
    ];
    let inputs = [
        I::NullCoordinateSystem,
        I::ThisCoordinateSystem,
        I::ValidCoordinateSystem,
        I::NullParent,
        I::ThisParent,
        I::ValidParent,
        I::AncestorFound,
        I::Disconnected,
        I::ParentCausesCycle,
        I::UpdateTransformToParent,
        I::DetachFromParent,
    ];

    #[rustfmt::skip]
    let transitions = [
        (S::Initialized, I::ValidParent, S::ParentSet, A::SetTransformAndParent),
        (S::Initialized, I::NullParent, S::Initialized, A::SetTransformAndParentNullParent),
        (S::Initialized, I::ThisParent, S::Initialized, A::SetTransformAndParentThisParent),
        (S::Initialized, I::ParentCausesCycle, S::Initialized, A::SetTransformAndParentCycle),
        (S::Initialized, I::NullCoordinateSystem, S::Initialized, A::ComputeTransformToNullTarget),
        (S::Initialized, I::ThisCoordinateSystem, S::Initialized, A::ComputeTransformToThisTarget),
        (S::Initialized, I::ValidCoordinateSystem, S::AttemptingComputeTransformToInInitialized, A::ComputeTransformToValidTarget),
        (S::Initialized, I::DetachFromParent, S::Initialized, A::DetachFromParent),

        (S::ParentSet, I::ValidParent, S::ParentSet, A::SetTransformAndParent),
        (S::ParentSet, I::NullParent, S::ParentSet, A::SetTransformAndParentNullParent),
        (S::ParentSet, I::ThisParent, S::ParentSet, A::SetTransformAndParentThisParent),
        (S::ParentSet, I::ParentCausesCycle, S::ParentSet, A::SetTransformAndParentCycle),
        (S::ParentSet, I::NullCoordinateSystem, S::ParentSet, A::ComputeTransformToNullTarget),
        (S::ParentSet, I::ThisCoordinateSystem, S::ParentSet, A::ComputeTransformToThisTarget),
        (S::ParentSet, I::ValidCoordinateSystem, S::AttemptingComputeTransformTo, A::ComputeTransformToValidTarget),
        (S::ParentSet, I::UpdateTransformToParent, S::ParentSet, A::UpdateTransformToParent),
        (S::ParentSet, I::DetachFromParent, S::Initialized, A::DetachFromParent),

        (S::AttemptingComputeTransformToInInitialized, I::AncestorFound, S::Initialized, A::ComputeTransformToAncestorFound),
        (S::AttemptingComputeTransformToInInitialized, I::Disconnected, S::Initialized, A::ComputeTransformToDisconnected),

        (S::AttemptingComputeTransformTo, I::AncestorFound, S::ParentSet, A::ComputeTransformToAncestorFound),
        (S::AttemptingComputeTransformTo, I::Disconnected, S::ParentSet, A::ComputeTransformToDisconnected),
    ];

    let mut wired = states
        .iter()
        .try_for_each(|state| machine.add_state(*state, format!("{state:?}")));
    wired = wired.and_then(|_| {
        inputs
            .iter()
            .try_for_each(|input| machine.add_input(*input, format!("{input:?}")))
    });
    wired = wired.and_then(|_| {
        transitions
            .iter()
            .try_for_each(|(state, input, next, action)| {
                machine.add_transition(*state, *input, *next, *action)
            })
    });
    wired = wired
        .and_then(|_| machine.complete_with_self_loops(A::InvalidRequest).map(|_| ()))
        .and_then(|_| machine.select_initial_state(S::Initialized))
        .and_then(|_| machine.set_ready_to_run());
    debug_assert!(wired.is_ok(), "coordinate system protocol: {wired:?}");
    machine
}

/// Data of the request being processed, consumed by the actions.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct PendingRequest {
    pub transform: Option<Transform>,
    pub parent: Option<FrameId>,
    pub target: Option<FrameId>,
    pub common_ancestor: Option<FrameId>,
}

/// A vertex of the [`FrameGraph`].
/// Its transform to parent lives on the outgoing edge, see [`FrameGraph::transform_to_parent`].
pub struct CoordinateSystem {
    pub(crate) name: CompactString,
    pub(crate) type_name: CompactString,
    pub(crate) generation: u64,
    pub(crate) machine: CoordinateSystemStateMachine,
    pub(crate) pending: PendingRequest,
    pub(crate) observers: Vec<(ObserverId, Observer)>,
}

impl CoordinateSystem {
    pub(crate) fn new(
        name: &str,
        type_name: &str,
        generation: u64,
        machine: CoordinateSystemStateMachine,
    ) -> Self {
        Self {
            name: CompactString::from(name),
            type_name: CompactString::from(type_name),
            generation,
            machine,
            pending: PendingRequest::default(),
            observers: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn state(&self) -> Option<CoordinateSystemState> {
        self.machine.current_state()
    }
}

/// Request handle on one node of a [`FrameGraph`], see [`FrameGraph::frame`].
///
/// Every request runs to completion before returning: observers of the node have received the
/// outcome by then.
pub struct Frame<'g> {
    graph: &'g mut FrameGraph,
    id: FrameId,
}

impl<'g> Frame<'g> {
    /// The id must be alive in the graph.
    pub(crate) fn new(graph: &'g mut FrameGraph, id: FrameId) -> Self {
        Self { graph, id }
    }

    pub fn id(&self) -> FrameId {
        self.id
    }

    /// Attaches this frame to `parent` with `transform` mapping this frame into the parent's.
    ///
    /// An existing parent link is detached first. A missing parent, the frame itself, or a
    /// parent that would close a cycle are refused and the graph stays unchanged.
    pub fn request_set_transform_and_parent(
        &mut self,
        transform: Transform,
        parent: Option<FrameId>,
    ) {
        let parent = parent.filter(|p| self.graph.contains(*p));
        self.node_mut().pending.transform = Some(transform);
        self.node_mut().pending.parent = parent;

        match parent {
            None => self.push(CoordinateSystemInput::NullParent),
            Some(p) if p == self.id => self.push(CoordinateSystemInput::ThisParent),
            Some(p) if self.graph.can_reach(p, self.id) => {
                self.push(CoordinateSystemInput::ParentCausesCycle)
            }
            Some(_) => {
                if self.graph.parent(self.id).is_some() {
                    self.push(CoordinateSystemInput::DetachFromParent);
                }
                self.push(CoordinateSystemInput::ValidParent);
            }
        }
        self.run();
    }

    /// Replaces the transform to the current parent. Refused for a root. No event.
    pub fn request_update_transform_to_parent(&mut self, transform: Transform) {
        self.node_mut().pending.transform = Some(transform);
        self.push(CoordinateSystemInput::UpdateTransformToParent);
        self.run();
    }

    /// Computes the transform mapping points of this frame into `target`'s frame.
    pub fn request_compute_transform_to(&mut self, target: Option<FrameId>) {
        let target = target.filter(|t| self.graph.contains(*t));
        self.node_mut().pending.target = target;
        match target {
            None => self.push(CoordinateSystemInput::NullCoordinateSystem),
            Some(t) if t == self.id => self.push(CoordinateSystemInput::ThisCoordinateSystem),
            Some(_) => self.push(CoordinateSystemInput::ValidCoordinateSystem),
        }
        self.run();
    }

    /// Same as computing the transform to the current parent. A root reports a null target.
    pub fn request_get_transform_to_parent(&mut self) {
        let parent = self.graph.parent(self.id);
        self.request_compute_transform_to(parent);
    }

    /// Makes this frame a root. Always reported, even when it already was one.
    pub fn request_detach_from_parent(&mut self) {
        self.push(CoordinateSystemInput::DetachFromParent);
        self.run();
    }

    fn node_mut(&mut self) -> &mut CoordinateSystem {
        &mut self.graph.graph[self.id.node]
    }

    fn push(&mut self, input: CoordinateSystemInput) {
        if let Err(err) = self.node_mut().machine.push_input(input) {
            error!("Coordinate system {:?} could not queue {:?}: {}", self.id, input, err);
        }
    }

    fn run(&mut self) {
        process_inputs(self);
        self.node_mut().pending = PendingRequest::default();
    }

    fn emit(&mut self, event: CoordinateSystemEvent) {
        self.graph.emit(self.id, &event);
    }

    fn name(&self) -> &str {
        self.graph.name(self.id).unwrap_or("?")
    }

    fn set_transform_and_parent(&mut self) {
        let pending = self.node_mut().pending;
        let (Some(transform), Some(parent)) = (pending.transform, pending.parent) else {
            warn!("Coordinate system '{}' attach request without parent or transform", self.name());
            return;
        };
        self.graph.set_parent_link(self.id, parent, transform);
        debug!(
            "Coordinate system '{}' attached to '{}'",
            self.name(),
            self.graph.name(parent).unwrap_or("?")
        );
        self.emit(CoordinateSystemEvent::SetTransform(SetTransformResult {
            transform,
            source: Some(parent),
            destination: self.id,
            is_attach: true,
        }));
    }

    fn update_transform_to_parent(&mut self) {
        let Some(transform) = self.node_mut().pending.transform else {
            return;
        };
        if self.graph.update_parent_link(self.id, transform) {
            debug!("Coordinate system '{}' transform to parent updated", self.name());
        }
    }

    fn compute_transform_to_valid_target(&mut self) {
        let Some(target) = self.node_mut().pending.target else {
            self.push(CoordinateSystemInput::Disconnected);
            return;
        };
        match self.graph.lowest_common_ancestor(self.id, target) {
            Some(ancestor) => {
                self.node_mut().pending.common_ancestor = Some(ancestor);
                self.push(CoordinateSystemInput::AncestorFound);
            }
            None => self.push(CoordinateSystemInput::Disconnected),
        }
    }

    fn compute_transform_to_ancestor_found(&mut self) {
        let pending = self.node_mut().pending;
        let (Some(target), Some(ancestor)) = (pending.target, pending.common_ancestor) else {
            return;
        };
        debug!(
            "'{}' and '{}' have lowest common ancestor '{}'",
            self.name(),
            self.graph.name(target).unwrap_or("?"),
            self.graph.name(ancestor).unwrap_or("?")
        );
        let this_to_ancestor = self.graph.transform_to_ancestor(self.id, ancestor);
        let target_to_ancestor = self.graph.transform_to_ancestor(target, ancestor);
        let (Some(this_to_ancestor), Some(target_to_ancestor)) =
            (this_to_ancestor, target_to_ancestor)
        else {
            // the ancestor search guarantees both chains reach the ancestor
            error!("Coordinate system '{}' lost its common ancestor", self.name());
            return;
        };
        let transform = Transform::compose(&target_to_ancestor.inverse(), &this_to_ancestor);
        self.emit(CoordinateSystemEvent::TransformTo(TransformToResult {
            transform,
            source: self.id,
            destination: target,
            common_ancestor: Some(ancestor),
        }));
    }

    fn detach_from_parent(&mut self) {
        let removed = self.graph.clear_parent_link(self.id);
        let (source, transform) = match removed {
            Some((parent, transform)) => (Some(parent), transform),
            None => (None, Transform::identity()),
        };
        debug!("Coordinate system '{}' detached", self.name());
        self.emit(CoordinateSystemEvent::SetTransform(SetTransformResult {
            transform,
            source,
            destination: self.id,
            is_attach: false,
        }));
    }
}

impl StateMachineOwner for Frame<'_> {
    type State = CoordinateSystemState;
    type Input = CoordinateSystemInput;
    type Action = CoordinateSystemAction;

    fn state_machine(&mut self) -> &mut CoordinateSystemStateMachine {
        &mut self.node_mut().machine
    }

    fn perform(&mut self, action: CoordinateSystemAction) {
        use CoordinateSystemAction as A;
        let id = self.id;
        match action {
            A::SetTransformAndParent => self.set_transform_and_parent(),
            A::SetTransformAndParentNullParent => {
                warn!("Coordinate system '{}' refused a null parent", self.name());
                self.emit(CoordinateSystemEvent::NullParent { node: id });
            }
            A::SetTransformAndParentThisParent => {
                warn!("Coordinate system '{}' refused itself as parent", self.name());
                self.emit(CoordinateSystemEvent::ThisParent { node: id });
            }
            A::SetTransformAndParentCycle => {
                let Some(rejected_parent) = self.node_mut().pending.parent else {
                    return;
                };
                warn!(
                    "Coordinate system '{}' refused parent '{}', it would create a cycle",
                    self.name(),
                    self.graph.name(rejected_parent).unwrap_or("?")
                );
                self.emit(CoordinateSystemEvent::ParentCycle {
                    node: id,
                    rejected_parent,
                });
            }
            A::UpdateTransformToParent => self.update_transform_to_parent(),
            A::ComputeTransformToNullTarget => {
                self.emit(CoordinateSystemEvent::TransformToNullTarget(TransformToErrorResult {
                    source: id,
                    destination: None,
                }));
            }
            A::ComputeTransformToThisTarget => {
                self.emit(CoordinateSystemEvent::TransformTo(TransformToResult {
                    transform: Transform::identity(),
                    source: id,
                    destination: id,
                    common_ancestor: None,
                }));
            }
            A::ComputeTransformToValidTarget => self.compute_transform_to_valid_target(),
            A::ComputeTransformToAncestorFound => self.compute_transform_to_ancestor_found(),
            A::ComputeTransformToDisconnected => {
                let destination = self.node_mut().pending.target;
                self.emit(CoordinateSystemEvent::TransformToDisconnected(TransformToErrorResult {
                    source: id,
                    destination,
                }));
            }
            A::DetachFromParent => self.detach_from_parent(),
            A::InvalidRequest => {
                let state = self.node_mut().machine.current_state();
                warn!(
                    "Coordinate system '{}' ignored an invalid request in state {:?}",
                    self.name(),
                    state
                );
            }
        }
    }
}
