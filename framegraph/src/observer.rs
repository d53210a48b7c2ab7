//! Ready made observers keeping the events of a node around after the request returned.
use crate::events::{CoordinateSystemEvent, TransformToResult};
use crate::graph::{FrameGraph, FrameId, ObserverId};
use crate::transform::Transform;
use std::cell::RefCell;
use std::rc::Rc;

/// Keeps the last transform computed by the observed node.
/// Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct TransformObserver {
    last: Rc<RefCell<Option<TransformToResult>>>,
}

impl TransformObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts recording the transform results of `id`. `None` for an unknown id.
    pub fn observe(&self, graph: &mut FrameGraph, id: FrameId) -> Option<ObserverId> {
        let last = self.last.clone();
        graph.add_observer(id, move |event| {
            if let CoordinateSystemEvent::TransformTo(result) = event {
                *last.borrow_mut() = Some(*result);
            }
        })
    }

    pub fn got_transform(&self) -> bool {
        self.last.borrow().is_some()
    }

    pub fn transform(&self) -> Option<Transform> {
        self.last.borrow().map(|result| result.transform)
    }

    pub fn result(&self) -> Option<TransformToResult> {
        *self.last.borrow()
    }

    pub fn clear(&self) {
        *self.last.borrow_mut() = None;
    }
}

/// Records every event of the observed nodes, in delivery order.
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    events: Rc<RefCell<Vec<CoordinateSystemEvent>>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, graph: &mut FrameGraph, id: FrameId) -> Option<ObserverId> {
        let events = self.events.clone();
        graph.add_observer(id, move |event| events.borrow_mut().push(*event))
    }

    pub fn events(&self) -> Vec<CoordinateSystemEvent> {
        self.events.borrow().clone()
    }

    pub fn last(&self) -> Option<CoordinateSystemEvent> {
        self.events.borrow().last().copied()
    }

    /// Returns the recorded events and starts over.
    pub fn take(&self) -> Vec<CoordinateSystemEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }
}
