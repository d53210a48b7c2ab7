//! The arena owning every coordinate system.
//!
//! Nodes are addressed by [`FrameId`] handles that stay valid until the node is removed. A handle
//! carries the serial of its graph and the generation of its node: once the node is removed, or
//! in another graph, it resolves to nothing even when the storage slot has been reused. A parent
//! link is the single outgoing edge from a child to its parent, weighted by the transform mapping
//! the child's frame into the parent's. Links are only changed through the requests of
//! [`Frame`], the rest of this API is read only.
//!
//! The graph is single threaded: observers are plain boxed closures, so `FrameGraph` is neither
//! `Send` nor `Sync`. A host sharing it between threads must serialize the accesses itself.
use crate::coordinate_system::{
    coordinate_system_state_machine, CoordinateSystem, CoordinateSystemState,
    CoordinateSystemStateMachine, Frame,
};
use crate::error::FrameGraphResult;
use crate::events::CoordinateSystemEvent;
use crate::transform::Transform;
use log::debug;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction::{Incoming, Outgoing};
use std::fmt::{Display, Formatter};
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_GRAPH_SERIAL: AtomicU64 = AtomicU64::new(0);

/// Handle on a node of a [`FrameGraph`].
///
/// Ordered by storage slot first, which is the order frames were added in as long as none was
/// removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameId {
    pub(crate) node: NodeIndex,
    generation: u64,
    graph: u64,
}

impl FrameId {
    /// The storage slot. Slots of removed frames are reused.
    pub fn index(&self) -> usize {
        self.node.index()
    }
}

impl Display for FrameId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.node.index())
    }
}

/// Edge weight: the transform from the child frame to the parent frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParentLink {
    pub transform: Transform,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Receives every event of the node it is registered on, synchronously.
pub type Observer = Box<dyn FnMut(&CoordinateSystemEvent)>;

pub struct FrameGraph {
    pub(crate) graph: StableDiGraph<CoordinateSystem, ParentLink>,
    protocol: CoordinateSystemStateMachine,
    serial: u64,
    next_generation: u64,
    next_observer: u64,
}

impl FrameGraph {
    pub fn new() -> Self {
        Self {
            graph: StableDiGraph::new(),
            protocol: coordinate_system_state_machine(),
            serial: NEXT_GRAPH_SERIAL.fetch_add(1, Ordering::Relaxed),
            next_generation: 0,
            next_observer: 0,
        }
    }

    /// Creates a root frame with an identity transform.
    pub fn add_frame(&mut self, name: &str, type_name: &str) -> FrameId {
        let generation = self.next_generation;
        self.next_generation += 1;
        let node = CoordinateSystem::new(name, type_name, generation, self.protocol.clone());
        let index = self.graph.add_node(node);
        let id = self.id_at(index);
        debug!("Added frame '{name}' ({type_name}) as {id}");
        id
    }

    /// The handle of the node stored at `node`, which must be occupied.
    fn id_at(&self, node: NodeIndex) -> FrameId {
        FrameId {
            node,
            generation: self.graph[node].generation,
            graph: self.serial,
        }
    }

    pub(crate) fn node(&self, id: FrameId) -> Option<&CoordinateSystem> {
        if id.graph != self.serial {
            return None;
        }
        self.graph
            .node_weight(id.node)
            .filter(|node| node.generation == id.generation)
    }

    pub(crate) fn node_mut(&mut self, id: FrameId) -> Option<&mut CoordinateSystem> {
        if id.graph != self.serial {
            return None;
        }
        self.graph
            .node_weight_mut(id.node)
            .filter(|node| node.generation == id.generation)
    }

    /// Removes a frame. Its children are detached first, each through its own detach request,
    /// then the frame detaches itself: all their observers see it happen.
    /// Returns false for an unknown id.
    pub fn remove_frame(&mut self, id: FrameId) -> bool {
        if !self.contains(id) {
            return false;
        }
        for child in self.children(id) {
            Frame::new(self, child).request_detach_from_parent();
        }
        Frame::new(self, id).request_detach_from_parent();
        if let Some(node) = self.graph.remove_node(id.node) {
            debug!("Removed frame '{}' {id}", node.name());
        }
        true
    }

    /// The request handle of a frame, `None` for an unknown id.
    pub fn frame(&mut self, id: FrameId) -> Option<Frame<'_>> {
        if self.contains(id) {
            Some(Frame::new(self, id))
        } else {
            None
        }
    }

    pub fn contains(&self, id: FrameId) -> bool {
        self.node(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// All live frames in index order.
    pub fn frames(&self) -> impl Iterator<Item = FrameId> + '_ {
        self.graph.node_indices().map(move |node| self.id_at(node))
    }

    pub fn name(&self, id: FrameId) -> Option<&str> {
        self.node(id).map(|node| node.name())
    }

    pub fn type_name(&self, id: FrameId) -> Option<&str> {
        self.node(id).map(|node| node.type_name())
    }

    /// Looks a frame up by name. Names are not required to be unique, the first match wins.
    pub fn find(&self, name: &str) -> Option<FrameId> {
        self.frames().find(|id| self.name(*id) == Some(name))
    }

    pub fn current_state(&self, id: FrameId) -> Option<CoordinateSystemState> {
        self.node(id).and_then(|node| node.state())
    }

    pub fn parent(&self, id: FrameId) -> Option<FrameId> {
        if !self.contains(id) {
            return None;
        }
        self.graph
            .edges_directed(id.node, Outgoing)
            .next()
            .map(|edge| self.id_at(edge.target()))
    }

    /// Identity for a root, `None` for an unknown id.
    pub fn transform_to_parent(&self, id: FrameId) -> Option<Transform> {
        if !self.contains(id) {
            return None;
        }
        Some(
            self.graph
                .edges_directed(id.node, Outgoing)
                .next()
                .map(|edge| edge.weight().transform)
                .unwrap_or_else(Transform::identity),
        )
    }

    pub fn children(&self, id: FrameId) -> Vec<FrameId> {
        if !self.contains(id) {
            return Vec::new();
        }
        let mut children: Vec<FrameId> = self
            .graph
            .edges_directed(id.node, Incoming)
            .map(|edge| self.id_at(edge.source()))
            .collect();
        children.sort();
        children
    }

    pub fn roots(&self) -> Vec<FrameId> {
        self.frames().filter(|id| self.parent(*id).is_none()).collect()
    }

    /// The frame itself, then its parent, up to its root.
    pub fn ancestors(&self, id: FrameId) -> impl Iterator<Item = FrameId> + '_ {
        let start = Some(id).filter(|id| self.contains(*id));
        std::iter::successors(start, move |current| self.parent(*current))
    }

    /// True if `target` is `from` or one of its ancestors.
    pub fn can_reach(&self, from: FrameId, target: FrameId) -> bool {
        self.ancestors(from).any(|ancestor| ancestor == target)
    }

    /// The nearest frame both `a` and `b` reach, walking b's chain from `b` upward and looking
    /// for each of its frames in a's chain.
    pub fn lowest_common_ancestor(&self, a: FrameId, b: FrameId) -> Option<FrameId> {
        self.ancestors(b)
            .find(|candidate| self.ancestors(a).any(|ancestor| ancestor == *candidate))
    }

    /// Composes the parent links from `id` up to `ancestor`.
    /// `None` if `ancestor` is not on the chain.
    pub fn transform_to_ancestor(&self, id: FrameId, ancestor: FrameId) -> Option<Transform> {
        if !self.contains(id) || !self.contains(ancestor) {
            return None;
        }
        let mut result = Transform::identity();
        let mut current = id.node;
        while current != ancestor.node {
            let edge = self.graph.edges_directed(current, Outgoing).next()?;
            result = Transform::compose(&edge.weight().transform, &result);
            current = edge.target();
        }
        Some(result)
    }

    /// Registers an observer on a frame. `None` for an unknown id.
    pub fn add_observer<F>(&mut self, id: FrameId, observer: F) -> Option<ObserverId>
    where
        F: FnMut(&CoordinateSystemEvent) + 'static,
    {
        let observer_id = ObserverId(self.next_observer);
        let node = self.node_mut(id)?;
        node.observers.push((observer_id, Box::new(observer)));
        self.next_observer += 1;
        Some(observer_id)
    }

    pub fn remove_observer(&mut self, id: FrameId, observer: ObserverId) -> bool {
        let Some(node) = self.node_mut(id) else {
            return false;
        };
        let before = node.observers.len();
        node.observers.retain(|(registered, _)| *registered != observer);
        node.observers.len() != before
    }

    pub(crate) fn emit(&mut self, id: FrameId, event: &CoordinateSystemEvent) {
        if let Some(node) = self.node_mut(id) {
            for (_, observer) in node.observers.iter_mut() {
                observer(event);
            }
        }
    }

    pub(crate) fn set_parent_link(
        &mut self,
        child: FrameId,
        parent: FrameId,
        transform: Transform,
    ) {
        self.clear_parent_link(child);
        self.graph.add_edge(child.node, parent.node, ParentLink { transform });
    }

    pub(crate) fn update_parent_link(&mut self, child: FrameId, transform: Transform) -> bool {
        let Some(edge) = self.graph.edges_directed(child.node, Outgoing).next().map(|e| e.id())
        else {
            return false;
        };
        match self.graph.edge_weight_mut(edge) {
            Some(link) => {
                link.transform = transform;
                true
            }
            None => false,
        }
    }

    /// Removes the parent link of `child`, returning the former parent and transform.
    pub(crate) fn clear_parent_link(&mut self, child: FrameId) -> Option<(FrameId, Transform)> {
        let edge = self.graph.edges_directed(child.node, Outgoing).next().map(|e| e.id())?;
        let (_, parent) = self.graph.edge_endpoints(edge)?;
        let parent = self.id_at(parent);
        let link = self.graph.remove_edge(edge)?;
        Some((parent, link.transform))
    }

    /// Render the live graph in the dot format, roots at the top.
    pub fn export_dot(&self, output: &mut dyn Write) -> FrameGraphResult<()> {
        writeln!(output, "digraph FrameGraph {{")?;
        writeln!(output, "rankdir=TB;")?;
        for id in self.frames() {
            let node = &self.graph[id.node];
            let fill = if self.parent(id).is_none() {
                "lightgreen"
            } else {
                "lightgrey"
            };
            writeln!(
                output,
                "{} [shape=box, style=\"rounded, filled\", fontname=\"Noto Sans\", fillcolor={fill}, color=grey, label=< <FONT COLOR=\"red\"><B>{}</B></FONT><BR/><FONT COLOR=\"dimgray\">{}</FONT> >];",
                id.index(),
                node.name(),
                node.type_name()
            )?;
        }
        for edge in self.graph.edge_indices() {
            let (Some((child, parent)), Some(link)) =
                (self.graph.edge_endpoints(edge), self.graph.edge_weight(edge))
            else {
                continue;
            };
            let t = link.transform.translation;
            writeln!(
                output,
                "{} -> {} [label=< <FONT COLOR=\"gray\">({:.3}, {:.3}, {:.3})</FONT> >];",
                parent.index(),
                child.index(),
                t.x,
                t.y,
                t.z
            )?;
        }
        writeln!(output, "}}")?;
        Ok(())
    }
}

impl Default for FrameGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::EventRecorder;
    use nalgebra::Vector3;

    fn chain(graph: &mut FrameGraph, names: &[&str]) -> Vec<FrameId> {
        let ids: Vec<FrameId> = names.iter().map(|n| graph.add_frame(n, "Test")).collect();
        for pair in ids.windows(2) {
            graph
                .frame(pair[1])
                .unwrap()
                .request_set_transform_and_parent(Transform::identity(), Some(pair[0]));
        }
        ids
    }

    #[test]
    fn test_new_frame_is_root() {
        let mut graph = FrameGraph::new();
        let id = graph.add_frame("tracker", "Tracker");
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.name(id), Some("tracker"));
        assert_eq!(graph.type_name(id), Some("Tracker"));
        assert_eq!(graph.parent(id), None);
        assert_eq!(graph.roots(), vec![id]);
        assert!(graph.transform_to_parent(id).unwrap().is_identity(0.0));
        assert_eq!(graph.current_state(id), Some(CoordinateSystemState::Initialized));
        assert_eq!(graph.find("tracker"), Some(id));
    }

    #[test]
    fn test_ancestry() {
        let mut graph = FrameGraph::new();
        let ids = chain(&mut graph, &["a", "b", "c"]);
        let other = chain(&mut graph, &["d", "e"]);
        let (a, b, c) = (ids[0], ids[1], ids[2]);

        assert_eq!(graph.ancestors(c).collect::<Vec<_>>(), vec![c, b, a]);
        assert!(graph.can_reach(c, a));
        assert!(graph.can_reach(c, c));
        assert!(!graph.can_reach(a, c));
        assert_eq!(graph.lowest_common_ancestor(c, b), Some(b));
        assert_eq!(graph.lowest_common_ancestor(a, c), Some(a));
        assert_eq!(graph.lowest_common_ancestor(c, other[1]), None);
        assert_eq!(graph.children(a), vec![b]);
        assert_eq!(graph.roots(), vec![a, other[0]]);
    }

    #[test]
    fn test_transform_to_ancestor() {
        let mut graph = FrameGraph::new();
        let root = graph.add_frame("root", "World");
        let a = graph.add_frame("a", "Tool");
        let b = graph.add_frame("b", "Tool");
        graph.frame(a).unwrap().request_set_transform_and_parent(
            Transform::from_translation(Vector3::new(1.0, 0.0, 0.0)),
            Some(root),
        );
        graph.frame(b).unwrap().request_set_transform_and_parent(
            Transform::from_translation(Vector3::new(0.0, 2.0, 0.0)),
            Some(a),
        );
        let t = graph.transform_to_ancestor(b, root).unwrap();
        assert_eq!(t.translation, Vector3::new(1.0, 2.0, 0.0));
        assert!(graph.transform_to_ancestor(b, b).unwrap().is_identity(0.0));
        assert!(graph.transform_to_ancestor(root, b).is_none());
    }

    #[test]
    fn test_remove_frame_detaches_children() {
        let mut graph = FrameGraph::new();
        let ids = chain(&mut graph, &["a", "b", "c"]);
        let (a, b, c) = (ids[0], ids[1], ids[2]);
        let child_events = EventRecorder::new();
        child_events.observe(&mut graph, c);

        assert!(graph.remove_frame(b));
        assert!(!graph.contains(b));
        assert_eq!(graph.parent(c), None);
        assert_eq!(graph.current_state(c), Some(CoordinateSystemState::Initialized));
        assert!(graph.children(a).is_empty());
        assert_eq!(graph.len(), 2);

        let events = child_events.events();
        assert_eq!(events.len(), 1);
        match events[0] {
            CoordinateSystemEvent::SetTransform(result) => {
                assert!(!result.is_attach);
                assert_eq!(result.source, Some(b));
                assert_eq!(result.destination, c);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(!graph.remove_frame(b));
    }

    #[test]
    fn test_stale_id_is_unknown() {
        let mut graph = FrameGraph::new();
        let gone = graph.add_frame("gone", "Tool");
        graph.remove_frame(gone);
        assert!(graph.frame(gone).is_none());
        assert!(graph.name(gone).is_none());
        assert!(graph.transform_to_parent(gone).is_none());
        assert_eq!(graph.ancestors(gone).count(), 0);
        assert!(graph.add_observer(gone, |_| {}).is_none());
    }

    #[test]
    fn test_observers_in_registration_order() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let mut graph = FrameGraph::new();
        let id = graph.add_frame("solo", "Tool");
        let calls = Rc::new(RefCell::new(Vec::new()));
        let first = {
            let calls = calls.clone();
            graph.add_observer(id, move |_| calls.borrow_mut().push(1)).unwrap()
        };
        {
            let calls = calls.clone();
            graph.add_observer(id, move |_| calls.borrow_mut().push(2)).unwrap();
        }
        graph.frame(id).unwrap().request_detach_from_parent();
        assert_eq!(*calls.borrow(), vec![1, 2]);

        assert!(graph.remove_observer(id, first));
        assert!(!graph.remove_observer(id, first));
        graph.frame(id).unwrap().request_detach_from_parent();
        assert_eq!(*calls.borrow(), vec![1, 2, 2]);
    }

    #[test]
    fn test_export_dot() {
        let mut graph = FrameGraph::new();
        chain(&mut graph, &["world", "tracker"]);
        let mut out = Vec::new();
        graph.export_dot(&mut out).unwrap();
        let dot = String::from_utf8(out).unwrap();
        assert!(dot.starts_with("digraph FrameGraph {"));
        assert!(dot.contains("<B>world</B>"));
        assert!(dot.contains("0 -> 1 [label="));
        assert!(dot.trim_end().ends_with('}'));
    }
}
