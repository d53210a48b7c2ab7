//! A diagnostic copy of the forest, rebuilt only from the attach and detach notifications of
//! the nodes it observes. It never reads links from the [`FrameGraph`].
use crate::error::FrameGraphResult;
use crate::events::CoordinateSystemEvent;
use crate::graph::{FrameGraph, FrameId, ObserverId};
use crate::transform::Transform;
use compact_str::CompactString;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::io::Write;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub struct SceneNode {
    pub name: CompactString,
    pub type_name: CompactString,
    pub parent: Option<FrameId>,
    pub transform_to_parent: Transform,
}

#[derive(Debug, Clone, Default)]
pub struct SceneGraph {
    nodes: Rc<RefCell<BTreeMap<FrameId, SceneNode>>>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts following `id`. Name and type are captured now and not refreshed.
    /// Links made before this call are not known.
    pub fn observe(&self, graph: &mut FrameGraph, id: FrameId) -> Option<ObserverId> {
        let node = SceneNode {
            name: CompactString::from(graph.name(id)?),
            type_name: CompactString::from(graph.type_name(id)?),
            parent: None,
            transform_to_parent: Transform::identity(),
        };
        self.nodes.borrow_mut().insert(id, node);

        let nodes = self.nodes.clone();
        graph.add_observer(id, move |event| {
            let CoordinateSystemEvent::SetTransform(result) = event else {
                return;
            };
            let mut nodes = nodes.borrow_mut();
            let Some(node) = nodes.get_mut(&result.destination) else {
                return;
            };
            if result.is_attach {
                node.parent = result.source;
                node.transform_to_parent = result.transform;
            } else {
                node.parent = None;
                node.transform_to_parent = Transform::identity();
            }
        })
    }

    /// Follows every frame currently in the graph.
    pub fn observe_all(&self, graph: &mut FrameGraph) {
        let frames: Vec<FrameId> = graph.frames().collect();
        for id in frames {
            self.observe(graph, id);
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.borrow().is_empty()
    }

    pub fn node(&self, id: FrameId) -> Option<SceneNode> {
        self.nodes.borrow().get(&id).cloned()
    }

    pub fn parent(&self, id: FrameId) -> Option<FrameId> {
        self.nodes.borrow().get(&id).and_then(|node| node.parent)
    }

    pub fn children(&self, id: FrameId) -> Vec<FrameId> {
        self.nodes
            .borrow()
            .iter()
            .filter(|(_, node)| node.parent == Some(id))
            .map(|(child, _)| *child)
            .collect()
    }

    pub fn roots(&self) -> Vec<FrameId> {
        self.nodes
            .borrow()
            .iter()
            .filter(|(_, node)| node.parent.is_none())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Render the reconstructed forest in the dot format.
    /// Parents that are not observed show up with their id only.
    pub fn export_dot(&self, output: &mut dyn Write) -> FrameGraphResult<()> {
        let nodes = self.nodes.borrow();
        writeln!(output, "digraph SceneGraph {{")?;
        for (id, node) in nodes.iter() {
            writeln!(output, "{} [", id.index())?;
            writeln!(output, "shape=box,")?;
            writeln!(output, "style=\"rounded, filled\",")?;
            writeln!(output, "fontname=\"Noto Sans\"")?;
            if node.parent.is_none() {
                writeln!(output, "fillcolor=lightgreen,")?;
            } else {
                writeln!(output, "fillcolor=lightblue,")?;
            }
            writeln!(output, "color=grey,")?;
            writeln!(
                output,
                "label=< <FONT COLOR=\"red\"><B>{}</B></FONT><BR ALIGN=\"LEFT\"/><FONT COLOR=\"dimgray\">{}</FONT> >",
                node.name, node.type_name
            )?;
            writeln!(output, "];")?;
        }
        for (id, node) in nodes.iter() {
            let Some(parent) = node.parent else {
                continue;
            };
            if !nodes.contains_key(&parent) {
                writeln!(output, "{} [label=\"{}\", shape=ellipse];", parent.index(), parent)?;
            }
            let t = node.transform_to_parent.translation;
            writeln!(
                output,
                "{} -> {} [label=< <FONT COLOR=\"gray\">({:.3}, {:.3}, {:.3})</FONT> >];",
                parent.index(),
                id.index(),
                t.x,
                t.y,
                t.z
            )?;
        }
        writeln!(output, "}}")?;
        Ok(())
    }
}

impl Display for SceneGraph {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let nodes = self.nodes.borrow();
        for (id, node) in nodes.iter() {
            let parent = match node.parent {
                Some(parent) => nodes
                    .get(&parent)
                    .map(|p| p.name.to_string())
                    .unwrap_or_else(|| parent.to_string()),
                None => "none".to_string(),
            };
            writeln!(
                f,
                "{} {} '{}' parent: {} transform: {}",
                id, node.type_name, node.name, parent, node.transform_to_parent
            )?;
        }
        Ok(())
    }
}
