//! RON descriptions of a frame graph.
//!
//! ```ron
//! (
//!     frames: [
//!         (id: "world", type: "World"),
//!         (id: "tracker", type: "Tracker"),
//!     ],
//!     links: [
//!         (
//!             parent: "world",
//!             child: "tracker",
//!             translation: (0.0, 0.0, 1.2),
//!             rotation: (0.0, 0.0, 0.0, 1.0),
//!         ),
//!     ],
//! )
//! ```
//!
//! Rotations are quaternions written `(x, y, z, w)`, they are normalized on load. Links are
//! applied in order through the regular attach request, so a link can move a frame that an
//! earlier link attached.
use crate::error::{FrameGraphError, FrameGraphResult};
use crate::events::CoordinateSystemEvent;
use crate::graph::{FrameGraph, FrameId};
use crate::observer::EventRecorder;
use crate::time::Validity;
use crate::transform::Transform;
use log::debug;
use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use ron::extensions::Extensions;
use ron::Options;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::read_to_string;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FrameConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
}

impl FrameConfig {
    pub fn new(id: &str, type_: &str) -> Self {
        Self {
            id: id.to_string(),
            type_: type_.to_string(),
        }
    }
}

fn identity_rotation() -> [f64; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LinkConfig {
    pub parent: String,
    pub child: String,
    #[serde(default)]
    pub translation: [f64; 3],
    /// (x, y, z, w)
    #[serde(default = "identity_rotation")]
    pub rotation: [f64; 4],
    #[serde(default)]
    pub error: f64,
}

impl LinkConfig {
    pub fn new(parent: &str, child: &str, translation: [f64; 3], rotation: [f64; 4]) -> Self {
        Self {
            parent: parent.to_string(),
            child: child.to_string(),
            translation,
            rotation,
            error: 0.0,
        }
    }

    /// The child to parent transform of this link, valid forever.
    pub fn transform(&self) -> FrameGraphResult<Transform> {
        let [x, y, z, w] = self.rotation;
        let rotation = UnitQuaternion::try_new(Quaternion::new(w, x, y, z), 1e-9).ok_or_else(|| {
            FrameGraphError::InvalidRotation(format!(
                "link {} -> {}: quaternion {:?} cannot be normalized",
                self.child, self.parent, self.rotation
            ))
        })?;
        let [tx, ty, tz] = self.translation;
        Ok(Transform::new(
            Vector3::new(tx, ty, tz),
            rotation,
            self.error,
            Validity::forever(),
        ))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct FrameGraphConfig {
    pub frames: Vec<FrameConfig>,
    #[serde(default)]
    pub links: Vec<LinkConfig>,
}

impl FrameGraphConfig {
    fn get_options() -> Options {
        Options::default()
            .with_default_extension(Extensions::IMPLICIT_SOME)
            .with_default_extension(Extensions::UNWRAP_NEWTYPES)
    }

    pub fn serialize_ron(&self) -> FrameGraphResult<String> {
        let pretty = ron::ser::PrettyConfig::default();
        Self::get_options()
            .to_string_pretty(self, pretty)
            .map_err(|e| FrameGraphError::SerializationError(e.to_string()))
    }

    pub fn deserialize_ron(ron: &str) -> FrameGraphResult<Self> {
        Self::get_options()
            .from_str(ron)
            .map_err(|e| FrameGraphError::ConfigSyntax(e.to_string()))
    }

    /// Creates one root per described frame. Ids must be unique.
    pub fn add_frames(&self, graph: &mut FrameGraph) -> FrameGraphResult<HashMap<String, FrameId>> {
        let mut ids = HashMap::with_capacity(self.frames.len());
        for frame in &self.frames {
            if ids.contains_key(&frame.id) {
                return Err(FrameGraphError::DuplicateFrame(frame.id.clone()));
            }
            ids.insert(frame.id.clone(), graph.add_frame(&frame.id, &frame.type_));
        }
        Ok(ids)
    }

    /// Issues an attach request per link, in order.
    /// Stops at the first link the graph refuses.
    pub fn link_frames(
        &self,
        graph: &mut FrameGraph,
        ids: &HashMap<String, FrameId>,
    ) -> FrameGraphResult<()> {
        let lookup = |name: &str| {
            ids.get(name)
                .copied()
                .ok_or_else(|| FrameGraphError::FrameNotFound(name.to_string()))
        };
        for link in &self.links {
            let parent = lookup(&link.parent)?;
            let child = lookup(&link.child)?;
            let transform = link.transform()?;

            let recorder = EventRecorder::new();
            let observer = recorder.observe(graph, child);
            if let Some(mut frame) = graph.frame(child) {
                frame.request_set_transform_and_parent(transform, Some(parent));
            }
            if let Some(observer) = observer {
                graph.remove_observer(child, observer);
            }

            let rejected = |reason: &str| FrameGraphError::LinkRejected {
                parent: link.parent.clone(),
                child: link.child.clone(),
                reason: reason.to_string(),
            };
            match recorder.last() {
                Some(CoordinateSystemEvent::SetTransform(result)) if result.is_attach => {
                    debug!("Linked '{}' to '{}'", link.child, link.parent);
                }
                Some(CoordinateSystemEvent::ThisParent { .. }) => {
                    return Err(rejected("a frame cannot be its own parent"))
                }
                Some(CoordinateSystemEvent::ParentCycle { .. }) => {
                    return Err(rejected("it would create a cycle"))
                }
                other => return Err(rejected(&format!("unexpected outcome {other:?}"))),
            }
        }
        Ok(())
    }

    /// Builds a fresh graph from the description.
    pub fn build(&self) -> FrameGraphResult<(FrameGraph, HashMap<String, FrameId>)> {
        let mut graph = FrameGraph::new();
        let ids = self.add_frames(&mut graph)?;
        self.link_frames(&mut graph, &ids)?;
        Ok((graph, ids))
    }
}

/// Read a frame graph description from a file.
pub fn read_configuration(config_filename: &str) -> FrameGraphResult<FrameGraphConfig> {
    let config_content =
        read_to_string(config_filename).map_err(|source| FrameGraphError::ConfigRead {
            path: config_filename.to_string(),
            source,
        })?;
    FrameGraphConfig::deserialize_ron(&config_content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_serialize() {
        let config = FrameGraphConfig {
            frames: vec![FrameConfig::new("world", "World"), FrameConfig::new("tool", "Tool")],
            links: vec![LinkConfig::new("world", "tool", [1.0, 2.0, 3.0], identity_rotation())],
        };
        let serialized = config.serialize_ron().unwrap();
        let deserialized = FrameGraphConfig::deserialize_ron(&serialized).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_defaults() {
        let txt = r#"(
            frames: [ (id: "a", type: "A"), (id: "b", type: "B") ],
            links: [ (parent: "a", child: "b") ],
        )"#;
        let config = FrameGraphConfig::deserialize_ron(txt).unwrap();
        assert_eq!(config.links[0].rotation, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(config.links[0].translation, [0.0; 3]);
        assert_eq!(config.links[0].error, 0.0);

        let config = FrameGraphConfig::deserialize_ron(r#"( frames: [] )"#).unwrap();
        assert!(config.links.is_empty());
    }

    #[test]
    fn test_syntax_error() {
        let result = FrameGraphConfig::deserialize_ron("( frames: [ (id: ) ] )");
        assert!(matches!(result, Err(FrameGraphError::ConfigSyntax(_))));
    }

    #[test]
    fn test_build() {
        let txt = r#"(
            frames: [ (id: "world", type: "World"), (id: "tool", type: "Tool") ],
            links: [ (parent: "world", child: "tool", translation: (0.0, 0.0, 2.0)) ],
        )"#;
        let (graph, ids) = FrameGraphConfig::deserialize_ron(txt).unwrap().build().unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.parent(ids["tool"]), Some(ids["world"]));
        assert_eq!(
            graph.transform_to_parent(ids["tool"]).unwrap().translation,
            Vector3::new(0.0, 0.0, 2.0)
        );
    }

    #[test]
    fn test_build_rejections() {
        let cycle = FrameGraphConfig {
            frames: vec![FrameConfig::new("a", "T"), FrameConfig::new("b", "T")],
            links: vec![
                LinkConfig::new("a", "b", [0.0; 3], identity_rotation()),
                LinkConfig::new("b", "a", [0.0; 3], identity_rotation()),
            ],
        };
        assert!(matches!(cycle.build(), Err(FrameGraphError::LinkRejected { .. })));

        let itself = FrameGraphConfig {
            frames: vec![FrameConfig::new("a", "T")],
            links: vec![LinkConfig::new("a", "a", [0.0; 3], identity_rotation())],
        };
        assert!(matches!(itself.build(), Err(FrameGraphError::LinkRejected { .. })));

        let unknown = FrameGraphConfig {
            frames: vec![FrameConfig::new("a", "T")],
            links: vec![LinkConfig::new("a", "ghost", [0.0; 3], identity_rotation())],
        };
        assert!(matches!(
            unknown.build(),
            Err(FrameGraphError::FrameNotFound(name)) if name == "ghost"
        ));

        let twice = FrameGraphConfig {
            frames: vec![FrameConfig::new("a", "T"), FrameConfig::new("a", "T")],
            links: vec![],
        };
        assert!(matches!(twice.build(), Err(FrameGraphError::DuplicateFrame(_))));

        let degenerate = FrameGraphConfig {
            frames: vec![FrameConfig::new("a", "T"), FrameConfig::new("b", "T")],
            links: vec![LinkConfig::new("a", "b", [0.0; 3], [0.0; 4])],
        };
        assert!(matches!(degenerate.build(), Err(FrameGraphError::InvalidRotation(_))));
    }

    #[test]
    fn test_rotation_is_normalized() {
        let link = LinkConfig::new("a", "b", [0.0; 3], [0.0, 0.0, 0.0, 2.0]);
        assert!(link.transform().unwrap().is_identity(1e-12));
    }
}
