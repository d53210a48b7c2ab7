//! Coordinate systems owned by independent components, linked into a forest of rigid transforms.
//!
//! Every component (tracker, tool, image, view) owns one frame in a [`FrameGraph`] and talks to
//! it through the five requests of [`Frame`]. Outcomes are delivered synchronously to the
//! observers of the frame as [`CoordinateSystemEvent`]s.
//!
//! ```
//! use framegraph::{CoordinateSystemEvent, FrameGraph, Transform, TransformObserver};
//! use nalgebra::Vector3;
//!
//! let mut graph = FrameGraph::new();
//! let world = graph.add_frame("world", "World");
//! let tool = graph.add_frame("tool", "Tool");
//!
//! let shift = Transform::from_translation(Vector3::new(0.0, 0.0, 10.0));
//! graph.frame(tool).unwrap().request_set_transform_and_parent(shift, Some(world));
//!
//! let observer = TransformObserver::new();
//! observer.observe(&mut graph, world);
//! graph.frame(world).unwrap().request_compute_transform_to(Some(tool));
//! let world_to_tool = observer.transform().unwrap();
//! assert!(world_to_tool.is_numerically_equivalent(&shift.inverse(), 1e-12));
//! ```
pub mod config;
pub mod coordinate_system;
pub mod error;
pub mod events;
pub mod graph;
pub mod observer;
pub mod scene_graph;
pub mod time;
pub mod transform;

pub use config::{read_configuration, FrameConfig, FrameGraphConfig, LinkConfig};
pub use coordinate_system::{
    coordinate_system_state_machine, CoordinateSystem, CoordinateSystemAction,
    CoordinateSystemInput, CoordinateSystemState, CoordinateSystemStateMachine, Frame,
};
pub use error::{FrameGraphError, FrameGraphResult};
pub use events::{
    CoordinateSystemEvent, SetTransformResult, TransformToErrorResult, TransformToResult,
};
pub use graph::{FrameGraph, FrameId, Observer, ObserverId, ParentLink};
pub use observer::{EventRecorder, TransformObserver};
pub use scene_graph::{SceneGraph, SceneNode};
pub use time::{ClockTime, RobotClock, RobotClockMock, Validity};
pub use transform::Transform;
