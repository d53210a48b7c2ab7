use framegraph::{read_configuration, FrameGraph, FrameGraphConfig, FrameGraphError, SceneGraph};
use std::io::Write;
use tempfile::NamedTempFile;

const DESCRIPTION: &str = r#"(
    frames: [
        (id: "world", type: "World"),
        (id: "tracker", type: "Tracker"),
        (id: "pointer", type: "Tool"),
        (id: "image", type: "Image"),
    ],
    links: [
        (parent: "world", child: "tracker", translation: (0.0, 0.0, 1.5)),
        (
            parent: "tracker",
            child: "pointer",
            translation: (0.1, 0.0, 0.0),
            rotation: (0.0, 0.0, 0.7071067811865476, 0.7071067811865476),
            error: 0.2,
        ),
        (parent: "world", child: "image"),
    ],
)"#;

fn write_description(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_read_and_build() {
    let file = write_description(DESCRIPTION);
    let config = read_configuration(file.path().to_str().unwrap()).unwrap();
    assert_eq!(config.frames.len(), 4);
    assert_eq!(config.links.len(), 3);

    let (graph, ids) = config.build().unwrap();
    assert_eq!(graph.roots(), vec![ids["world"]]);
    assert_eq!(graph.parent(ids["pointer"]), Some(ids["tracker"]));
    let pointer = graph.transform_to_parent(ids["pointer"]).unwrap();
    assert!((pointer.estimation_error() - 0.2).abs() < 1e-12);
    assert!((pointer.rotation.angle() - std::f64::consts::FRAC_PI_2).abs() < 1e-9);
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nope.ron");
    let result = read_configuration(path.to_str().unwrap());
    assert!(matches!(result, Err(FrameGraphError::ConfigRead { .. })));
}

#[test]
fn test_scene_graph_follows_build() {
    let config = FrameGraphConfig::deserialize_ron(DESCRIPTION).unwrap();
    let mut graph = FrameGraph::new();
    let ids = config.add_frames(&mut graph).unwrap();
    let scene = SceneGraph::new();
    scene.observe_all(&mut graph);
    config.link_frames(&mut graph, &ids).unwrap();

    assert_eq!(scene.len(), 4);
    assert_eq!(scene.roots(), vec![ids["world"]]);
    assert_eq!(scene.parent(ids["pointer"]), Some(ids["tracker"]));
    assert_eq!(scene.children(ids["world"]), vec![ids["tracker"], ids["image"]]);

    let mut out = Vec::new();
    scene.export_dot(&mut out).unwrap();
    let dot = String::from_utf8(out).unwrap();
    assert!(dot.contains("<B>pointer</B>"));
    assert!(dot.contains("(0.000, 0.000, 1.500)"));

    let text = scene.to_string();
    assert!(text.contains("Tool 'pointer' parent: tracker"));
}
