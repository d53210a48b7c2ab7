use framegraph::{
    CoordinateSystemEvent, EventRecorder, FrameGraph, FrameId, Transform, TransformObserver,
    Validity,
};
use nalgebra::{Point3, UnitQuaternion, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use simplelog::{Config, LevelFilter, TestLogger};
use std::f64::consts::FRAC_PI_2;

const TOLERANCE: f64 = 1e-9;

fn random_transform(rng: &mut StdRng) -> Transform {
    let translation = Vector3::new(
        rng.gen_range(-100.0..100.0),
        rng.gen_range(-100.0..100.0),
        rng.gen_range(-100.0..100.0),
    );
    let rotation = UnitQuaternion::from_euler_angles(
        rng.gen_range(-3.0..3.0),
        rng.gen_range(-1.5..1.5),
        rng.gen_range(-3.0..3.0),
    );
    Transform::new(translation, rotation, 0.0, Validity::forever())
}

fn attach(graph: &mut FrameGraph, child: FrameId, transform: Transform, parent: FrameId) {
    graph
        .frame(child)
        .unwrap()
        .request_set_transform_and_parent(transform, Some(parent));
    assert_eq!(graph.parent(child), Some(parent));
}

fn compute(graph: &mut FrameGraph, from: FrameId, to: FrameId) -> Option<Transform> {
    let observer = TransformObserver::new();
    let id = observer.observe(graph, from).unwrap();
    graph.frame(from).unwrap().request_compute_transform_to(Some(to));
    graph.remove_observer(from, id);
    observer.transform()
}

fn assert_equivalent(actual: &Transform, expected: &Transform) {
    assert!(
        actual.is_numerically_equivalent(expected, TOLERANCE),
        "expected {expected}\n     got {actual}"
    );
}

struct Scenario {
    graph: FrameGraph,
    root: FrameId,
    a: FrameId,
    b: FrameId,
    c: FrameId,
    d: FrameId,
    e: FrameId,
    f: FrameId,
    g: FrameId,
    h: FrameId,
    t_ar: Transform,
    t_br: Transform,
    t_ca: Transform,
    t_db: Transform,
    t_fc: Transform,
    t_ga: Transform,
    t_ha: Transform,
}

/// Root
/// ├── A
/// │   ├── C
/// │   │   └── F
/// │   ├── G
/// │   └── H
/// └── B
///     └── D
/// E (unconnected)
fn scenario(seed: u64) -> Scenario {
    let _ = TestLogger::init(LevelFilter::Debug, Config::default());
    let mut rng = StdRng::seed_from_u64(seed);
    let mut graph = FrameGraph::new();
    let root = graph.add_frame("Root", "World");
    let a = graph.add_frame("A", "Tracker");
    let b = graph.add_frame("B", "Tracker");
    let c = graph.add_frame("C", "Tool");
    let d = graph.add_frame("D", "Tool");
    let e = graph.add_frame("E", "Image");
    let f = graph.add_frame("F", "Tool");
    let g = graph.add_frame("G", "View");
    let h = graph.add_frame("H", "View");

    let t_ar = random_transform(&mut rng);
    let quarter_turn = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), FRAC_PI_2);
    let t_br = Transform::from_rotation(quarter_turn);
    let t_ca = Transform::from_translation(Vector3::new(10.0, 0.0, 0.0));
    let t_db = random_transform(&mut rng);
    let t_fc = random_transform(&mut rng);
    let t_ga = random_transform(&mut rng);
    let t_ha = random_transform(&mut rng);

    attach(&mut graph, a, t_ar, root);
    attach(&mut graph, b, t_br, root);
    attach(&mut graph, c, t_ca, a);
    attach(&mut graph, d, t_db, b);
    attach(&mut graph, f, t_fc, c);
    attach(&mut graph, g, t_ga, a);
    attach(&mut graph, h, t_ha, a);

    Scenario {
        graph,
        root,
        a,
        b,
        c,
        d,
        e,
        f,
        g,
        h,
        t_ar,
        t_br,
        t_ca,
        t_db,
        t_fc,
        t_ga,
        t_ha,
    }
}

#[test]
fn test_transform_to_self_is_identity() {
    let mut s = scenario(1);
    for id in [s.root, s.a, s.c, s.e, s.f] {
        let recorder = EventRecorder::new();
        recorder.observe(&mut s.graph, id);
        s.graph.frame(id).unwrap().request_compute_transform_to(Some(id));
        match recorder.last() {
            Some(CoordinateSystemEvent::TransformTo(result)) => {
                assert!(result.transform.is_identity(TOLERANCE));
                assert_eq!(result.source, id);
                assert_eq!(result.destination, id);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}

#[test]
fn test_root_to_children() {
    let mut s = scenario(2);
    let root_to_a = compute(&mut s.graph, s.root, s.a).unwrap();
    assert_equivalent(&root_to_a, &s.t_ar.inverse());

    let root_to_c = compute(&mut s.graph, s.root, s.c).unwrap();
    assert_equivalent(&root_to_c, &Transform::compose(&s.t_ar, &s.t_ca).inverse());

    let c_to_root = compute(&mut s.graph, s.c, s.root).unwrap();
    assert_equivalent(&c_to_root, &Transform::compose(&s.t_ar, &s.t_ca));
}

#[test]
fn test_pure_rotation_child() {
    let mut s = scenario(3);
    let b_to_root = compute(&mut s.graph, s.b, s.root).unwrap();
    assert_equivalent(&b_to_root, &s.t_br);
    let p = b_to_root.transform_point(&Point3::new(0.0, 1.0, 0.0));
    assert!((p.coords - Vector3::new(0.0, 0.0, 1.0)).norm() < TOLERANCE);
}

#[test]
fn test_between_siblings_branches() {
    let mut s = scenario(4);
    let f_to_g = compute(&mut s.graph, s.f, s.g).unwrap();
    let expected = Transform::compose(&s.t_ga.inverse(), &Transform::compose(&s.t_ca, &s.t_fc));
    assert_equivalent(&f_to_g, &expected);

    let d_to_h = compute(&mut s.graph, s.d, s.h).unwrap();
    let d_to_root = Transform::compose(&s.t_br, &s.t_db);
    let h_to_root = Transform::compose(&s.t_ar, &s.t_ha);
    assert_equivalent(&d_to_h, &Transform::compose(&h_to_root.inverse(), &d_to_root));
}

#[test]
fn test_common_ancestor_is_reported() {
    let mut s = scenario(5);
    let observer = TransformObserver::new();
    observer.observe(&mut s.graph, s.f);
    s.graph.frame(s.f).unwrap().request_compute_transform_to(Some(s.h));
    let result = observer.result().unwrap();
    assert_eq!(result.source, s.f);
    assert_eq!(result.destination, s.h);
    assert_eq!(result.common_ancestor, Some(s.a));

    s.graph.frame(s.f).unwrap().request_compute_transform_to(Some(s.d));
    assert_eq!(observer.result().unwrap().common_ancestor, Some(s.root));
}

#[test]
fn test_inverse_consistency() {
    let mut s = scenario(6);
    let pairs = [(s.f, s.g), (s.d, s.c), (s.root, s.h), (s.b, s.a)];
    for (x, y) in pairs {
        let x_to_y = compute(&mut s.graph, x, y).unwrap();
        let y_to_x = compute(&mut s.graph, y, x).unwrap();
        assert!(Transform::compose(&y_to_x, &x_to_y).is_identity(1e-8));
        assert!(Transform::compose(&x_to_y, &y_to_x).is_identity(1e-8));
    }
}

#[test]
fn test_unconnected_frame() {
    let mut s = scenario(7);
    assert!(compute(&mut s.graph, s.root, s.e).is_none());
    assert!(compute(&mut s.graph, s.e, s.f).is_none());

    let recorder = EventRecorder::new();
    recorder.observe(&mut s.graph, s.root);
    s.graph.frame(s.root).unwrap().request_compute_transform_to(Some(s.e));
    match recorder.last() {
        Some(CoordinateSystemEvent::TransformToDisconnected(result)) => {
            assert_eq!(result.source, s.root);
            assert_eq!(result.destination, Some(s.e));
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn test_transform_to_parent() {
    let mut s = scenario(8);
    let observer = TransformObserver::new();
    observer.observe(&mut s.graph, s.g);
    s.graph.frame(s.g).unwrap().request_get_transform_to_parent();
    assert_equivalent(&observer.transform().unwrap(), &s.t_ga);
    assert_equivalent(&s.graph.transform_to_parent(s.g).unwrap(), &s.t_ga);
}

#[test]
fn test_reference_graph_shape() {
    let s = scenario(9);
    assert_eq!(s.graph.len(), 9);
    assert_eq!(s.graph.roots(), vec![s.root, s.e]);
    assert_eq!(s.graph.children(s.a), vec![s.c, s.g, s.h]);
    assert_eq!(s.graph.lowest_common_ancestor(s.f, s.g), Some(s.a));
    assert!(s.graph.can_reach(s.f, s.root));
    assert!(!s.graph.can_reach(s.f, s.b));
}
