use stackcat_definitions::{
    catalog::{self, *},
    Config, ErrorKind, FieldRef, GraphBuilder, ResourceGraph, ResourceKind, ResourceSpec,
};

fn namespace() -> ResourceSpec {
    ResourceSpec::new(
        "app-namespace",
        ResourceKind::Namespace,
        serde_json::json!({"metadata": {"name": "app-namespace"}}),
    )
}

// every edge must point forward in the given order
fn assert_edges_respected(graph: &ResourceGraph, order: &[&str]) {
    let pos = |id: &str| order.iter().position(|x| *x == id).unwrap();
    for id in order {
        for p in graph.predecessors(id) {
            assert!(pos(p) < pos(*id), "{} must come before {}", p, id);
        }
    }
}

#[test]
fn namespace_before_deployment() {
    let mut b = GraphBuilder::new();
    b.declare(namespace(), &[]).unwrap();
    let mut deploy = ResourceSpec::new(
        "nginx",
        ResourceKind::Deployment,
        serde_json::json!({"metadata": {"name": "nginx"}}),
    );
    deploy
        .fields
        .set("metadata.namespace", FieldRef::name("app-namespace"))
        .unwrap();
    b.declare(deploy, &[]).unwrap();
    let graph = b.build().unwrap();
    assert_eq!(graph.order(), vec!["app-namespace", "nginx"]);
}

#[test]
fn deployment_declared_before_its_namespace() {
    let conf = Config::default();
    let mut b = GraphBuilder::new();
    b.declare(app_deployment(&conf).unwrap(), &[]).unwrap();
    b.declare(catalog::namespace(&conf), &[]).unwrap();
    let graph = b.build().unwrap();
    assert_eq!(graph.order(), vec![NAMESPACE, APP_DEPLOYMENT]);
}

#[test]
fn deployment_without_namespace_is_incomplete() {
    let conf = Config::default();
    let mut b = GraphBuilder::new();
    b.declare(app_deployment(&conf).unwrap(), &[]).unwrap();
    match b.build().unwrap_err().kind() {
        ErrorKind::IncompleteReference(node, target) => {
            assert_eq!(node, APP_DEPLOYMENT);
            assert_eq!(target, NAMESPACE);
        }
        k => panic!("unexpected error {:?}", k),
    }
}

#[test]
fn metrics_chain() {
    let conf = Config::default();
    let mut b = GraphBuilder::new();
    b.declare(metrics_deployment(&conf), &[]).unwrap();
    b.declare(metrics_service(&conf), &[METRICS_DEPLOYMENT]).unwrap();
    b.declare(metrics_api(&conf), &[METRICS_SERVICE]).unwrap();
    let graph = b.build().unwrap();
    assert_eq!(graph.order(), vec![METRICS_DEPLOYMENT, METRICS_SERVICE, METRICS_API]);
}

#[test]
fn ingress_needs_the_bundle_declared() {
    let conf = Config::default();
    let mut b = GraphBuilder::new();
    b.declare(catalog::namespace(&conf), &[]).unwrap();
    b.declare(app_service(&conf).unwrap(), &[]).unwrap();
    let err = b
        .declare(app_ingress(&conf).unwrap(), &[INGRESS_CONTROLLER])
        .unwrap_err();
    match err.kind() {
        ErrorKind::UnknownPredecessor(node, pred) => {
            assert_eq!(node, APP_INGRESS);
            assert_eq!(pred, INGRESS_CONTROLLER);
        }
        k => panic!("unexpected error {:?}", k),
    }
}

#[test]
fn hpa_without_deployment_is_incomplete() {
    let conf = Config::default();
    let mut b = GraphBuilder::new();
    b.declare(catalog::namespace(&conf), &[]).unwrap();
    b.declare(metrics_deployment(&conf), &[]).unwrap();
    b.declare(metrics_service(&conf), &[METRICS_DEPLOYMENT]).unwrap();
    b.declare(metrics_api(&conf), &[METRICS_SERVICE]).unwrap();
    b.declare(app_hpa(&conf).unwrap(), &[METRICS_API]).unwrap();
    match b.build().unwrap_err().kind() {
        ErrorKind::IncompleteReference(node, target) => {
            assert_eq!(node, APP_HPA);
            assert_eq!(target, APP_DEPLOYMENT);
        }
        k => panic!("unexpected error {:?}", k),
    }
}

#[test]
fn mutual_requirement_is_a_cycle() {
    let conf = Config::default();
    let mut b = GraphBuilder::new();
    b.declare(catalog::namespace(&conf), &[]).unwrap();
    // the hpa needs the deployment name, the deployment must wait for the hpa
    b.declare(app_hpa(&conf).unwrap(), &[]).unwrap();
    let err = b
        .declare(app_deployment(&conf).unwrap(), &[APP_HPA])
        .unwrap_err();
    match err.kind() {
        ErrorKind::CyclicDependency(node, other) => {
            assert_eq!(node, APP_DEPLOYMENT);
            assert_eq!(other, APP_HPA);
        }
        k => panic!("unexpected error {:?}", k),
    }
}

#[test]
fn catalog_teardown_order() {
    let graph = catalog::build(&Config::default()).unwrap();
    let mut expected = vec![
        NAMESPACE,
        APP_DEPLOYMENT,
        APP_SERVICE,
        INGRESS_CONTROLLER,
        APP_INGRESS,
        METRICS_DEPLOYMENT,
        METRICS_SERVICE,
        METRICS_API,
        APP_HPA,
    ];
    assert_eq!(graph.order(), expected);
    expected.reverse();
    assert_eq!(graph.teardown_order(), expected);
    assert_edges_respected(&graph, &graph.order());
}

#[test]
fn catalog_layers() {
    let graph = catalog::build(&Config::default()).unwrap();
    let layers = graph.layers();
    assert_eq!(layers[0], vec![NAMESPACE, INGRESS_CONTROLLER, METRICS_DEPLOYMENT]);
    // nothing inside a layer depends on anything else in it
    for layer in &layers {
        for id in layer {
            for p in graph.predecessors(id) {
                assert!(!layer.contains(&p));
            }
        }
    }
    assert_eq!(layers.iter().map(Vec::len).sum::<usize>(), graph.len());
}

// Tiny deterministic shuffle so the test needs no rng crate
fn shuffled<T>(mut xs: Vec<T>, seed: u64) -> Vec<T> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    for i in (1..xs.len()).rev() {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let j = (state >> 33) as usize % (i + 1);
        xs.swap(i, j);
    }
    xs
}

#[test]
fn any_consistent_declaration_order_builds() {
    let conf = Config::default();
    for seed in 0..200 {
        let mut pool = shuffled(declarations(&conf).unwrap(), seed);
        // pick any declaration whose explicit and referenced predecessors are in
        let mut decls = vec![];
        while !pool.is_empty() {
            let declared = decls.iter().map(|d: &Declaration| d.spec.id.clone()).collect::<Vec<_>>();
            let next = pool
                .iter()
                .position(|d| {
                    d.after
                        .iter()
                        .map(|a| a.to_string())
                        .chain(d.spec.references().into_iter().map(|r| r.resource.clone()))
                        .all(|p| declared.contains(&p))
                })
                .unwrap();
            decls.push(pool.remove(next));
        }
        let graph = assemble(decls).unwrap().build().unwrap();
        assert_eq!(graph.len(), 9);
        assert_edges_respected(&graph, &graph.order());
        // every edge is there regardless of declaration order
        let preds = graph.predecessors(APP_INGRESS);
        assert!(preds.contains(&APP_SERVICE));
        assert!(preds.contains(&INGRESS_CONTROLLER));
        let preds = graph.predecessors(APP_HPA);
        assert!(preds.contains(&APP_DEPLOYMENT));
        assert!(preds.contains(&METRICS_API));
        assert!(preds.contains(&NAMESPACE));
    }
}

#[test]
fn graph_serializes() {
    let graph = catalog::build(&Config::default()).unwrap();
    let yaml = graph.to_yaml().unwrap();
    assert!(yaml.contains("fromResource: nginx-service"));
    let dot = graph.to_dot();
    assert!(dot.contains("dependsOn"));
    assert!(dot.contains("nginx-hpa"));
}
