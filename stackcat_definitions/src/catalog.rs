use super::{Config, FieldRef, FieldValue, GraphBuilder, ResourceGraph, ResourceKind, ResourceSpec, Result};

// Logical ids of the stack
pub const NAMESPACE: &str = "app-namespace";
pub const APP_DEPLOYMENT: &str = "nginx-deployment";
pub const APP_SERVICE: &str = "nginx-service";
pub const INGRESS_CONTROLLER: &str = "ingress-controller";
pub const APP_INGRESS: &str = "nginx-ingress";
pub const METRICS_DEPLOYMENT: &str = "metrics-server";
pub const METRICS_SERVICE: &str = "metrics-server-service";
pub const METRICS_API: &str = "metrics-server-api";
pub const APP_HPA: &str = "nginx-hpa";

const METRICS_NAME: &str = "metrics-server";

/// A resource spec along with its explicit predecessors
pub struct Declaration {
    pub spec: ResourceSpec,
    pub after: Vec<&'static str>,
}

impl Declaration {
    fn new(spec: ResourceSpec) -> Self {
        Declaration { spec, after: vec![] }
    }

    fn after(mut self, pred: &'static str) -> Self {
        self.after.push(pred);
        self
    }
}

// everything the app creates lives in the app namespace
fn in_app_namespace(mut fields: FieldValue) -> Result<FieldValue> {
    fields.set("metadata.namespace", FieldRef::name(NAMESPACE))?;
    Ok(fields)
}

pub fn namespace(conf: &Config) -> ResourceSpec {
    let fields = json!({ "metadata": { "name": conf.namespace } });
    ResourceSpec::new(NAMESPACE, ResourceKind::Namespace, fields)
}

pub fn metrics_deployment(conf: &Config) -> ResourceSpec {
    let ms = &conf.metricsServer;
    let labels = json!({ "k8s-app": METRICS_NAME });
    let fields = json!({
        "metadata": { "name": METRICS_NAME, "namespace": ms.namespace },
        "spec": {
            "selector": { "matchLabels": labels },
            "template": {
                "metadata": { "labels": labels },
                "spec": {
                    "containers": [{
                        "name": METRICS_NAME,
                        "image": ms.image,
                        "args": ms.args,
                        "ports": [{ "containerPort": ms.port }],
                    }]
                }
            }
        }
    });
    ResourceSpec::new(METRICS_DEPLOYMENT, ResourceKind::Deployment, fields)
}

pub fn metrics_service(conf: &Config) -> ResourceSpec {
    let ms = &conf.metricsServer;
    let fields = json!({
        "metadata": { "name": METRICS_NAME, "namespace": ms.namespace },
        "spec": {
            "selector": { "k8s-app": METRICS_NAME },
            "ports": [{ "protocol": "TCP", "port": ms.port, "targetPort": ms.port }],
        }
    });
    ResourceSpec::new(METRICS_SERVICE, ResourceKind::Service, fields)
}

pub fn metrics_api(conf: &Config) -> ResourceSpec {
    let fields = json!({
        "metadata": { "name": "v1beta1.metrics.k8s.io" },
        "spec": {
            "service": { "name": METRICS_NAME, "namespace": conf.metricsServer.namespace },
            "group": "metrics.k8s.io",
            "version": "v1beta1",
            "insecureSkipTLSVerify": true,
            "groupPriorityMinimum": 100,
            "versionPriority": 100,
        }
    });
    ResourceSpec::new(METRICS_API, ResourceKind::APIService, fields)
}

pub fn ingress_controller(conf: &Config) -> ResourceSpec {
    ResourceSpec::remote(INGRESS_CONTROLLER, &conf.ingressController.manifest)
}

pub fn app_deployment(conf: &Config) -> Result<ResourceSpec> {
    let app = &conf.app;
    let labels = json!({ "app": app.name });
    let fields = json!({
        "metadata": { "name": app.name },
        "spec": {
            "selector": { "matchLabels": labels },
            "replicas": app.replicas,
            "template": {
                "metadata": { "labels": labels },
                "spec": {
                    "containers": [{
                        "name": app.name,
                        "image": app.image,
                        "ports": [{ "containerPort": app.port }],
                        "resources": serde_json::to_value(&app.resources)?,
                    }]
                }
            }
        }
    });
    let fields = in_app_namespace(fields.into())?;
    Ok(ResourceSpec::new(APP_DEPLOYMENT, ResourceKind::Deployment, fields))
}

pub fn app_service(conf: &Config) -> Result<ResourceSpec> {
    let app = &conf.app;
    let fields = json!({
        "metadata": { "name": app.service_name() },
        "spec": {
            "selector": { "app": app.name },
            "ports": [{ "protocol": "TCP", "port": app.port, "targetPort": app.port }],
            "type": "ClusterIP",
        }
    });
    let fields = in_app_namespace(fields.into())?;
    Ok(ResourceSpec::new(APP_SERVICE, ResourceKind::Service, fields))
}

pub fn app_ingress(conf: &Config) -> Result<ResourceSpec> {
    let app = &conf.app;
    let fields = json!({
        "metadata": { "name": app.ingress_name() },
        "spec": {
            "ingressClassName": conf.ingressController.className,
            "rules": [{
                "host": app.host,
                "http": {
                    "paths": [{
                        "path": "/",
                        "pathType": "Prefix",
                        "backend": {
                            "service": { "port": { "number": app.port } }
                        }
                    }]
                }
            }]
        }
    });
    let mut fields = in_app_namespace(fields.into())?;
    fields.set(
        "spec.rules.0.http.paths.0.backend.service.name",
        FieldRef::name(APP_SERVICE),
    )?;
    Ok(ResourceSpec::new(APP_INGRESS, ResourceKind::Ingress, fields))
}

pub fn app_hpa(conf: &Config) -> Result<ResourceSpec> {
    let hpa = &conf.autoscaling;
    let fields = json!({
        "metadata": { "name": conf.app.hpa_name() },
        "spec": {
            "scaleTargetRef": { "apiVersion": "apps/v1", "kind": "Deployment" },
            "minReplicas": hpa.minReplicas,
            "maxReplicas": hpa.maxReplicas,
            "metrics": [{
                "type": "Resource",
                "resource": {
                    "name": "cpu",
                    "target": { "type": "Utilization", "averageUtilization": hpa.cpuUtilization }
                }
            }]
        }
    });
    let mut fields = in_app_namespace(fields.into())?;
    fields.set("spec.scaleTargetRef.name", FieldRef::name(APP_DEPLOYMENT))?;
    Ok(ResourceSpec::new(APP_HPA, ResourceKind::HorizontalPodAutoscaler, fields))
}

/// The full declaration sequence of the stack
///
/// The sequence is consistent with every edge, so it is also the creation order.
/// The HPA only waits for the APIService registration to exist, not for the
/// metrics-server to actually serve.
pub fn declarations(conf: &Config) -> Result<Vec<Declaration>> {
    Ok(vec![
        Declaration::new(namespace(conf)),
        Declaration::new(app_deployment(conf)?),
        Declaration::new(app_service(conf)?),
        Declaration::new(ingress_controller(conf)),
        Declaration::new(app_ingress(conf)?).after(INGRESS_CONTROLLER),
        Declaration::new(metrics_deployment(conf)),
        Declaration::new(metrics_service(conf)).after(METRICS_DEPLOYMENT),
        Declaration::new(metrics_api(conf)).after(METRICS_SERVICE),
        Declaration::new(app_hpa(conf)?).after(METRICS_API),
    ])
}

/// Named outputs of the stack
pub fn exports() -> Vec<(&'static str, FieldRef)> {
    vec![
        ("namespaceName", FieldRef::name(NAMESPACE)),
        ("deploymentName", FieldRef::name(APP_DEPLOYMENT)),
        ("serviceName", FieldRef::name(APP_SERVICE)),
        ("ingressName", FieldRef::name(APP_INGRESS)),
    ]
}

/// Declare a sequence and its exports into a fresh builder
pub fn assemble(decls: Vec<Declaration>) -> Result<GraphBuilder> {
    let mut builder = GraphBuilder::new();
    for d in decls {
        builder.declare(d.spec, &d.after)?;
    }
    for (name, r) in exports() {
        builder.export(name, r)?;
    }
    Ok(builder)
}

/// Build the stack graph for a config
pub fn build(conf: &Config) -> Result<ResourceGraph> {
    let graph = assemble(declarations(conf)?)?.build()?;
    debug!("Catalog for namespace {} has {} resources", conf.namespace, graph.len());
    Ok(graph)
}
