use std::path::Path;

use super::{
    catalog,
    engine::{ApplyEngine, Reconciler, Report},
    kubectl::Kubectl,
    Config, ResourceGraph, Result,
};

/// Directory for generated manifests and the written kubeconfig
pub const WORKDIR: &str = ".stackcat";

/// Verify the config and build the stack graph from it
pub fn graph(conf: &Config) -> Result<ResourceGraph> {
    conf.verify()?;
    Ok(catalog::build(conf)?)
}

fn kubectl_engine(kubeconfig: &str) -> Result<Reconciler<Kubectl>> {
    Ok(Reconciler::new(Kubectl::new(kubeconfig, Path::new(WORKDIR))?))
}

/// Apply a graph with an engine, failing if any node did not reconcile
pub async fn submit<E: ApplyEngine + Sync>(engine: &E, graph: &ResourceGraph) -> Result<Report> {
    info!("Applying {} resources", graph.len());
    let report = engine.apply(graph).await?;
    report.print()?;
    report.into_result()
}

/// Delete a graph with an engine, failing if any node could not be deleted
pub async fn teardown<E: ApplyEngine + Sync>(engine: &E, graph: &ResourceGraph) -> Result<Report> {
    info!("Deleting {} resources", graph.len());
    let report = engine.destroy(graph).await?;
    report.print()?;
    report.into_result()
}

/// Create or update the whole stack
pub async fn up(conf: &Config) -> Result<Report> {
    // credentials first, before any graph work
    let kubeconfig = conf.kubeconfig()?;
    let graph = graph(conf)?;
    submit(&kubectl_engine(&kubeconfig)?, &graph).await
}

/// Delete the whole stack, successors first
pub async fn destroy(conf: &Config) -> Result<Report> {
    let kubeconfig = conf.kubeconfig()?;
    let graph = graph(conf)?;
    teardown(&kubectl_engine(&kubeconfig)?, &graph).await
}

/// Print the manifests in creation order without touching a cluster
///
/// References that only the cluster can fill in are left as comments.
pub fn preview(conf: &Config) -> Result<()> {
    let graph = graph(conf)?;
    for id in graph.order() {
        let spec = match graph.get(id) {
            Some(s) => s,
            None => continue,
        };
        if let Some(url) = &spec.source {
            println!("---\n# {} ({}) is fetched from {} at apply time", id, spec.kind, url);
            continue;
        }
        match graph.render_static(id) {
            Ok(obj) => println!("{}", serde_yaml::to_string(&obj)?),
            Err(r) => println!("---\n# {} waits for {} from the cluster", id, r),
        }
    }
    Ok(())
}
