use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use std::collections::BTreeMap;

use stackcat_definitions::value::lookup_json;

use super::{Error, ErrorKind, FieldRef, ResourceGraph, Result, ResultExt};

/// What an apply did to one node
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Change {
    Created,
    Configured,
    Unchanged,
}

/// Result of an apply for one node
pub struct Applied {
    pub change: Change,
    /// The objects as they exist on the cluster after the apply
    pub live: Vec<Value>,
}

/// Per node status in a `Report`
#[derive(Serialize, Clone, Debug, PartialEq)]
pub enum NodeStatus {
    Created,
    Configured,
    Unchanged,
    Deleted,
    /// Nothing to delete
    Absent,
    /// Failed with the given error chain
    Failed(String),
    /// Not attempted because the named neighbour did not succeed
    Skipped(String),
}

impl NodeStatus {
    pub fn is_ok(&self) -> bool {
        match self {
            NodeStatus::Failed(_) | NodeStatus::Skipped(_) => false,
            _ => true,
        }
    }
}

impl From<Change> for NodeStatus {
    fn from(c: Change) -> Self {
        match c {
            Change::Created => NodeStatus::Created,
            Change::Configured => NodeStatus::Configured,
            Change::Unchanged => NodeStatus::Unchanged,
        }
    }
}

#[derive(Serialize, Clone, Debug)]
pub struct NodeOutcome {
    pub id: String,
    pub status: NodeStatus,
}

/// Per node results of an apply or destroy, in the order nodes were handled
#[derive(Serialize, Clone, Debug, Default)]
pub struct Report {
    pub nodes: Vec<NodeOutcome>,
    /// Exports of the graph whose owning node materialized
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, Value>,
}

impl Report {
    fn push(&mut self, id: &str, status: NodeStatus) {
        self.nodes.push(NodeOutcome { id: id.into(), status });
    }

    pub fn status(&self, id: &str) -> Option<&NodeStatus> {
        self.nodes.iter().find(|n| n.id == id).map(|n| &n.status)
    }

    fn succeeded(&self, id: &str) -> bool {
        self.status(id).map(NodeStatus::is_ok).unwrap_or(false)
    }

    /// Ids of nodes that failed or were skipped
    pub fn unsuccessful(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|n| !n.status.is_ok())
            .map(|n| n.id.as_str())
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.nodes.iter().all(|n| n.status.is_ok())
    }

    /// Turn a partially failed run into an `ApplyFailed` error
    pub fn into_result(self) -> Result<Report> {
        if self.is_success() {
            return Ok(self);
        }
        let nodes = self.unsuccessful().into_iter().map(String::from).collect();
        bail!(ErrorKind::ApplyFailed(nodes))
    }

    pub fn print(&self) -> Result<()> {
        for n in &self.nodes {
            match &n.status {
                NodeStatus::Failed(e) => warn!("{}: failed: {}", n.id, e),
                NodeStatus::Skipped(by) => warn!("{}: skipped because of {}", n.id, by),
                s => info!("{}: {:?}", n.id, s),
            }
        }
        if !self.outputs.is_empty() {
            println!("{}", serde_yaml::to_string(&self.outputs)?);
        }
        Ok(())
    }
}

/// Flatten an error chain into one line
fn chain_string(e: &Error) -> String {
    e.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(": ")
}

/// The per node operations against a cluster
///
/// Implementations must be idempotent per node.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Create or update the objects of one node
    async fn apply(&self, id: &str, manifests: &[Value]) -> Result<Applied>;

    /// Delete the objects of one node, returning whether anything was deleted
    async fn delete(&self, id: &str, manifests: &[Value]) -> Result<bool>;

    /// Retrieve the documents of a remote bundle
    async fn fetch(&self, url: &str) -> Result<Vec<Value>> {
        super::fetch::bundle(url).await
    }
}

/// Something that can submit a whole graph
#[async_trait]
pub trait ApplyEngine {
    async fn apply(&self, graph: &ResourceGraph) -> Result<Report>;
    async fn destroy(&self, graph: &ResourceGraph) -> Result<Report>;
}

/// Walks the graph layer by layer, driving every node of a layer concurrently
///
/// There is no rollback. Failures propagate as skips along the graph edges.
pub struct Reconciler<D: Driver> {
    driver: D,
}

impl<D: Driver> Reconciler<D> {
    pub fn new(driver: D) -> Self {
        Reconciler { driver }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    async fn documents<F>(&self, graph: &ResourceGraph, id: &str, lookup: F) -> Result<Vec<Value>>
    where
        F: Fn(&FieldRef) -> Option<Value>,
    {
        let spec = match graph.get(id) {
            Some(s) => s,
            None => bail!("{} is not part of the graph", id),
        };
        if let Some(url) = &spec.source {
            let docs = self
                .driver
                .fetch(url)
                .await
                .chain_err(|| ErrorKind::RemoteFetchFailure(url.clone()))?;
            return Ok(docs);
        }
        match spec.render(&lookup) {
            Ok(obj) => Ok(vec![obj]),
            Err(r) => bail!("{} is not available", r),
        }
    }

    async fn apply_node(&self, graph: &ResourceGraph, id: &str, live: &BTreeMap<String, Value>) -> Result<Applied> {
        let lookup = |r: &FieldRef| live.get(&r.resource).and_then(|o| lookup_json(o, &r.path)).cloned();
        let docs = self.documents(graph, id, lookup).await?;
        debug!("Applying {} ({} documents)", id, docs.len());
        self.driver.apply(id, &docs).await
    }

    async fn delete_node(&self, graph: &ResourceGraph, id: &str) -> Result<bool> {
        let docs = self.documents(graph, id, |r| graph.resolve_static(r)).await?;
        debug!("Deleting {} ({} documents)", id, docs.len());
        self.driver.delete(id, &docs).await
    }
}

#[async_trait]
impl<D: Driver> ApplyEngine for Reconciler<D> {
    async fn apply(&self, graph: &ResourceGraph) -> Result<Report> {
        let mut report = Report::default();
        let mut live: BTreeMap<String, Value> = BTreeMap::new();
        for layer in graph.layers() {
            let mut ready = vec![];
            for id in layer {
                let blocker = graph.predecessors(id).into_iter().find(|p| !report.succeeded(p));
                match blocker {
                    Some(p) => report.push(id, NodeStatus::Skipped(p.into())),
                    None => ready.push(id),
                }
            }
            let results = {
                let live = &live;
                join_all(ready.iter().map(|id| self.apply_node(graph, id, live))).await
            };
            for (id, res) in ready.into_iter().zip(results) {
                match res.chain_err(|| ErrorKind::NodeApplyFailure(id.into())) {
                    Ok(applied) => {
                        if let Some(obj) = applied.live.into_iter().next() {
                            live.insert(id.into(), obj);
                        }
                        report.push(id, applied.change.into());
                    }
                    Err(e) => report.push(id, NodeStatus::Failed(chain_string(&e))),
                }
            }
        }
        for (name, r) in graph.exports() {
            if let Some(v) = live.get(&r.resource).and_then(|o| lookup_json(o, &r.path)) {
                report.outputs.insert(name.clone(), v.clone());
            }
        }
        Ok(report)
    }

    async fn destroy(&self, graph: &ResourceGraph) -> Result<Report> {
        let mut report = Report::default();
        let mut layers = graph.layers();
        layers.reverse();
        for layer in layers {
            let mut ready = vec![];
            for id in layer {
                let blocker = graph.successors(id).into_iter().find(|s| !report.succeeded(s));
                match blocker {
                    Some(s) => report.push(id, NodeStatus::Skipped(s.into())),
                    None => ready.push(id),
                }
            }
            let results = join_all(ready.iter().map(|id| self.delete_node(graph, id))).await;
            for (id, res) in ready.into_iter().zip(results) {
                match res.chain_err(|| ErrorKind::NodeApplyFailure(id.into())) {
                    Ok(true) => report.push(id, NodeStatus::Deleted),
                    Ok(false) => report.push(id, NodeStatus::Absent),
                    Err(e) => report.push(id, NodeStatus::Failed(chain_string(&e))),
                }
            }
        }
        Ok(report)
    }
}
