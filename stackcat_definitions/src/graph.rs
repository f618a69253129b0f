use petgraph::{
    algo::{has_path_connecting, toposort},
    dot,
    graph::{DiGraph, NodeIndex},
    Direction,
};
use serde_json::Value;
use std::{
    cmp::Reverse,
    collections::{BTreeMap, BinaryHeap},
    fmt::{self, Debug},
};

use super::{ErrorKind, FieldRef, FieldValue, ResourceKind, ResourceSpec, Result};

/// The edge type in `StackGraph`
///
/// Points from predecessor to successor. One edge covers every reason the
/// successor has to wait for the predecessor.
#[derive(Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct DepEdge {
    /// Explicit ordering constraint without any data flowing along it
    #[serde(default)]
    pub ordering: bool,
    /// Predecessor field paths embedded in the successor
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
}
impl DepEdge {
    fn add_field(&mut self, path: &str) {
        if !self.fields.iter().any(|f| f == path) {
            self.fields.push(path.into());
        }
    }

    /// Whether the successor consumes an output of the predecessor
    pub fn carries_value(&self) -> bool {
        !self.fields.is_empty()
    }
}
// Debug doubles as the edge label in `dot` output
impl Debug for DepEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.ordering, self.fields.is_empty()) {
            (true, true) => write!(f, "dependsOn"),
            (false, _) => write!(f, "{}", self.fields.join(", ")),
            (true, false) => write!(f, "{} +dependsOn", self.fields.join(", ")),
        }
    }
}

/// Graph of resource specs with dependency edges
///
/// Serializable through the `petgraph` serde featureset, and convertible to
/// `graphviz` format through the `dot` helpers.
pub type StackGraph = DiGraph<ResourceSpec, DepEdge>;

fn nodeidx_from_id(id: &str, graph: &StackGraph) -> Option<NodeIndex> {
    graph.node_indices().find(|i| graph[*i].id == id)
}

fn namespace_ref(spec: &ResourceSpec) -> Option<&FieldRef> {
    spec.namespace().and_then(FieldValue::as_field_ref)
}

// only the name of a Namespace can be used as a namespace
fn holds_namespace_name(spec: &ResourceSpec, path: &str) -> bool {
    spec.kind == ResourceKind::Namespace && path == "metadata.name"
}

/// Append-only builder for a `ResourceGraph`
///
/// Every `declare` is validated on the spot and either fully applied or rejected.
#[derive(Default)]
pub struct GraphBuilder {
    graph: StackGraph,
    /// References from declared nodes to resources not declared yet
    pending: Vec<(NodeIndex, FieldRef)>,
    exports: BTreeMap<String, FieldRef>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        GraphBuilder::default()
    }

    /// Register a resource, with explicit predecessors that must be declared already
    ///
    /// Value edges are added for every reference to a declared resource.
    /// References to resources not yet declared are linked once those get declared.
    pub fn declare(&mut self, spec: ResourceSpec, after: &[&str]) -> Result<NodeIndex> {
        spec.verify()?;
        if nodeidx_from_id(&spec.id, &self.graph).is_some() {
            bail!(ErrorKind::DuplicateResource(spec.id));
        }

        let mut preds: BTreeMap<NodeIndex, DepEdge> = BTreeMap::new();
        for p in after {
            match nodeidx_from_id(p, &self.graph) {
                Some(idx) => preds.entry(idx).or_default().ordering = true,
                None => bail!(ErrorKind::UnknownPredecessor(spec.id, (*p).to_string())),
            }
        }
        if let Some(nsidx) = self.namespace_owner(&spec)? {
            preds.entry(nsidx).or_default().ordering = true;
        }

        let mut deferred = vec![];
        for r in spec.references() {
            if r.resource == spec.id {
                bail!(ErrorKind::CyclicDependency(spec.id.clone(), r.resource.clone()));
            }
            match nodeidx_from_id(&r.resource, &self.graph) {
                Some(idx) => preds.entry(idx).or_default().add_field(&r.path),
                None => deferred.push(r.clone()),
            }
        }

        let mut succs: BTreeMap<NodeIndex, DepEdge> = BTreeMap::new();
        for (from, r) in &self.pending {
            if r.resource == spec.id {
                let waiting = &self.graph[*from];
                if namespace_ref(waiting) == Some(r) && !holds_namespace_name(&spec, &r.path) {
                    bail!(ErrorKind::InconsistentNamespace(waiting.id.clone()));
                }
                succs.entry(*from).or_default().add_field(&r.path);
            }
        }
        // resources already declared into this namespace by name wait for it
        for m in self.namespace_members(&spec) {
            succs.entry(m).or_default().ordering = true;
        }

        let id = spec.id.clone();
        let idx = self.graph.add_node(spec);
        for (p, e) in preds {
            self.graph.update_edge(p, idx, e);
        }
        for (s, e) in &succs {
            self.graph.update_edge(idx, *s, e.clone());
        }
        // a cycle exists iff one of our successors can reach us again
        for s in succs.keys() {
            if has_path_connecting(&self.graph, *s, idx, None) {
                let other = self.graph[*s].id.clone();
                // removing the last node never shifts other indices
                self.graph.remove_node(idx);
                bail!(ErrorKind::CyclicDependency(id, other));
            }
        }

        self.pending.retain(|(_, r)| r.resource != id);
        self.pending.extend(deferred.into_iter().map(|r| (idx, r)));
        trace!("Declared {} with {} pending references", id, self.pending.len());
        Ok(idx)
    }

    /// Validate the namespace of a spec against declared namespaces
    ///
    /// A reference must point at the name of a Namespace. References to resources
    /// not declared yet are checked when their target gets declared.
    /// A literal naming a declared Namespace yields that Namespace as an owner to order after.
    fn namespace_owner(&self, spec: &ResourceSpec) -> Result<Option<NodeIndex>> {
        match spec.namespace() {
            Some(FieldValue::Ref(r)) => {
                if let Some(i) = nodeidx_from_id(&r.resource, &self.graph) {
                    if !holds_namespace_name(&self.graph[i], &r.path) {
                        bail!(ErrorKind::InconsistentNamespace(spec.id.clone()));
                    }
                }
                Ok(None) // the value edge orders it
            }
            Some(FieldValue::Literal(Value::String(ns))) => Ok(self.graph.node_indices().find(|i| {
                let n = &self.graph[*i];
                n.kind == ResourceKind::Namespace && n.name().and_then(FieldValue::as_str) == Some(ns.as_str())
            })),
            _ => Ok(None),
        }
    }

    /// Declared resources whose literal namespace is the name of `spec`, if it is a Namespace
    fn namespace_members(&self, spec: &ResourceSpec) -> Vec<NodeIndex> {
        let name = match (spec.kind, spec.name().and_then(FieldValue::as_str)) {
            (ResourceKind::Namespace, Some(n)) => n,
            _ => return vec![],
        };
        self.graph
            .node_indices()
            .filter(|i| self.graph[*i].namespace().and_then(FieldValue::as_str) == Some(name))
            .collect()
    }

    /// Expose a field of a resource as a named output of the stack
    pub fn export(&mut self, name: &str, r: FieldRef) -> Result<()> {
        r.verify()?;
        if self.exports.contains_key(name) {
            bail!(ErrorKind::DuplicateExport(name.into()));
        }
        self.exports.insert(name.into(), r);
        Ok(())
    }

    /// Finish the graph
    ///
    /// Fails if any reference (including exports) points at an undeclared resource.
    pub fn build(self) -> Result<ResourceGraph> {
        if let Some((from, r)) = self.pending.first() {
            let node = self.graph[*from].id.clone();
            bail!(ErrorKind::IncompleteReference(node, r.resource.clone()));
        }
        for (name, r) in &self.exports {
            if nodeidx_from_id(&r.resource, &self.graph).is_none() {
                bail!(ErrorKind::IncompleteReference(format!("export {}", name), r.resource.clone()));
            }
        }
        if let Err(c) = toposort(&self.graph, None) {
            let id = self.graph[c.node_id()].id.clone();
            bail!(ErrorKind::CyclicDependency(id.clone(), id));
        }
        debug!(
            "Built graph with {} resources and {} edges",
            self.graph.node_count(),
            self.graph.edge_count()
        );
        Ok(ResourceGraph {
            graph: self.graph,
            exports: self.exports,
        })
    }
}

/// A finished, acyclic resource graph
///
/// Node indices follow declaration order, which is used to break ties in ordering.
#[derive(Serialize, Clone, Debug)]
pub struct ResourceGraph {
    graph: StackGraph,
    exports: BTreeMap<String, FieldRef>,
}

impl ResourceGraph {
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn inner(&self) -> &StackGraph {
        &self.graph
    }

    pub fn get(&self, id: &str) -> Option<&ResourceSpec> {
        nodeidx_from_id(id, &self.graph).map(|i| &self.graph[i])
    }

    /// Resources in declaration order
    pub fn resources(&self) -> impl Iterator<Item = &ResourceSpec> {
        self.graph.node_indices().map(move |i| &self.graph[i])
    }

    pub fn exports(&self) -> &BTreeMap<String, FieldRef> {
        &self.exports
    }

    fn neighbours(&self, id: &str, dir: Direction) -> Vec<&str> {
        let mut res = match nodeidx_from_id(id, &self.graph) {
            Some(idx) => self.graph.neighbors_directed(idx, dir).collect::<Vec<_>>(),
            None => vec![],
        };
        res.sort();
        res.into_iter().map(|i| self.graph[i].id.as_str()).collect()
    }

    /// Resources that must exist before `id`
    pub fn predecessors(&self, id: &str) -> Vec<&str> {
        self.neighbours(id, Direction::Incoming)
    }

    /// Resources that must wait for `id`
    pub fn successors(&self, id: &str) -> Vec<&str> {
        self.neighbours(id, Direction::Outgoing)
    }

    pub fn edge(&self, from: &str, to: &str) -> Option<&DepEdge> {
        let a = nodeidx_from_id(from, &self.graph)?;
        let b = nodeidx_from_id(to, &self.graph)?;
        self.graph.find_edge(a, b).map(|e| &self.graph[e])
    }

    // Kahn's algorithm, always picking the earliest declared ready node
    fn sorted(&self) -> Vec<NodeIndex> {
        let mut indeg = self
            .graph
            .node_indices()
            .map(|i| self.graph.neighbors_directed(i, Direction::Incoming).count())
            .collect::<Vec<_>>();
        let mut ready = indeg
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| Reverse(i))
            .collect::<BinaryHeap<_>>();
        let mut res = Vec::with_capacity(indeg.len());
        while let Some(Reverse(i)) = ready.pop() {
            let idx = NodeIndex::new(i);
            res.push(idx);
            for s in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                indeg[s.index()] -= 1;
                if indeg[s.index()] == 0 {
                    ready.push(Reverse(s.index()));
                }
            }
        }
        res
    }

    /// Creation order
    ///
    /// Every edge points from an earlier to a later entry. Declaration order is
    /// preserved wherever the edges allow it.
    pub fn order(&self) -> Vec<&str> {
        self.sorted().into_iter().map(|i| self.graph[i].id.as_str()).collect()
    }

    /// Deletion order: the exact reverse of `order`
    pub fn teardown_order(&self) -> Vec<&str> {
        let mut res = self.order();
        res.reverse();
        res
    }

    /// Waves of resources that can be created concurrently
    ///
    /// Every predecessor of a resource sits in an earlier wave.
    pub fn layers(&self) -> Vec<Vec<&str>> {
        let mut depth = vec![0usize; self.graph.node_count()];
        let mut res: Vec<Vec<NodeIndex>> = vec![];
        for idx in self.sorted() {
            let d = self
                .graph
                .neighbors_directed(idx, Direction::Incoming)
                .map(|p| depth[p.index()] + 1)
                .max()
                .unwrap_or(0);
            depth[idx.index()] = d;
            if res.len() <= d {
                res.resize(d + 1, vec![]);
            }
            res[d].push(idx);
        }
        res.into_iter()
            .map(|mut layer| {
                layer.sort();
                layer.into_iter().map(|i| self.graph[i].id.as_str()).collect()
            })
            .collect()
    }

    /// Resolve a reference against declared values only
    ///
    /// Works when the referenced field is declared literally (or through other
    /// statically resolvable references). Runtime assigned fields give `None`.
    pub fn resolve_static(&self, r: &FieldRef) -> Option<Value> {
        let spec = self.get(&r.resource)?;
        let fv = spec.fields.get(&r.path)?;
        fv.resolve(&|inner: &FieldRef| self.resolve_static(inner)).ok()
    }

    /// Render the full manifest of a resource, resolving references through `lookup`
    ///
    /// Errors with the first reference that could not be resolved.
    pub fn render<F>(&self, id: &str, lookup: &F) -> std::result::Result<Value, FieldRef>
    where
        F: Fn(&FieldRef) -> Option<Value>,
    {
        match self.get(id) {
            Some(spec) => spec.render(lookup),
            None => Err(FieldRef::name(id)),
        }
    }

    /// Render a resource with statically resolved references
    pub fn render_static(&self, id: &str) -> std::result::Result<Value, FieldRef> {
        self.render(id, &|r: &FieldRef| self.resolve_static(r))
    }

    pub fn to_dot(&self) -> String {
        format!("{:?}", dot::Dot::with_config(&self.graph, &[]))
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}
