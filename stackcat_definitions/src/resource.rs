use serde_json::Value;
use std::fmt::{self, Debug};

use super::{ErrorKind, FieldRef, FieldValue, Result};

/// Kubernetes object kinds declared by the stack
///
/// Each kind maps to a fixed api group version on the cluster side.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Namespace,
    Deployment,
    Service,
    /// Aggregation layer registration
    APIService,
    Ingress,
    HorizontalPodAutoscaler,
    /// A remote multi-document manifest applied as one unit
    ConfigFile,
}

impl ResourceKind {
    /// The apiVersion to stamp on rendered objects
    ///
    /// Bundles carry their own per document.
    pub fn api_version(self) -> Option<&'static str> {
        match self {
            ResourceKind::Namespace | ResourceKind::Service => Some("v1"),
            ResourceKind::Deployment => Some("apps/v1"),
            ResourceKind::APIService => Some("apiregistration.k8s.io/v1"),
            ResourceKind::Ingress => Some("networking.k8s.io/v1"),
            ResourceKind::HorizontalPodAutoscaler => Some("autoscaling/v2"),
            ResourceKind::ConfigFile => None,
        }
    }

    /// Whether objects of this kind live inside a namespace
    pub fn namespaced(self) -> bool {
        match self {
            ResourceKind::Deployment
            | ResourceKind::Service
            | ResourceKind::Ingress
            | ResourceKind::HorizontalPodAutoscaler => true,
            ResourceKind::Namespace | ResourceKind::APIService | ResourceKind::ConfigFile => false,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// One desired kubernetes object
///
/// Immutable once declared into a `GraphBuilder`.
#[derive(Serialize, Deserialize, Clone)]
pub struct ResourceSpec {
    /// Logical id, unique within a graph
    pub id: String,
    pub kind: ResourceKind,
    /// Object body, minus `apiVersion` and `kind` which are stamped on render
    #[serde(default)]
    pub fields: FieldValue,
    /// Remote location of the documents for `ConfigFile` resources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

// Debug is used for the `dot` interface - keep it to the id
impl Debug for ResourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl ResourceSpec {
    pub fn new<F: Into<FieldValue>>(id: &str, kind: ResourceKind, fields: F) -> Self {
        ResourceSpec {
            id: id.into(),
            kind,
            fields: fields.into(),
            source: None,
        }
    }

    /// A bundle whose documents are fetched from `url` at apply time
    pub fn remote(id: &str, url: &str) -> Self {
        ResourceSpec {
            id: id.into(),
            kind: ResourceKind::ConfigFile,
            fields: FieldValue::default(),
            source: Some(url.into()),
        }
    }

    pub fn is_remote(&self) -> bool {
        self.source.is_some()
    }

    pub fn name(&self) -> Option<&FieldValue> {
        self.fields.get("metadata.name")
    }

    pub fn namespace(&self) -> Option<&FieldValue> {
        self.fields.get("metadata.namespace")
    }

    pub fn references(&self) -> Vec<&FieldRef> {
        self.fields.references()
    }

    /// Shape checks that do not need the rest of the graph
    pub fn verify(&self) -> Result<()> {
        if self.id.is_empty() {
            bail!("resources need a non-empty id");
        }
        if self.kind == ResourceKind::ConfigFile {
            if self.source.is_none() {
                bail!("{} is a ConfigFile without a source", self.id);
            }
            return Ok(());
        }
        if self.source.is_some() {
            bail!("{} is a {} and cannot have a remote source", self.id, self.kind);
        }
        if self.name().is_none() {
            bail!("{} needs a metadata.name", self.id);
        }
        for r in self.references() {
            r.verify()?;
        }
        match (self.kind.namespaced(), self.namespace()) {
            (true, None) | (false, Some(_)) => bail!(ErrorKind::InconsistentNamespace(self.id.clone())),
            (true, Some(FieldValue::Literal(Value::String(ns)))) if ns.is_empty() => {
                bail!(ErrorKind::InconsistentNamespace(self.id.clone()))
            }
            (true, Some(FieldValue::Literal(Value::String(_)))) | (true, Some(FieldValue::Ref(_))) => {}
            (true, Some(_)) => bail!(ErrorKind::InconsistentNamespace(self.id.clone())),
            (false, None) => {}
        }
        Ok(())
    }

    /// Render the kube object, resolving references through `lookup`
    ///
    /// Only meaningful for inline resources; bundles render to their (empty) field map.
    pub fn render<F>(&self, lookup: &F) -> std::result::Result<Value, FieldRef>
    where
        F: Fn(&FieldRef) -> Option<Value>,
    {
        let mut obj = self.fields.resolve(lookup)?;
        if let (Some(av), Value::Object(m)) = (self.kind.api_version(), &mut obj) {
            m.insert("apiVersion".into(), json!(av));
            m.insert("kind".into(), json!(self.kind.to_string()));
        }
        Ok(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::{ResourceKind, ResourceSpec};
    use crate::{ErrorKind, FieldRef};

    fn deployment(ns: Option<crate::FieldValue>) -> ResourceSpec {
        let mut rs = ResourceSpec::new(
            "nginx-deployment",
            ResourceKind::Deployment,
            json!({"metadata": {"name": "nginx"}, "spec": {"replicas": 3}}),
        );
        if let Some(n) = ns {
            rs.fields.set("metadata.namespace", n).unwrap();
        }
        rs
    }

    #[test]
    fn namespace_shapes() {
        assert!(deployment(Some("app-namespace".into())).verify().is_ok());
        assert!(deployment(Some(FieldRef::name("app-namespace").into())).verify().is_ok());

        let missing = deployment(None).verify().unwrap_err();
        match missing.kind() {
            ErrorKind::InconsistentNamespace(id) => assert_eq!(id, "nginx-deployment"),
            k => panic!("unexpected error {:?}", k),
        }
        assert!(deployment(Some(3u32.into())).verify().is_err());
        assert!(deployment(Some("".into())).verify().is_err());

        // cluster scoped kinds cannot carry one
        let mut ns = ResourceSpec::new(
            "app-namespace",
            ResourceKind::Namespace,
            json!({"metadata": {"name": "app-namespace"}}),
        );
        assert!(ns.verify().is_ok());
        ns.fields.set("metadata.namespace", "default").unwrap();
        assert!(ns.verify().is_err());
    }

    #[test]
    fn remote_bundles() {
        let bundle = ResourceSpec::remote("ingress-controller", "https://example.com/deploy.yaml");
        assert!(bundle.verify().is_ok());
        assert!(bundle.is_remote());

        let mut broken = deployment(Some("x".into()));
        broken.source = Some("https://example.com".into());
        assert!(broken.verify().is_err());
    }

    #[test]
    fn render_stamps_type_meta() {
        let rs = deployment(Some(FieldRef::name("app-namespace").into()));
        let obj = rs
            .render(&|r: &FieldRef| {
                assert_eq!(r.path, "metadata.name");
                Some(json!("app-namespace"))
            })
            .unwrap();
        assert_eq!(obj["apiVersion"], json!("apps/v1"));
        assert_eq!(obj["kind"], json!("Deployment"));
        assert_eq!(obj["metadata"]["namespace"], json!("app-namespace"));
        assert_eq!(obj["spec"]["replicas"], json!(3));
    }
}
