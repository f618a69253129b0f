use serde_json::{Map, Value};
use std::{collections::BTreeMap, fmt};

use super::{ErrorKind, Result};

/// A deferred value pointing at an output field of another resource
///
/// The field only becomes known once the source resource is materialized,
/// so anything embedding one of these cannot be submitted before its source.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(deny_unknown_fields)]
pub struct FieldRef {
    /// Logical id of the resource producing the field
    #[serde(rename = "fromResource")]
    pub resource: String,
    /// Dotted path into the produced object
    ///
    /// Numeric segments index into lists, e.g. `spec.ports.0.port`.
    #[serde(rename = "fieldPath")]
    pub path: String,
}

impl FieldRef {
    pub fn new(resource: &str, path: &str) -> Self {
        FieldRef {
            resource: resource.into(),
            path: path.into(),
        }
    }

    /// Reference to the `metadata.name` of a resource
    pub fn name(resource: &str) -> Self {
        FieldRef::new(resource, "metadata.name")
    }

    pub fn verify(&self) -> Result<()> {
        segments(&self.path)?;
        if self.resource.is_empty() {
            bail!(ErrorKind::InvalidFieldPath(self.to_string()));
        }
        Ok(())
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource, self.path)
    }
}

/// Split a dotted field path, rejecting empty segments
pub fn segments(path: &str) -> Result<Vec<&str>> {
    let segs = path.split('.').collect::<Vec<_>>();
    if segs.iter().any(|s| s.is_empty()) {
        bail!(ErrorKind::InvalidFieldPath(path.into()));
    }
    Ok(segs)
}

/// Walk a dotted path through a materialized json object
pub fn lookup_json<'a>(obj: &'a Value, path: &str) -> Option<&'a Value> {
    let mut cur = obj;
    for seg in path.split('.') {
        cur = match cur {
            Value::Object(m) => m.get(seg)?,
            Value::Array(xs) => xs.get(seg.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(cur)
}

/// A field in a resource spec: either known now, or deferred
///
/// Serialized untagged so that the field map reads like the kube object it becomes,
/// with references showing up as `{fromResource, fieldPath}` leaves.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    Ref(FieldRef),
    Map(BTreeMap<String, FieldValue>),
    List(Vec<FieldValue>),
    Literal(Value),
}

impl Default for FieldValue {
    fn default() -> Self {
        FieldValue::Map(BTreeMap::new())
    }
}

impl FieldValue {
    /// All references embedded anywhere in this value
    pub fn references(&self) -> Vec<&FieldRef> {
        let mut res = vec![];
        self.collect_refs(&mut res);
        res
    }

    fn collect_refs<'a>(&'a self, acc: &mut Vec<&'a FieldRef>) {
        match self {
            FieldValue::Ref(r) => acc.push(r),
            FieldValue::Map(m) => m.values().for_each(|v| v.collect_refs(acc)),
            FieldValue::List(xs) => xs.iter().for_each(|v| v.collect_refs(acc)),
            FieldValue::Literal(_) => {}
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Literal(Value::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_field_ref(&self) -> Option<&FieldRef> {
        match self {
            FieldValue::Ref(r) => Some(r),
            _ => None,
        }
    }

    /// Get a nested value by dotted path
    pub fn get(&self, path: &str) -> Option<&FieldValue> {
        let mut cur = self;
        for seg in path.split('.') {
            cur = match cur {
                FieldValue::Map(m) => m.get(seg)?,
                FieldValue::List(xs) => xs.get(seg.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(cur)
    }

    /// Set a nested value by dotted path
    ///
    /// Missing map keys along the way are created. List indices must already exist.
    pub fn set<V: Into<FieldValue>>(&mut self, path: &str, val: V) -> Result<()> {
        let segs = segments(path)?;
        let (last, parents) = match segs.split_last() {
            Some(split) => split,
            None => bail!(ErrorKind::InvalidFieldPath(path.into())),
        };
        let mut cur = self;
        for seg in parents {
            cur = match cur {
                FieldValue::Map(m) => m.entry((*seg).to_string()).or_insert_with(FieldValue::default),
                FieldValue::List(xs) => {
                    let idx = seg
                        .parse::<usize>()
                        .map_err(|_| ErrorKind::InvalidFieldPath(path.into()))?;
                    match xs.get_mut(idx) {
                        Some(v) => v,
                        None => bail!(ErrorKind::InvalidFieldPath(path.into())),
                    }
                }
                _ => bail!(ErrorKind::InvalidFieldPath(path.into())),
            };
        }
        match cur {
            FieldValue::Map(m) => {
                m.insert((*last).to_string(), val.into());
            }
            FieldValue::List(xs) => {
                let idx = last
                    .parse::<usize>()
                    .map_err(|_| ErrorKind::InvalidFieldPath(path.into()))?;
                match xs.get_mut(idx) {
                    Some(v) => *v = val.into(),
                    None => bail!(ErrorKind::InvalidFieldPath(path.into())),
                }
            }
            _ => bail!(ErrorKind::InvalidFieldPath(path.into())),
        }
        Ok(())
    }

    /// Produce plain json, resolving references through `lookup`
    ///
    /// The error carries the first reference `lookup` could not produce.
    pub fn resolve<F>(&self, lookup: &F) -> std::result::Result<Value, FieldRef>
    where
        F: Fn(&FieldRef) -> Option<Value>,
    {
        match self {
            FieldValue::Literal(v) => Ok(v.clone()),
            FieldValue::Ref(r) => lookup(r).ok_or_else(|| r.clone()),
            FieldValue::List(xs) => {
                let mut res = Vec::with_capacity(xs.len());
                for x in xs {
                    res.push(x.resolve(lookup)?);
                }
                Ok(Value::Array(res))
            }
            FieldValue::Map(m) => {
                let mut res = Map::new();
                for (k, v) in m {
                    res.insert(k.clone(), v.resolve(lookup)?);
                }
                Ok(Value::Object(res))
            }
        }
    }
}

impl From<Value> for FieldValue {
    fn from(v: Value) -> Self {
        match v {
            Value::Object(m) => FieldValue::Map(m.into_iter().map(|(k, v)| (k, v.into())).collect()),
            Value::Array(xs) => FieldValue::List(xs.into_iter().map(FieldValue::from).collect()),
            scalar => FieldValue::Literal(scalar),
        }
    }
}
impl From<FieldRef> for FieldValue {
    fn from(r: FieldRef) -> Self {
        FieldValue::Ref(r)
    }
}
impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Literal(Value::String(s.into()))
    }
}
impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Literal(Value::String(s))
    }
}
impl From<u32> for FieldValue {
    fn from(n: u32) -> Self {
        FieldValue::Literal(n.into())
    }
}
impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Literal(b.into())
    }
}

#[cfg(test)]
mod tests {
    use super::{lookup_json, FieldRef, FieldValue};

    fn ingressish() -> FieldValue {
        json!({
            "metadata": { "name": "nginx-ingress" },
            "spec": { "rules": [{ "http": { "paths": [{ "path": "/" }] } }] }
        })
        .into()
    }

    #[test]
    fn set_and_get_through_lists() {
        let mut fv = ingressish();
        let svc = FieldRef::name("nginx-service");
        fv.set("spec.rules.0.http.paths.0.backend.service.name", svc.clone())
            .unwrap();
        let got = fv.get("spec.rules.0.http.paths.0.backend.service.name").unwrap();
        assert_eq!(got.as_field_ref(), Some(&svc));
        assert_eq!(fv.get("metadata.name").unwrap().as_str(), Some("nginx-ingress"));
        assert_eq!(fv.references(), vec![&svc]);

        // lists never grow implicitly
        assert!(fv.set("spec.rules.1.host", "x").is_err());
        // cannot descend into scalars
        assert!(fv.set("metadata.name.first", "x").is_err());
        assert!(fv.set("metadata..name", "x").is_err());
    }

    #[test]
    fn resolve_reports_first_missing_ref() {
        let mut fv = ingressish();
        fv.set("metadata.namespace", FieldRef::name("ns")).unwrap();

        let resolved = fv
            .resolve(&|r: &FieldRef| {
                if r.resource == "ns" {
                    Some(json!("app-namespace"))
                } else {
                    None
                }
            })
            .unwrap();
        assert_eq!(resolved["metadata"]["namespace"], json!("app-namespace"));
        assert_eq!(resolved["spec"]["rules"][0]["http"]["paths"][0]["path"], json!("/"));

        let missing = fv.resolve(&|_: &FieldRef| None).unwrap_err();
        assert_eq!(missing, FieldRef::name("ns"));
    }

    #[test]
    fn refs_serialize_as_tagged_leaves() {
        let mut fv = FieldValue::default();
        fv.set("name", FieldRef::name("nginx-deployment")).unwrap();
        fv.set("kind", "Deployment").unwrap();
        let encoded = serde_json::to_value(&fv).unwrap();
        assert_eq!(
            encoded,
            json!({
                "kind": "Deployment",
                "name": { "fromResource": "nginx-deployment", "fieldPath": "metadata.name" }
            })
        );
        let decoded: FieldValue = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, fv);
    }

    #[test]
    fn json_lookup() {
        let obj = json!({"spec": {"ports": [{"port": 80}]}});
        assert_eq!(lookup_json(&obj, "spec.ports.0.port"), Some(&json!(80)));
        assert_eq!(lookup_json(&obj, "spec.ports.1.port"), None);
        assert_eq!(lookup_json(&obj, "spec.missing"), None);
    }
}
