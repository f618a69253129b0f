use serde::Deserialize;
use serde_json::Value;

use super::{ErrorKind, Result};

/// Fetch a remote multi-document manifest
pub async fn bundle(url: &str) -> Result<Vec<Value>> {
    debug!("Fetching manifest bundle from {}", url);
    let res = reqwest::get(url).await?;
    if !res.status().is_success() {
        bail!(ErrorKind::UnexpectedHttpStatus(res.status()));
    }
    let body = res.text().await?;
    let docs = parse_documents(&body)?;
    debug!("Fetched {} documents from {}", docs.len(), url);
    Ok(docs)
}

/// Parse a multi-document yaml stream into kube objects
///
/// Empty documents are dropped. Every other document needs an `apiVersion` and a `kind`.
pub fn parse_documents(data: &str) -> Result<Vec<Value>> {
    let mut docs = vec![];
    for (i, de) in serde_yaml::Deserializer::from_str(data).enumerate() {
        let doc = Value::deserialize(de)?;
        if doc.is_null() {
            continue;
        }
        let typed = doc.get("apiVersion").map(Value::is_string).unwrap_or(false)
            && doc.get("kind").map(Value::is_string).unwrap_or(false);
        if !typed {
            bail!("document {} is not a kube object (missing apiVersion or kind)", i);
        }
        docs.push(doc);
    }
    if docs.is_empty() {
        bail!("manifest bundle contains no documents");
    }
    Ok(docs)
}
