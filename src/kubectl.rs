use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tokio::process::Command;

use super::engine::{Applied, Change, Driver};
use super::{ErrorKind, Result};

/// A kubeconfig payload written to disk for the lifetime of a run
///
/// The file is removed again on drop.
pub struct KubeconfigFile {
    path: PathBuf,
}

impl KubeconfigFile {
    pub fn write(kubeconfig: &str, workdir: &Path) -> Result<Self> {
        fs::create_dir_all(workdir)?;
        let path = workdir.join("kubeconfig");
        fs::write(&path, kubeconfig)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
        }
        debug!("Using kubeconfig in {}", path.display());
        Ok(KubeconfigFile { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for KubeconfigFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to remove {}: {}", self.path.display(), e);
        }
    }
}

/// Driver applying nodes through `kubectl` against a supplied kubeconfig
///
/// Generated manifests are written to a work directory so that a failed run
/// can be inspected. The kubeconfig is only kept there while the driver lives.
pub struct Kubectl {
    workdir: PathBuf,
    kubeconfig: KubeconfigFile,
}

impl Kubectl {
    /// Write the kubeconfig payload into `workdir` and check for kubectl
    pub fn new(kubeconfig: &str, workdir: &Path) -> Result<Self> {
        if which::which("kubectl").is_err() {
            bail!("kubectl must be installed and on the PATH");
        }
        Ok(Kubectl {
            workdir: workdir.to_path_buf(),
            kubeconfig: KubeconfigFile::write(kubeconfig, workdir)?,
        })
    }

    async fn kout(&self, args: Vec<String>) -> Result<(String, bool)> {
        let mut full = vec![format!("--kubeconfig={}", self.kubeconfig.path().display())];
        full.extend(args);
        debug!("kubectl {}", full.join(" "));
        let s = Command::new("kubectl").args(&full).output().await?;
        let out: String = String::from_utf8_lossy(&s.stdout).into();
        let err: String = String::from_utf8_lossy(&s.stderr).trim().into();
        if !err.is_empty() {
            warn!("kubectl {} stderr: {}", full.join(" "), err);
        }
        Ok((out, s.status.success()))
    }

    async fn kexec(&self, args: Vec<String>) -> Result<String> {
        let (out, ok) = self.kout(args.clone()).await?;
        if !ok {
            bail!(ErrorKind::KubectlFailure(args.join(" ")));
        }
        Ok(out)
    }

    /// Write the documents of a node to `{id}.gen.yml`
    fn write_manifests(&self, id: &str, manifests: &[Value]) -> Result<String> {
        let pth = self.workdir.join(format!("{}.gen.yml", id));
        let mut data = String::new();
        for m in manifests {
            // serde_yaml 0.8 prefixes every document with ---
            data.push_str(&serde_yaml::to_string(m)?);
            data.push('\n');
        }
        fs::write(&pth, &data)?;
        trace!("Wrote {} for {}: \n{}", pth.display(), id, data);
        Ok(pth.to_string_lossy().into_owned())
    }
}

#[async_trait]
impl Driver for Kubectl {
    async fn apply(&self, id: &str, manifests: &[Value]) -> Result<Applied> {
        let file = self.write_manifests(id, manifests)?;
        let out = self.kexec(vec!["apply".into(), "-f".into(), file.clone()]).await?;
        print!("{}", out); // always print kube output from this
        let change = parse_apply_output(&out)?;

        let got = self
            .kexec(vec!["get".into(), "-f".into(), file, "-o".into(), "json".into()])
            .await?;
        let live = live_objects(serde_json::from_str(&got)?);
        Ok(Applied { change, live })
    }

    async fn delete(&self, id: &str, manifests: &[Value]) -> Result<bool> {
        let file = self.write_manifests(id, manifests)?;
        let out = self
            .kexec(vec![
                "delete".into(),
                "-f".into(),
                file,
                "--ignore-not-found".into(),
                "--wait=true".into(),
            ])
            .await?;
        print!("{}", out);
        parse_delete_output(&out)
    }
}

/// Whether `kubectl delete` reported deleting anything
///
/// Matches both `kind "name" deleted` and `kind "name" deleted from ns namespace`.
pub fn parse_delete_output(out: &str) -> Result<bool> {
    let re = Regex::new(r#"^\S+ "[^"]+" deleted\b"#)?;
    Ok(out.lines().any(|l| re.is_match(l.trim())))
}

/// Summarise `kubectl apply` output into a single change
///
/// Any created object makes the node `Created`, any configured one `Configured`.
pub fn parse_apply_output(out: &str) -> Result<Change> {
    let re = Regex::new(r"^\S+ (?P<verb>created|configured|unchanged)(?: \(.*\))?$")?;
    let verbs = out
        .lines()
        .filter_map(|l| re.captures(l.trim()))
        .map(|c| c["verb"].to_string())
        .collect::<Vec<_>>();
    if verbs.is_empty() {
        bail!("unrecognized apply result: {}", out);
    }
    let change = if verbs.iter().any(|v| v == "created") {
        Change::Created
    } else if verbs.iter().any(|v| v == "configured") {
        Change::Configured
    } else {
        Change::Unchanged
    };
    Ok(change)
}

/// Unwrap the List kubectl returns when more than one object was requested
pub fn live_objects(got: Value) -> Vec<Value> {
    match got {
        Value::Object(mut m) => {
            if m.get("kind") == Some(&json!("List")) {
                match m.remove("items") {
                    Some(Value::Array(items)) => items,
                    _ => vec![],
                }
            } else {
                vec![Value::Object(m)]
            }
        }
        _ => vec![],
    }
}
