use regex::Regex;
use semver::Version;
use std::{
    env,
    path::{Path, PathBuf},
};

use super::{Error, ErrorKind, Result};

/// Environment variable overriding the kubeconfig payload in the config
pub const KUBECONFIG_EVAR: &str = "STACKCAT_KUBECONFIG";

// ----------------------------------------------------------------------------------

/// Resource quantities for one of requests/limits
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Quantities {
    pub cpu: String,
    pub memory: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Resources {
    pub requests: Quantities,
    pub limits: Quantities,
}

/// The application workload
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Name of the deployment, also the prefix of the service, ingress and hpa names
    pub name: String,
    pub image: String,
    pub replicas: u32,
    /// Container port, also the service port
    pub port: u16,
    /// Host rule for the ingress
    pub host: String,
    pub resources: Resources,
}
impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            name: "nginx".into(),
            image: "nginx".into(),
            replicas: 3,
            port: 80,
            host: "nginx.local".into(),
            resources: Resources {
                requests: Quantities {
                    cpu: "100m".into(),
                    memory: "128Mi".into(),
                },
                limits: Quantities {
                    cpu: "500m".into(),
                    memory: "256Mi".into(),
                },
            },
        }
    }
}
impl AppConfig {
    pub fn service_name(&self) -> String {
        format!("{}-service", self.name)
    }
    pub fn ingress_name(&self) -> String {
        format!("{}-ingress", self.name)
    }
    pub fn hpa_name(&self) -> String {
        format!("{}-hpa", self.name)
    }
}

/// Parameters for the HorizontalPodAutoscaler of the application
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default, deny_unknown_fields)]
pub struct AutoScaling {
    pub minReplicas: u32,
    pub maxReplicas: u32,
    /// Target average cpu utilization in percent
    pub cpuUtilization: u32,
}
impl Default for AutoScaling {
    fn default() -> Self {
        AutoScaling {
            minReplicas: 3,
            maxReplicas: 9,
            cpuUtilization: 50,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsServer {
    pub image: String,
    pub namespace: String,
    pub port: u16,
    pub args: Vec<String>,
}
impl Default for MetricsServer {
    fn default() -> Self {
        MetricsServer {
            image: "registry.k8s.io/metrics-server/metrics-server:v0.6.3".into(),
            namespace: "kube-system".into(),
            port: 443,
            args: vec![
                "--cert-dir=/tmp".into(),
                "--secure-port=443".into(),
                "--kubelet-preferred-address-types=InternalIP,ExternalIP,Hostname".into(),
                "--kubelet-use-node-status-port".into(),
                "--metric-resolution=15s".into(),
            ],
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default, deny_unknown_fields)]
pub struct IngressController {
    /// Remote multi-document manifest installing the controller
    pub manifest: String,
    /// The ingress class the controller serves
    pub className: String,
}
impl Default for IngressController {
    fn default() -> Self {
        IngressController {
            manifest: "https://raw.githubusercontent.com/kubernetes/ingress-nginx/main/deploy/static/provider/cloud/deploy.yaml".into(),
            className: "nginx".into(),
        }
    }
}

// ----------------------------------------------------------------------------------

/// Main config, serializable from stackcat.conf
///
/// Everything but the kubeconfig has a default matching the reference stack.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Kubeconfig payload for the target cluster
    ///
    /// Never printed. Can be overridden through `STACKCAT_KUBECONFIG`.
    #[serde(skip_serializing)]
    pub kubeconfig: Option<String>,

    /// Namespace created for the application
    pub namespace: String,

    pub app: AppConfig,

    pub autoscaling: AutoScaling,

    pub metricsServer: MetricsServer,

    pub ingressController: IngressController,

    /// Minimum stackcat version required by this config
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
}
impl Default for Config {
    fn default() -> Self {
        Config {
            kubeconfig: None,
            namespace: "app-namespace".into(),
            app: AppConfig::default(),
            autoscaling: AutoScaling::default(),
            metricsServer: MetricsServer::default(),
            ingressController: IngressController::default(),
            version: None,
        }
    }
}

fn verify_name(name: &str, what: &str) -> Result<()> {
    // DNS-1123 label
    let re = Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$")?;
    if name.len() > 63 || !re.is_match(name) {
        bail!(ErrorKind::ConfigurationInvalid(format!(
            "{} '{}' is not a valid kubernetes name",
            what, name
        )));
    }
    Ok(())
}

impl Config {
    pub fn verify(&self) -> Result<()> {
        verify_name(&self.namespace, "namespace")?;
        verify_name(&self.app.name, "app name")?;
        verify_name(&self.metricsServer.namespace, "metrics-server namespace")?;
        // the longest derived name must still be a label
        verify_name(&self.app.ingress_name(), "ingress name")?;
        if self.app.image.is_empty() || self.metricsServer.image.is_empty() {
            bail!(ErrorKind::ConfigurationInvalid("images must be set".into()));
        }
        if self.app.replicas == 0 {
            bail!(ErrorKind::ConfigurationInvalid("app.replicas must be at least 1".into()));
        }
        if self.app.port == 0 || self.metricsServer.port == 0 {
            bail!(ErrorKind::ConfigurationInvalid("ports must be non-zero".into()));
        }
        let hpa = &self.autoscaling;
        if hpa.minReplicas == 0 {
            bail!(ErrorKind::ConfigurationInvalid("minReplicas must be at least 1".into()));
        }
        if hpa.minReplicas > hpa.maxReplicas {
            bail!(ErrorKind::ConfigurationInvalid("maxReplicas must be >= minReplicas".into()));
        }
        if hpa.cpuUtilization == 0 || hpa.cpuUtilization > 100 {
            bail!(ErrorKind::ConfigurationInvalid(
                "cpuUtilization must be a percentage in 1..=100".into()
            ));
        }
        let url = url::Url::parse(&self.ingressController.manifest)?;
        if url.scheme() != "https" && url.scheme() != "http" {
            bail!(ErrorKind::ConfigurationInvalid(format!(
                "ingress controller manifest must be fetched over http(s), not {}",
                url.scheme()
            )));
        }
        if self.ingressController.className.is_empty() {
            bail!(ErrorKind::ConfigurationInvalid("ingress className must be set".into()));
        }
        if let Some(v) = &self.version {
            Config::verify_version(v)?;
        }
        Ok(())
    }

    fn verify_version(ver: &Version) -> Result<()> {
        let current = Version::parse(env!("CARGO_PKG_VERSION"))
            .map_err(|e| ErrorKind::ConfigurationInvalid(e.to_string()))?;
        if ver > &current {
            bail!("Your stackcat is out of date ({} < {})", current, ver)
        }
        Ok(())
    }

    /// Print Config to stdout
    pub fn print(&self) -> Result<()> {
        println!("{}", serde_yaml::to_string(self)?);
        Ok(())
    }

    /// The kubeconfig payload, with the environment taking precedence
    pub fn kubeconfig(&self) -> Result<String> {
        resolve_kubeconfig(env::var(KUBECONFIG_EVAR).ok(), self.kubeconfig.clone())
    }

    /// Read a config file in an arbitrary directory
    pub fn read_from(pwd: &Path) -> Result<Config> {
        let mpath = pwd.join("stackcat.conf");
        trace!("Using config in {}", mpath.display());
        if !mpath.exists() {
            bail!("Config file {} does not exist", mpath.display())
        }
        let data = std::fs::read_to_string(&mpath)?;
        match serde_yaml::from_str::<Config>(&data) {
            Err(e) => {
                // a version pin ahead of us explains most parse failures
                let ver_re = Regex::new(r"^version:\s*(?P<version>.+)$")?;
                for l in data.lines() {
                    if let Some(caps) = ver_re.captures(l) {
                        debug!("got version from raw data: {:?}", caps);
                        if let Ok(expected) = Version::parse(caps["version"].trim()) {
                            if let Err(e2) = Config::verify_version(&expected) {
                                return Err(Error::from(e).chain_err(|| e2));
                            }
                        }
                    }
                }
                warn!("Invalid stackcat.conf in {}", pwd.display());
                Err(e.into())
            }
            Ok(conf) => Ok(conf),
        }
    }

    /// Read a config in pwd
    pub fn read() -> Result<Config> {
        Config::read_from(&PathBuf::from("."))
    }

    /// Read a config in pwd, using defaults when there is none
    pub fn read_or_default() -> Result<Config> {
        if !Path::new("stackcat.conf").exists() {
            debug!("No stackcat.conf found, using defaults");
            return Ok(Config::default());
        }
        Config::read()
    }
}

// Just enough of a kubeconfig to sanity check a payload
#[derive(Deserialize)]
struct MinimalKubeconfig {
    #[serde(default)]
    clusters: Vec<NamedEntry>,
    #[serde(default)]
    contexts: Vec<NamedEntry>,
    #[serde(default, rename = "current-context")]
    current_context: Option<String>,
}
#[derive(Deserialize)]
struct NamedEntry {
    name: String,
}

/// Pick the kubeconfig payload and check that it looks like one
///
/// Absent or empty from both sources is a `ConfigurationMissing` error.
pub fn resolve_kubeconfig(from_env: Option<String>, from_file: Option<String>) -> Result<String> {
    let payload = match from_env
        .filter(|s| !s.trim().is_empty())
        .or_else(|| from_file.filter(|s| !s.trim().is_empty()))
    {
        Some(p) => p,
        None => bail!(ErrorKind::ConfigurationMissing("kubeconfig".into())),
    };
    let kc: MinimalKubeconfig = serde_yaml::from_str(&payload)
        .map_err(|e| ErrorKind::ConfigurationInvalid(format!("kubeconfig does not parse: {}", e)))?;
    if kc.clusters.is_empty() {
        bail!(ErrorKind::ConfigurationInvalid("kubeconfig defines no clusters".into()));
    }
    match kc.current_context.as_ref().filter(|c| !c.is_empty()) {
        Some(ctx) if !kc.contexts.iter().any(|c| &c.name == ctx) => {
            bail!(ErrorKind::ConfigurationInvalid(format!(
                "kubeconfig current-context '{}' is not defined",
                ctx
            )));
        }
        _ => {}
    }
    Ok(payload)
}
