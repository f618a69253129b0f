#![recursion_limit = "1024"]
#![allow(renamed_and_removed_lints)]
#![allow(non_snake_case)]

#[macro_use]
extern crate serde_derive;
extern crate serde;
extern crate serde_yaml;
#[macro_use]
extern crate serde_json;

// remote bundles
extern crate reqwest;

#[macro_use]
extern crate log;

extern crate regex;

#[macro_use]
extern crate error_chain;
error_chain! {
    types {
        Error, ErrorKind, ResultExt, Result;
    }
    links {}
    foreign_links {
        Fmt(::std::fmt::Error);
        Io(::std::io::Error) #[cfg(unix)];
        Defs(stackcat_definitions::Error);
        SerdeY(serde_yaml::Error);
        SerdeJ(serde_json::Error);
        Reqe(reqwest::Error);
        Regex(regex::Error);
        Log(log::SetLoggerError);
    }
    errors {
        NodeApplyFailure(node: String) {
            description("resource failed to reconcile")
            display("failed to reconcile {}", &node)
        }
        RemoteFetchFailure(url: String) {
            description("remote manifest bundle could not be fetched")
            display("failed to fetch manifest bundle from {}", &url)
        }
        UnexpectedHttpStatus(status: reqwest::StatusCode) {
            description("unexpected HTTP status")
            display("unexpected HTTP status: {}", &status)
        }
        KubectlFailure(args: String) {
            description("kubectl returned a failure")
            display("subprocess failure from kubectl: {}", &args)
        }
        ApplyFailed(nodes: Vec<String>) {
            description("one or more resources failed")
            display("{} resource(s) did not reconcile: {}", nodes.len(), nodes.join(", "))
        }
    }
}

extern crate stackcat_definitions;
pub use stackcat_definitions::{catalog, Config, FieldRef, ResourceGraph, ResourceKind, ResourceSpec};

/// The apply engine and its per node driver interface
pub mod engine;
pub use engine::{ApplyEngine, Change, Driver, NodeStatus, Reconciler, Report};

/// A `Driver` shelling out to kubectl
pub mod kubectl;

/// Remote multi-document manifest fetching
pub mod fetch;

/// Entry points for the stack operations
pub mod stack;

/// Graph printing
pub mod graph;

pub fn init() -> Result<()> {
    use std::{env, path::Path};

    // Allow stackcat calls to work from anywhere if we know where the config is
    if let Ok(sdir) = env::var("STACKCAT_DIR") {
        let pth = Path::new(&sdir);
        if !pth.is_dir() {
            bail!("STACKCAT_DIR must exist");
        }
        env::set_current_dir(pth)?;
    }

    Ok(())
}
