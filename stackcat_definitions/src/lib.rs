#![recursion_limit = "1024"]
#![allow(renamed_and_removed_lints)]
#![allow(non_snake_case)]

#[macro_use]
extern crate serde_derive;
extern crate serde;
#[macro_use]
extern crate serde_json;
extern crate serde_yaml;

#[macro_use]
extern crate log;

extern crate petgraph;
extern crate regex;
extern crate semver;
extern crate url;

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
        SerdeY(serde_yaml::Error);
        SerdeJ(serde_json::Error);
        Url(url::ParseError);
        Regex(regex::Error);
    }
    errors {
        ConfigurationMissing(key: String) {
            description("required configuration value missing")
            display("required configuration value '{}' is not set", &key)
        }
        ConfigurationInvalid(reason: String) {
            description("configuration value invalid")
            display("invalid configuration: {}", &reason)
        }
        DuplicateResource(id: String) {
            description("resource declared twice")
            display("resource '{}' is already declared", &id)
        }
        DuplicateExport(name: String) {
            description("output exported twice")
            display("output '{}' is already exported", &name)
        }
        UnknownPredecessor(node: String, pred: String) {
            description("explicit predecessor was never declared")
            display("'{}' depends on '{}' which is not declared", &node, &pred)
        }
        IncompleteReference(node: String, target: String) {
            description("field reference to an undeclared resource")
            display("'{}' references a field of '{}' which is never declared", &node, &target)
        }
        CyclicDependency(node: String, other: String) {
            description("dependency cycle")
            display("declaring '{}' closes a dependency cycle through '{}'", &node, &other)
        }
        InconsistentNamespace(node: String) {
            description("namespace is neither a literal nor a namespace name reference")
            display("'{}' has an inconsistent namespace", &node)
        }
        InvalidFieldPath(path: String) {
            description("invalid field path")
            display("field path '{}' is not valid", &path)
        }
    }
}

/// Tagged field values with deferred references
pub mod value;
pub use value::{FieldRef, FieldValue};

/// Resource kinds and desired object specs
pub mod resource;
pub use resource::{ResourceKind, ResourceSpec};

/// The dependency graph builder using `petgraph`
pub mod graph;
pub use graph::{DepEdge, GraphBuilder, ResourceGraph};

/// Config for the stack, serializable from stackcat.conf
pub mod config;
pub use config::Config;

/// The fixed declaration set of the stack
pub mod catalog;
