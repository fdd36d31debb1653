//! IBM Cloud VPC region client
//!
//! Enumerates VPC resources (virtual server instances and other list
//! endpoints) for one region, hiding the API's cursor pagination behind a
//! flat stream of items.

pub mod cloud_tools;
pub mod config;
pub mod vpc;

/// Version injected at compile time via IBMVPC_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("IBMVPC_VERSION") {
    Some(v) => v,
    None => "dev",
};
