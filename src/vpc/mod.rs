//! IBM Cloud VPC API interaction module
//!
//! # Module Structure
//!
//! - [`client`] - Region client holding endpoint/version/generation
//! - [`collection`] - Resource collections (instances, and any other list path)
//! - [`pager`] - Lazy pagination over `next.href` cursors
//! - [`sdk`] - HTTP layer for the VPC REST API
//!
//! # Example
//!
//! ```ignore
//! use futures::TryStreamExt;
//! use ibmvpc::cloud_tools::CloudTools;
//! use ibmvpc::vpc::{QueryParams, VpcClient};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let client = VpcClient::new(CloudTools::from_env()?, "us-south", None, None);
//!     let mut instances = Box::pin(client.instances().each(QueryParams::new()));
//!     while let Some(instance) = instances.try_next().await? {
//!         println!("{}", instance["name"]);
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod collection;
pub mod pager;
pub mod sdk;

use std::collections::BTreeMap;

/// Extra query parameters for list calls
pub type QueryParams = BTreeMap<String, String>;

pub use client::VpcClient;
pub use collection::{Collection, Instances};
pub use pager::{ArrayKey, KeyDetector, PagerError};

/// User-facing text for an error.
///
/// Pager errors are shown in full since they name the fields the response
/// carried; everything else is a transport error and goes through
/// [`sdk::format_vpc_error`].
pub fn describe_error(error: &anyhow::Error) -> String {
    match error.downcast_ref::<PagerError>() {
        Some(pager_error) => pager_error.to_string(),
        None => sdk::format_vpc_error(error),
    }
}
