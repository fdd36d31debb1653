//! Resource collections bound to a region client

use super::client::VpcClient;
use super::pager::{self, ArrayKey, ListOperation};
use super::QueryParams;
use anyhow::Result;
use futures::future::BoxFuture;
use futures::stream::Stream;
use serde_json::Value;

/// Virtual server instances
pub type Instances<'a> = Collection<'a>;

/// The list operation for one API path, authenticated per call
struct BoundList<'a> {
    parent: &'a VpcClient,
    path: String,
}

impl ListOperation for BoundList<'_> {
    fn call<'a>(
        &'a self,
        start: Option<&'a str>,
        params: &'a QueryParams,
    ) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            tracing::debug!("list_{} start={:?}", self.path, start);
            let handle = self.parent.sdk_client()?;
            let token = handle.token().await?;
            handle.sdk.list(&self.path, &token, start, params).await
        })
    }
}

/// A listable resource type in one region
pub struct Collection<'a> {
    parent: &'a VpcClient,
    path: String,
    array_key: ArrayKey,
}

impl<'a> Collection<'a> {
    pub(crate) fn new(parent: &'a VpcClient, path: &str) -> Self {
        Self {
            parent,
            path: path.trim_matches('/').to_string(),
            array_key: ArrayKey::default(),
        }
    }

    /// Pin the response field holding the items instead of detecting it
    pub fn with_array_key(mut self, array_key: impl Into<ArrayKey>) -> Self {
        self.array_key = array_key.into();
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Stream every resource, fetching pages as the stream is consumed.
    ///
    /// Each call starts a fresh walk. Pass `start` in `params` to resume
    /// from a known cursor.
    pub fn each(&self, params: QueryParams) -> impl Stream<Item = Result<Value>> + Send + 'a {
        let operation = BoundList {
            parent: self.parent,
            path: self.path.clone(),
        };
        pager::each_resource(operation, self.array_key.clone(), params)
    }

    /// Every resource in the region
    pub async fn all(&self) -> Result<Vec<Value>> {
        pager::collect_all(self.each(QueryParams::new())).await
    }

    /// A single resource by ID
    pub async fn get(&self, id: &str) -> Result<Value> {
        let handle = self.parent.sdk_client()?;
        let token = handle.token().await?;
        handle.sdk.get(&self.path, id, &token).await
    }
}
