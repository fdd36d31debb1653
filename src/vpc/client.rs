//! VPC Region Client
//!
//! Holds the connection parameters for one region and hands out resource
//! collections. The underlying SDK client is built once; the authenticator
//! is read from the cloud tools context on every call.

use super::collection::{Collection, Instances};
use super::sdk::{VpcParams, VpcSdk};
use crate::cloud_tools::auth::Authenticator;
use crate::cloud_tools::CloudTools;
use anyhow::{Context, Result};
use std::sync::{Arc, OnceLock};

/// SDK client paired with the credential to use for this call
pub struct SdkHandle<'a> {
    pub sdk: &'a VpcSdk,
    pub authenticator: Arc<dyn Authenticator>,
}

impl SdkHandle<'_> {
    /// Current bearer token from the authenticator
    pub async fn token(&self) -> Result<String> {
        self.authenticator.token().await
    }
}

/// Client for one VPC region
pub struct VpcClient {
    cloudtools: CloudTools,
    params: VpcParams,
    sdk: OnceLock<VpcSdk>,
}

impl VpcClient {
    /// Create a client for a public regional endpoint
    pub fn new(
        cloudtools: CloudTools,
        region: &str,
        version: Option<&str>,
        generation: Option<&str>,
    ) -> Self {
        Self::with_service_url(cloudtools, &service_url(region), version, generation)
    }

    /// Create a client against an explicit endpoint
    pub fn with_service_url(
        cloudtools: CloudTools,
        service_url: &str,
        version: Option<&str>,
        generation: Option<&str>,
    ) -> Self {
        let params = VpcParams {
            service_url: service_url.to_string(),
            version: version.map(str::to_string),
            generation: generation.map(str::to_string),
        };

        Self {
            cloudtools,
            params,
            sdk: OnceLock::new(),
        }
    }

    pub fn sdk_params(&self) -> &VpcParams {
        &self.params
    }

    /// Virtual server instances in this region
    pub fn instances(&self) -> Instances<'_> {
        self.collection("instances")
    }

    /// Any list endpoint under the regional API (`volumes`, `subnets`, ...)
    pub fn collection(&self, path: &str) -> Collection<'_> {
        Collection::new(self, path)
    }

    /// SDK client plus the authenticator current right now
    pub fn sdk_client(&self) -> Result<SdkHandle<'_>> {
        let authenticator = self.cloudtools.authenticator();

        if self.sdk.get().is_none() {
            let sdk = VpcSdk::new(self.params.clone())?;
            // A concurrent initializer may have won; either instance is equivalent
            let _ = self.sdk.set(sdk);
        }
        let sdk = self.sdk.get().context("VPC SDK client not initialized")?;

        Ok(SdkHandle { sdk, authenticator })
    }
}

/// Public endpoint for a region
pub fn service_url(region: &str) -> String {
    format!("https://{}.iaas.cloud.ibm.com/v1", region)
}
