// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{bail, Context, Result};
use std::env;
use std::str::FromStr;

use crate::constants::workload::DEFAULT_IMAGE;

/// Where the admission hook's trust anchor comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaBundleSource {
    /// The certificate of the TLS secret provisioned for the webhook
    #[default]
    TlsSecret,
    /// The cluster CA found in the token secret of the namespace's `default` service account
    ServiceAccountToken,
}

impl FromStr for CaBundleSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tls-secret" => Ok(CaBundleSource::TlsSecret),
            "service-account-token" => Ok(CaBundleSource::ServiceAccountToken),
            other => bail!(
                "unknown CA bundle source '{}', expected 'tls-secret' or 'service-account-token'",
                other
            ),
        }
    }
}

/// Operator configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Container image of the webhook workload
    pub webhook_image: String,
    pub ca_bundle_source: CaBundleSource,
    /// Run the CertificateSigningRequest approval controller
    pub csr_approval_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            webhook_image: DEFAULT_IMAGE.to_string(),
            ca_bundle_source: CaBundleSource::default(),
            csr_approval_enabled: true,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let webhook_image = lookup("WEBHOOK_IMAGE").unwrap_or_else(|| DEFAULT_IMAGE.to_string());

        let ca_bundle_source = match lookup("CA_BUNDLE_SOURCE") {
            Some(value) => value
                .parse()
                .context("CA_BUNDLE_SOURCE environment variable is invalid")?,
            None => CaBundleSource::default(),
        };

        let csr_approval_enabled = match lookup("CSR_APPROVAL_ENABLED") {
            Some(value) => value
                .parse()
                .with_context(|| format!("CSR_APPROVAL_ENABLED must be true or false, got '{}'", value))?,
            None => true,
        };

        Ok(Config {
            webhook_image,
            ca_bundle_source,
            csr_approval_enabled,
        })
    }
}
