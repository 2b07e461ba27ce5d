//! Watcher configuration.
//!
//! Scopes every subscription this process opens to one tenant and one action
//! tag. Loads from the environment in one shot, fails fast if the tenant is
//! missing.

use crate::error::{Error, Result};
use crate::model::COMMAND_STATUS;

#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Tenant whose channel this watcher listens on.
    pub tenant_code: String,

    /// Action tag commands publish their status under.
    pub action: String,
}

impl WatchConfig {
    /// Configuration for `tenant_code` with the default action tag.
    pub fn new(tenant_code: impl Into<String>) -> Self {
        Self {
            tenant_code: tenant_code.into(),
            action: COMMAND_STATUS.to_string(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// `CMDWATCH_TENANT_CODE` is required. `CMDWATCH_ACTION` overrides the
    /// default action tag.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            tenant_code: required_var("CMDWATCH_TENANT_CODE")?,
            action: std::env::var("CMDWATCH_ACTION")
                .unwrap_or_else(|_| COMMAND_STATUS.to_string()),
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}
