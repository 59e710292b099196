// ABOUTME: Deployment manifests: the resources plus who, where and how to deploy.
// ABOUTME: YAML or JSON files turned into a seeded DeploymentContext.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::deploy::{DEFAULT_LOCATION, DeploymentContext};
use crate::error::{Error, Result};
use crate::resource::ResourceSpec;
use crate::types::{ApprovalToken, DeploymentId, Environment};

use super::{Config, EnvValue};

#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentManifest {
    /// Fixed id; generated when absent.
    #[serde(default)]
    pub deployment_id: Option<String>,

    pub subscription_id: EnvValue,

    pub resource_group: EnvValue,

    #[serde(default)]
    pub location: Option<String>,

    #[serde(default)]
    pub environment: Environment,

    #[serde(default)]
    pub initiated_by: Option<String>,

    #[serde(default)]
    pub roles: Vec<String>,

    #[serde(default)]
    pub dry_run: bool,

    #[serde(default)]
    pub approval_token: Option<String>,

    #[serde(default)]
    pub max_retries: Option<u32>,

    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,

    #[serde(default)]
    pub resources: Vec<ResourceSpec>,
}

impl DeploymentManifest {
    /// Parse YAML. JSON manifests parse too, YAML being a superset.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Seed a deployment context. Manifest values win over configuration.
    pub fn into_context(self, config: &Config) -> Result<DeploymentContext> {
        let subscription_id = self.subscription_id.resolve()?;
        let resource_group = self.resource_group.resolve()?;

        let mut ctx = DeploymentContext::new(subscription_id, resource_group, self.resources);
        if let Some(id) = self.deployment_id {
            if id.trim().is_empty() {
                return Err(Error::InvalidConfig("deployment_id cannot be empty".to_string()));
            }
            ctx.deployment_id = DeploymentId::new(id);
        }
        ctx.location = self
            .location
            .unwrap_or_else(|| DEFAULT_LOCATION.to_string());
        ctx.environment = self.environment;
        ctx.initiated_by = self
            .initiated_by
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_else(|| "unknown".to_string());
        ctx.roles = self.roles;
        ctx.dry_run = self.dry_run;
        ctx.approval_token = self.approval_token.map(ApprovalToken::new);
        ctx.max_retries = self.max_retries.unwrap_or(config.orchestrator.max_retries);
        ctx.timeout_minutes = match self.timeout {
            Some(timeout) => timeout.as_secs().div_ceil(60),
            None => config.timeout_minutes(),
        };
        ctx.rollback_enabled = config.orchestrator.rollback_enabled;
        Ok(ctx)
    }
}
