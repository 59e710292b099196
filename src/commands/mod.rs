// ABOUTME: Command module aggregator for the skyplan CLI.
// ABOUTME: Re-exports analyze, deploy, status and explain command handlers.

mod analyze;
mod deploy;
mod explain;
mod status;

pub use analyze::analyze;
pub use deploy::{deploy, resume};
pub use explain::{ExplainArgs, explain};
pub use status::{cancel, status};

use skyplan::backend::SimulatedBackend;
use skyplan::config::Config;
use skyplan::deploy::{DeployError, DeploymentStateMachine};
use skyplan::error::{Error, Result};
use std::path::Path;
use std::sync::Arc;

/// State machine over the simulated backend and the configured store.
async fn state_machine(config: &Config, project_dir: &Path) -> Result<DeploymentStateMachine> {
    let store = config.open_store(project_dir).await?;
    Ok(DeploymentStateMachine::new(
        Arc::new(SimulatedBackend::new()),
        store,
        config.machine_settings(),
    ))
}

fn deploy_error(e: DeployError) -> Error {
    match e {
        DeployError::NotFound(id) => Error::UnknownDeployment(id),
        other => Error::Deploy(other),
    }
}
