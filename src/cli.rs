// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "skyplan")]
#[command(about = "Dependency-aware deployment orchestration for cloud resources")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print final results
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new skyplan.yml configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the deployment plan for a manifest
    Analyze {
        /// Deployment manifest (YAML or JSON)
        manifest: PathBuf,

        /// Split groups mixing parallel-safe and sequential-only resources
        #[arg(long)]
        optimize: bool,
    },

    /// Deploy a manifest against the simulated backend
    Deploy {
        /// Deployment manifest (YAML or JSON)
        manifest: PathBuf,
    },

    /// Show the persisted state of a deployment
    Status {
        deployment_id: String,
    },

    /// Continue an interrupted deployment
    Resume {
        deployment_id: String,
    },

    /// Request cancellation of a deployment
    Cancel {
        deployment_id: String,
    },

    /// Classify an error message and suggest remediation
    Explain {
        /// Error message as reported by the provider
        message: String,

        #[arg(long)]
        code: Option<String>,

        #[arg(long)]
        resource_type: Option<String>,

        #[arg(long)]
        location: Option<String>,

        #[arg(long)]
        sku: Option<String>,
    },
}
