// ABOUTME: Deployment orchestration as an explicit state machine.
// ABOUTME: Exports the context, states, transition table, handlers and driver.

mod context;
mod error;
pub mod handlers;
mod lease;
mod machine;
mod state;
mod transitions;

pub use context::{
    CheckResult, Checkpoint, DEFAULT_LOCATION, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_MINUTES,
    DeploymentContext, ErrorDetails, HistoryEntry, RollbackFailure, ValidationResults,
};
pub use error::{DeployError, DeployErrorKind, HandlerFault, LeaseHolderInfo};
pub use handlers::{HandlerOutcome, StateHandler};
pub use lease::{DeploymentLease, LeaseInfo};
pub use machine::{DeploymentStateMachine, LEASE_GRACE, MachineSettings, next_event};
pub use state::{DeploymentState, StateTransition};
pub use transitions::TransitionTable;
