// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Uses phantom types to prevent ID confusion at compile time.

mod environment;
mod id;

pub use environment::{Environment, EnvironmentError};
pub use id::{ApprovalToken, DeploymentId, Id};
