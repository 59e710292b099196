// ABOUTME: Diagnostics accumulator for non-fatal warnings during dependency analysis.
// ABOUTME: Collects warnings that shouldn't fail a plan but should be shown to users.

/// Collects non-fatal warnings while a plan is being built.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!(kind = ?warning.kind, "{}", warning.message);
        self.warnings.push(warning);
    }

    /// Get all collected warnings.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Check if any warnings were collected.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Consume the accumulator, keeping only the messages.
    pub fn into_messages(self) -> Vec<String> {
        self.warnings.into_iter().map(|w| w.message).collect()
    }
}

/// A non-fatal warning collected during analysis.
#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    /// A dependency names a resource that is not part of the deployment.
    pub fn missing_dependency(resource: &str, dependency: &str) -> Self {
        Self {
            kind: WarningKind::MissingDependency,
            message: format!(
                "Resource '{resource}' depends on '{dependency}' which is not in deployment"
            ),
        }
    }

    /// Grouping could not make progress and had to force a resource through.
    pub fn dependency_cycle(forced: &str, remaining: &[&str]) -> Self {
        Self {
            kind: WarningKind::DependencyCycle,
            message: format!(
                "Circular or unresolved dependencies among [{}]; forcing '{forced}' into its own group",
                remaining.join(", ")
            ),
        }
    }

    /// An AKS cluster is deployed without a Log Analytics workspace.
    pub fn missing_monitoring(cluster: &str) -> Self {
        Self {
            kind: WarningKind::MissingMonitoring,
            message: format!(
                "AKS cluster '{cluster}' should have Log Analytics workspace for monitoring"
            ),
        }
    }
}

/// Categories of warnings produced by the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Reference to a resource outside the deployment.
    MissingDependency,
    /// Cycle broken by forcing a resource into a singleton group.
    DependencyCycle,
    /// Monitoring sink missing for a cluster.
    MissingMonitoring,
}
