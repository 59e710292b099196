// ABOUTME: Regex classification of provider error messages into categories.
// ABOUTME: Ordered table, first match wins, patterns compiled once.

use regex::{Regex, RegexBuilder};

use super::analysis::{ErrorCategory, Severity};

struct PatternSpec {
    name: &'static str,
    category: ErrorCategory,
    severity: Severity,
    patterns: &'static [&'static str],
}

const PATTERN_TABLE: &[PatternSpec] = &[
    PatternSpec {
        name: "QuotaExceeded",
        category: ErrorCategory::Capacity,
        severity: Severity::High,
        patterns: &[
            r"quota.*exceeded",
            r"resource limit.*reached",
            r"insufficient.*capacity",
            r"not enough.*cores",
            r"insufficient.*cores",
        ],
    },
    PatternSpec {
        name: "AuthorizationError",
        category: ErrorCategory::Security,
        severity: Severity::High,
        patterns: &[
            r"authorization.*failed",
            r"access.*denied",
            r"insufficient.*permissions",
            r"rbac.*denied",
        ],
    },
    PatternSpec {
        name: "InvalidSku",
        category: ErrorCategory::Configuration,
        severity: Severity::Medium,
        patterns: &[
            r"sku.*not.*available",
            r"invalid.*sku",
            r"sku.*not.*supported",
            r"tier.*unavailable",
        ],
    },
    PatternSpec {
        name: "NetworkConflict",
        category: ErrorCategory::Network,
        severity: Severity::Medium,
        patterns: &[
            r"address.*space.*conflict",
            r"cidr.*overlap",
            r"subnet.*conflict",
            r"network.*already.*exists",
        ],
    },
    PatternSpec {
        name: "ResourceNotFound",
        category: ErrorCategory::Dependency,
        severity: Severity::Medium,
        patterns: &[
            r"resource.*not.*found",
            r"parent.*resource.*missing",
            r"dependency.*not.*met",
            r"resource.*does.*not.*exist",
            r"(resource group|virtual network|subnet|storage account|key vault) '[^']+' not found",
        ],
    },
    PatternSpec {
        name: "Timeout",
        category: ErrorCategory::Performance,
        severity: Severity::Medium,
        patterns: &[
            r"operation.*timed.*out",
            r"request.*timeout",
            r"deployment.*timeout",
            r"provisioning.*timeout",
        ],
    },
    PatternSpec {
        name: "RegionCapacity",
        category: ErrorCategory::Capacity,
        severity: Severity::High,
        patterns: &[
            r"region.*capacity.*exceeded",
            r"location.*unavailable",
            r"datacenter.*capacity",
            r"availability.*zone.*full",
        ],
    },
];

/// Result of matching a message against the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Table entry name, `None` when nothing matched.
    pub name: Option<&'static str>,
    pub category: ErrorCategory,
    pub severity: Severity,
}

impl Classification {
    const UNKNOWN: Classification = Classification {
        name: None,
        category: ErrorCategory::Unknown,
        severity: Severity::Medium,
    };
}

struct CompiledPattern {
    name: &'static str,
    category: ErrorCategory,
    severity: Severity,
    regexes: Vec<Regex>,
}

pub struct Classifier {
    table: Vec<CompiledPattern>,
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("entries", &self.table.len())
            .finish()
    }
}

impl Classifier {
    pub fn builtin() -> Self {
        let table = PATTERN_TABLE
            .iter()
            .map(|spec| CompiledPattern {
                name: spec.name,
                category: spec.category,
                severity: spec.severity,
                regexes: spec
                    .patterns
                    .iter()
                    .filter_map(|pattern| compile(spec.name, pattern))
                    .collect(),
            })
            .collect();
        Self { table }
    }

    /// First matching table entry, in table order.
    pub fn classify(&self, lowered_message: &str) -> Classification {
        self.table
            .iter()
            .find(|entry| entry.regexes.iter().any(|re| re.is_match(lowered_message)))
            .map(|entry| Classification {
                name: Some(entry.name),
                category: entry.category,
                severity: entry.severity,
            })
            .unwrap_or(Classification::UNKNOWN)
    }
}

fn compile(name: &str, pattern: &str) -> Option<Regex> {
    match RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(entry = name, pattern, error = %e, "Skipping invalid error pattern");
            None
        }
    }
}

/// Short cause description derived from keywords in the message.
pub fn root_cause(lowered_message: &str, resource_type: &str, location: &str) -> String {
    if lowered_message.contains("quota") {
        format!("Resource quota exceeded for {resource_type} in {location}")
    } else if lowered_message.contains("permission") {
        format!("Insufficient permissions for {resource_type} deployment")
    } else if lowered_message.contains("sku") {
        format!("Requested SKU unavailable for {resource_type} in {location}")
    } else if lowered_message.contains("network") || lowered_message.contains("cidr") {
        format!("Network configuration conflict in {location}")
    } else if lowered_message.contains("not found") {
        format!("Dependent resource missing for {resource_type}")
    } else if lowered_message.contains("timeout") {
        format!("Deployment timeout for {resource_type} in {location}")
    } else {
        let excerpt: String = lowered_message.chars().take(100).collect();
        format!("Deployment failure for {resource_type}: {excerpt}...")
    }
}
