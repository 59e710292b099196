// ABOUTME: Static per-type resource templates and resource type normalization.
// ABOUTME: Supplies default deploy times, provided capabilities and parallel safety.

use std::collections::HashMap;

/// Defaults for one resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceTemplate {
    pub provides: &'static [&'static str],
    pub deploy_time_seconds: u64,
    pub parallel_safe: bool,
}

impl ResourceTemplate {
    /// Used for types missing from the table.
    pub const UNKNOWN: ResourceTemplate = ResourceTemplate {
        provides: &[],
        deploy_time_seconds: 60,
        parallel_safe: true,
    };

    const fn new(
        provides: &'static [&'static str],
        deploy_time_seconds: u64,
        parallel_safe: bool,
    ) -> Self {
        Self {
            provides,
            deploy_time_seconds,
            parallel_safe,
        }
    }
}

/// Lookup table keyed by normalized resource type.
#[derive(Debug, Clone)]
pub struct TemplateTable {
    templates: HashMap<&'static str, ResourceTemplate>,
}

impl TemplateTable {
    pub fn builtin() -> Self {
        let templates = HashMap::from([
            (
                "resource_group",
                ResourceTemplate::new(&["resource_container"], 30, true),
            ),
            ("vnet", ResourceTemplate::new(&["network_space"], 60, true)),
            (
                "subnet",
                ResourceTemplate::new(&["network_segment"], 30, true),
            ),
            (
                "log_analytics_workspace",
                ResourceTemplate::new(&["logging_sink", "monitoring_data"], 90, true),
            ),
            (
                "storage_account",
                ResourceTemplate::new(&["blob_storage", "file_shares"], 60, true),
            ),
            (
                "key_vault",
                ResourceTemplate::new(&["secret_store", "certificate_store"], 90, true),
            ),
            (
                "app_service_plan",
                ResourceTemplate::new(&["compute_capacity"], 90, true),
            ),
            (
                "webapp",
                ResourceTemplate::new(&["web_endpoint", "app_identity"], 120, true),
            ),
            (
                "sql_server",
                ResourceTemplate::new(&["database_server"], 180, true),
            ),
            (
                "sql_database",
                ResourceTemplate::new(&["database_instance"], 120, false),
            ),
            (
                "aks_cluster",
                ResourceTemplate::new(&["kubernetes_api", "node_pools"], 600, false),
            ),
            (
                "virtual_machine",
                ResourceTemplate::new(&["compute_instance"], 180, true),
            ),
        ]);
        Self { templates }
    }

    pub fn get(&self, normalized_type: &str) -> ResourceTemplate {
        self.templates
            .get(normalized_type)
            .copied()
            .unwrap_or(ResourceTemplate::UNKNOWN)
    }
}

/// Normalize a resource type: lower-case, and map ARM provider types onto
/// the short template keys.
pub fn normalize_type(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let short = match lowered.as_str() {
        "microsoft.resources/resourcegroups" => "resource_group",
        "microsoft.network/virtualnetworks" => "vnet",
        "microsoft.network/virtualnetworks/subnets" => "subnet",
        "microsoft.operationalinsights/workspaces" => "log_analytics_workspace",
        "microsoft.storage/storageaccounts" => "storage_account",
        "microsoft.keyvault/vaults" => "key_vault",
        "microsoft.web/serverfarms" => "app_service_plan",
        "microsoft.web/sites" => "webapp",
        "microsoft.sql/servers" => "sql_server",
        "microsoft.sql/servers/databases" => "sql_database",
        "microsoft.containerservice/managedclusters" => "aks_cluster",
        "microsoft.compute/virtualmachines" => "virtual_machine",
        _ => return lowered,
    };
    short.to_string()
}
