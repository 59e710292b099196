// ABOUTME: Static remediation catalogs: region neighbours, SKU families, CIDR pool, roles.
// ABOUTME: Built once per handler and consulted read-only.

use std::collections::HashMap;

use regex::{Regex, RegexBuilder};

type Table = HashMap<&'static str, &'static [&'static str]>;

pub struct Catalog {
    regions: Table,
    sku_families: HashMap<&'static str, Table>,
    cidr_pool: &'static [&'static str],
    roles: Table,
    dependency_patterns: Vec<(Regex, &'static str)>,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("regions", &self.regions.len())
            .field("sku_families", &self.sku_families.len())
            .field("cidr_pool", &self.cidr_pool.len())
            .finish_non_exhaustive()
    }
}

type Entries = &'static [(&'static str, &'static [&'static str])];

const REGIONS: Entries = &[
    (
        "westeurope",
        &[
            "northeurope",
            "westeurope2",
            "francecentral",
            "germanywestcentral",
        ],
    ),
    (
        "eastus",
        &["eastus2", "centralus", "southcentralus", "westus2"],
    ),
    (
        "southeastasia",
        &["eastasia", "japaneast", "australiaeast", "koreacentral"],
    ),
    ("uksouth", &["ukwest", "northeurope", "westeurope"]),
    (
        "australiaeast",
        &["australiasoutheast", "southeastasia", "eastasia"],
    ),
    ("centralindia", &["southindia", "westindia", "southeastasia"]),
    ("canadacentral", &["canadaeast", "eastus2", "centralus"]),
    ("brazilsouth", &["southcentralus", "eastus2", "centralus"]),
];

const VIRTUAL_MACHINE_SKUS: Entries = &[
    (
        "Standard_D2s_v3",
        &["Standard_D2as_v4", "Standard_B2s", "Standard_D2_v3"],
    ),
    (
        "Standard_D4s_v3",
        &["Standard_D4as_v4", "Standard_B4ms", "Standard_D4_v3"],
    ),
    (
        "Standard_F2s_v2",
        &["Standard_F2s", "Standard_D2s_v3", "Standard_B2s"],
    ),
    (
        "Standard_B1s",
        &["Standard_B1ms", "Standard_A1_v2", "Standard_D1_v2"],
    ),
];

const APP_SERVICE_SKUS: Entries = &[
    ("P1v2", &["P1v3", "S1", "P1"]),
    ("P2v2", &["P2v3", "S2", "P2"]),
    ("S1", &["B1", "P1v2", "S2"]),
    ("F1", &["D1", "B1"]),
    ("B1", &["S1", "F1"]),
];

const STORAGE_ACCOUNT_SKUS: Entries = &[
    (
        "Premium_LRS",
        &["Standard_LRS", "Standard_ZRS", "Premium_ZRS"],
    ),
    (
        "Standard_GRS",
        &["Standard_LRS", "Standard_RAGRS", "Standard_ZRS"],
    ),
    ("Standard_LRS", &["Standard_ZRS", "Standard_GRS"]),
];

const SQL_DATABASE_SKUS: Entries = &[
    ("S0", &["S1", "Basic", "GP_S_Gen5_1"]),
    ("S1", &["S2", "S0", "GP_S_Gen5_2"]),
    ("P1", &["P2", "S3", "GP_Gen5_2"]),
    ("GP_Gen5_2", &["GP_S_Gen5_2", "GP_Gen5_4", "S2"]),
];

const ROLES: Entries = &[
    (
        "virtual_machine",
        &["Virtual Machine Contributor", "Compute Contributor"],
    ),
    ("storage_account", &["Storage Account Contributor"]),
    (
        "app_service",
        &["Website Contributor", "App Service Contributor"],
    ),
    (
        "sql_database",
        &["SQL DB Contributor", "SQL Server Contributor"],
    ),
    ("key_vault", &["Key Vault Contributor"]),
    ("network", &["Network Contributor"]),
];

const CIDR_POOL: &[&str] = &[
    "10.1.0.0/16",
    "10.2.0.0/16",
    "10.3.0.0/16",
    "172.16.0.0/16",
    "172.17.0.0/16",
    "172.18.0.0/16",
    "192.168.1.0/24",
    "192.168.2.0/24",
    "192.168.3.0/24",
];

const DEPENDENCY_PATTERNS: &[(&str, &str)] = &[
    (r"resource group '([^']+)' not found", "Resource Group"),
    (r"virtual network '([^']+)' not found", "Virtual Network"),
    (r"subnet '([^']+)' not found", "Subnet"),
    (r"storage account '([^']+)' not found", "Storage Account"),
    (r"key vault '([^']+)' not found", "Key Vault"),
];

const DEFAULT_ROLES: &[&str] = &["Contributor"];

fn table(entries: Entries) -> Table {
    entries.iter().copied().collect()
}

impl Catalog {
    pub fn builtin() -> Self {
        let sku_families = HashMap::from([
            ("virtual_machines", table(VIRTUAL_MACHINE_SKUS)),
            ("app_service", table(APP_SERVICE_SKUS)),
            ("storage_account", table(STORAGE_ACCOUNT_SKUS)),
            ("sql_database", table(SQL_DATABASE_SKUS)),
        ]);

        let dependency_patterns = DEPENDENCY_PATTERNS
            .iter()
            .filter_map(|&(pattern, kind)| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        tracing::warn!(pattern, error = %e, "Skipping invalid dependency pattern");
                    })
                    .ok()
                    .map(|re| (re, kind))
            })
            .collect();

        Self {
            regions: table(REGIONS),
            sku_families,
            cidr_pool: CIDR_POOL,
            roles: table(ROLES),
            dependency_patterns,
        }
    }

    pub fn alternative_regions(&self, location: &str) -> &'static [&'static str] {
        self.regions.get(location).copied().unwrap_or(&[])
    }

    /// Alternatives for `sku` within a SKU family.
    pub fn sku_alternatives(&self, family: &str, sku: &str) -> Option<&'static [&'static str]> {
        self.sku_families
            .get(family)
            .and_then(|table| table.get(sku).copied())
    }

    /// Up to `limit` pool ranges, skipping the one already in use.
    pub fn free_cidrs(&self, in_use: Option<&str>, limit: usize) -> Vec<&'static str> {
        self.cidr_pool
            .iter()
            .copied()
            .filter(|cidr| Some(*cidr) != in_use)
            .take(limit)
            .collect()
    }

    pub fn required_roles(&self, resource_type: &str) -> &'static [&'static str] {
        self.roles
            .get(resource_type.to_lowercase().as_str())
            .copied()
            .unwrap_or(DEFAULT_ROLES)
    }

    /// `"<Kind>: <name>"` for messages like `subnet 'app' not found`.
    pub fn missing_dependency(&self, message: &str) -> String {
        self.dependency_patterns
            .iter()
            .find_map(|(re, kind)| {
                re.captures(message)
                    .and_then(|caps| caps.get(1))
                    .map(|name| format!("{kind}: {}", name.as_str()))
            })
            .unwrap_or_else(|| "Unknown dependency".to_string())
    }
}

/// SKU family for a resource type.
pub fn sku_family(resource_type: &str) -> Option<&'static str> {
    match resource_type.to_lowercase().as_str() {
        "virtual_machine" | "vm" => Some("virtual_machines"),
        "app_service" | "webapp" => Some("app_service"),
        "storage_account" => Some("storage_account"),
        "sql_database" => Some("sql_database"),
        _ => None,
    }
}

/// Subnet carved from a vnet range: `/16 → /24`, `/24 → /26`.
pub fn subnet_cidr(vnet_cidr: &str) -> String {
    if let Some(base) = vnet_cidr.strip_suffix("/16") {
        format!("{base}/24")
    } else if let Some(base) = vnet_cidr.strip_suffix("/24") {
        format!("{base}/26")
    } else {
        "10.0.1.0/24".to_string()
    }
}
