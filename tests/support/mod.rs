// ABOUTME: Test support utilities.
// ABOUTME: Tracing setup, fast machine settings and resource fixtures.

use std::sync::Once;
use std::time::Duration;

use skyplan::deploy::{DeploymentContext, MachineSettings};
use skyplan::resource::ResourceSpec;
use skyplan::types::Environment;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env().add_directive("skyplan=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Machine settings without backoff delays.
#[allow(dead_code)]
pub fn fast_settings() -> MachineSettings {
    MachineSettings {
        backoff_base: Duration::ZERO,
        ..MachineSettings::default()
    }
}

/// Resource group, vnet, subnet and a web app on its plan.
#[allow(dead_code)]
pub fn web_stack() -> Vec<ResourceSpec> {
    vec![
        ResourceSpec::new("resource_group", "rg"),
        ResourceSpec::new("vnet", "net")
            .depends_on(["rg"])
            .with_attribute("address_space", "10.0.0.0/16"),
        ResourceSpec::new("subnet", "apps")
            .depends_on(["net"])
            .with_attribute("vnet_name", "net"),
        ResourceSpec::new("app_service_plan", "shop-plan").depends_on(["rg"]),
        ResourceSpec::new("webapp", "shop").with_attribute("sku", "S1"),
    ]
}

/// Dev context over `resources`.
#[allow(dead_code)]
pub fn dev_context(resources: Vec<ResourceSpec>) -> DeploymentContext {
    let mut ctx = DeploymentContext::new("sub-123", "rg-test", resources);
    ctx.environment = Environment::Dev;
    ctx.initiated_by = "tester".to_string();
    ctx
}
