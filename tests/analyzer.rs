// ABOUTME: Integration tests for the dependency analyzer.
// ABOUTME: Grouping, cycle handling, critical path, totals and parallel optimization.

mod support;

use proptest::prelude::*;
use skyplan::analyzer::{AnalyzerError, DependencyAnalyzer, DeploymentPlan};
use skyplan::resource::ResourceSpec;
use skyplan::types::Environment;
use std::collections::HashMap;

fn analyze(resources: &[ResourceSpec]) -> DeploymentPlan {
    support::init_tracing();
    DependencyAnalyzer::new()
        .analyze(resources, Environment::Dev)
        .expect("analysis should succeed")
}

fn group_of(plan: &DeploymentPlan) -> HashMap<&str, usize> {
    plan.deployment_groups
        .iter()
        .enumerate()
        .flat_map(|(i, g)| g.iter().map(move |r| (r.resource_name.as_str(), i)))
        .collect()
}

mod grouping {
    use super::*;

    /// Test: A chain of network resources deploys one level at a time.
    #[test]
    fn aks_chain_is_levelized() {
        let resources = vec![
            ResourceSpec::new("resource_group", "rg1"),
            ResourceSpec::new("vnet", "v1").depends_on(["rg1"]),
            ResourceSpec::new("subnet", "s1").depends_on(["v1"]),
            ResourceSpec::new("aks_cluster", "c1").depends_on(["v1", "s1"]),
        ];
        let plan = analyze(&resources);

        assert_eq!(
            plan.group_names(),
            vec![vec!["rg1"], vec!["v1"], vec!["s1"], vec!["c1"]]
        );
        assert_eq!(
            plan.dependency_warnings,
            vec!["AKS cluster 'c1' should have Log Analytics workspace for monitoring"]
        );
        assert_eq!(plan.critical_path, vec!["rg1", "v1", "s1", "c1"]);
        assert_eq!(plan.total_estimated_time_seconds, 30 + 60 + 30 + 600);
        assert_eq!(plan.parallel_opportunities, 0);
    }

    /// Test: A three-node cycle still yields three singleton groups.
    #[test]
    fn cycle_is_forced_through() {
        let resources = vec![
            ResourceSpec::new("vnet", "A").depends_on(["B"]),
            ResourceSpec::new("vnet", "B").depends_on(["C"]),
            ResourceSpec::new("vnet", "C").depends_on(["A"]),
        ];
        let plan = analyze(&resources);

        assert_eq!(plan.deployment_groups.len(), 3);
        assert!(plan.deployment_groups.iter().all(|g| g.len() == 1));
        assert_eq!(plan.group_names()[0], vec!["A"]);
        assert!(
            plan.dependency_warnings
                .iter()
                .any(|w| w.contains("forcing 'A'"))
        );
    }

    /// Test: Independent resources share the first group.
    #[test]
    fn independent_resources_run_together() {
        let resources = vec![
            ResourceSpec::new("storage_account", "logs"),
            ResourceSpec::new("key_vault", "secrets"),
            ResourceSpec::new("storage_account", "data"),
        ];
        let plan = analyze(&resources);

        assert_eq!(plan.deployment_groups.len(), 1);
        assert_eq!(plan.parallel_opportunities, 3);
        assert_eq!(plan.total_estimated_time_seconds, 90);
    }

    /// Test: Dangling references warn but do not block grouping.
    #[test]
    fn missing_dependency_is_a_warning() {
        let resources = vec![ResourceSpec::new("vnet", "net").depends_on(["ghost-rg"])];
        let plan = analyze(&resources);

        assert_eq!(plan.group_names(), vec![vec!["net"]]);
        assert_eq!(
            plan.dependency_warnings,
            vec!["Resource 'net' depends on 'ghost-rg' which is not in deployment"]
        );
    }

    /// Test: Web apps are placed after their conventionally named plan.
    #[test]
    fn webapp_follows_inferred_plan() {
        let resources = vec![
            ResourceSpec::new("webapp", "shop"),
            ResourceSpec::new("app_service_plan", "other-plan"),
            ResourceSpec::new("app_service_plan", "shop-plan"),
        ];
        let plan = analyze(&resources);
        let groups = group_of(&plan);

        assert!(groups["shop"] > groups["shop-plan"]);
        assert_eq!(plan.find("shop").unwrap().depends_on, vec!["shop-plan"]);
    }

    /// Test: ARM provider types map onto the same templates as short names.
    #[test]
    fn provider_types_are_normalized() {
        let resources = vec![ResourceSpec::new("Microsoft.ContainerService/managedClusters", "k8s")];
        let plan = analyze(&resources);
        let aks = plan.find("k8s").unwrap();

        assert_eq!(aks.resource_type, "aks_cluster");
        assert_eq!(aks.estimated_deploy_time_seconds, 600);
        assert!(!aks.can_deploy_parallel);
    }

    /// Test: Duplicate names are rejected before planning.
    #[test]
    fn duplicate_names_are_rejected() {
        let resources = vec![
            ResourceSpec::new("vnet", "net"),
            ResourceSpec::new("subnet", "net"),
        ];
        let err = DependencyAnalyzer::new()
            .analyze(&resources, Environment::Dev)
            .unwrap_err();
        assert_eq!(err, AnalyzerError::DuplicateName("net".to_string()));
    }

    /// Test: An empty resource list gives an empty plan.
    #[test]
    fn empty_input_gives_empty_plan() {
        let plan = analyze(&[]);
        assert!(plan.deployment_groups.is_empty());
        assert!(plan.critical_path.is_empty());
        assert_eq!(plan.total_estimated_time_seconds, 0);
    }
}

mod optimization {
    use super::*;

    fn mixed_group() -> Vec<ResourceSpec> {
        vec![
            ResourceSpec::new("storage_account", "logs"),
            ResourceSpec::new("aks_cluster", "k8s"),
            ResourceSpec::new("sql_database", "orders"),
            ResourceSpec::new("key_vault", "secrets"),
        ]
    }

    /// Test: Sequential-only resources are split out of mixed groups.
    #[test]
    fn splits_sequential_members() {
        let analyzer = DependencyAnalyzer::new();
        let plan = analyzer
            .analyze(&mixed_group(), Environment::Dev)
            .unwrap();
        assert_eq!(plan.deployment_groups.len(), 1);

        let (optimized, report) = analyzer.optimize_for_parallel(&plan);
        assert_eq!(
            optimized.group_names(),
            vec![vec!["logs", "secrets"], vec!["k8s"], vec!["orders"]]
        );
        for (index, group) in optimized.deployment_groups.iter().enumerate() {
            assert!(group.iter().all(|r| r.deployment_group == index));
        }
        assert_eq!(report.original_time_seconds, 600);
        assert_eq!(report.optimized_time_seconds, 90 + 600 + 120);
        assert_eq!(report.time_saved_seconds, 600 - 810);
        assert!(!report.optimization_applied);
        assert_eq!(optimized.parallel_opportunities, 2);
    }

    /// Test: Optimizing twice changes nothing the second time.
    #[test]
    fn optimization_is_idempotent() {
        let analyzer = DependencyAnalyzer::new();
        let plan = analyzer
            .analyze(&mixed_group(), Environment::Dev)
            .unwrap();

        let (once, _) = analyzer.optimize_for_parallel(&plan);
        let (twice, report) = analyzer.optimize_for_parallel(&once);

        assert_eq!(once, twice);
        assert_eq!(
            once.total_estimated_time_seconds,
            twice.total_estimated_time_seconds
        );
        assert_eq!(report.time_saved_seconds, 0);
    }
}

fn arb_resources() -> impl Strategy<Value = Vec<ResourceSpec>> {
    const TYPES: [&str; 6] = [
        "vnet",
        "subnet",
        "storage_account",
        "aks_cluster",
        "sql_database",
        "webapp",
    ];
    (1usize..12).prop_flat_map(|n| {
        proptest::collection::vec(
            (
                0..TYPES.len(),
                proptest::collection::vec(0..n + 2, 0..4),
            ),
            n,
        )
        .prop_map(move |rows| {
            rows.into_iter()
                .enumerate()
                .map(|(i, (t, deps))| {
                    ResourceSpec::new(TYPES[t], format!("r{i}"))
                        .depends_on(deps.into_iter().map(|d| format!("r{d}")))
                })
                .collect()
        })
    })
}

proptest! {
    /// Test: Every resource lands in exactly one group.
    #[test]
    fn every_resource_is_placed_once(resources in arb_resources()) {
        let plan = DependencyAnalyzer::new().analyze(&resources, Environment::Dev).unwrap();
        prop_assert_eq!(plan.resource_count(), resources.len());
        prop_assert!(plan.deployment_groups.len() <= resources.len());
        prop_assert!(plan.deployment_groups.iter().all(|g| !g.is_empty()));
    }

    /// Test: Without warnings about cycles, dependencies precede dependents.
    #[test]
    fn acyclic_dependencies_precede_dependents(resources in arb_resources()) {
        let plan = DependencyAnalyzer::new().analyze(&resources, Environment::Dev).unwrap();
        prop_assume!(!plan.dependency_warnings.iter().any(|w| w.contains("forcing")));

        let groups = group_of(&plan);
        for resource in plan.deployment_groups.iter().flatten() {
            for dep in &resource.depends_on {
                if let Some(&dep_group) = groups.get(dep.as_str()) {
                    prop_assert!(dep_group < resource.deployment_group);
                }
            }
        }
    }

    /// Test: Total time is the sum of the slowest member of each group.
    #[test]
    fn total_time_matches_group_maxima(resources in arb_resources()) {
        let plan = DependencyAnalyzer::new().analyze(&resources, Environment::Dev).unwrap();
        let expected: u64 = plan
            .deployment_groups
            .iter()
            .map(|g| g.iter().map(|r| r.estimated_deploy_time_seconds).max().unwrap_or(0))
            .sum();
        prop_assert_eq!(plan.total_estimated_time_seconds, expected);
    }

    /// Test: The critical path never takes longer than all resources together.
    #[test]
    fn critical_path_is_bounded(resources in arb_resources()) {
        let plan = DependencyAnalyzer::new().analyze(&resources, Environment::Dev).unwrap();
        let path_time: u64 = plan
            .critical_path
            .iter()
            .map(|name| plan.find(name).unwrap().estimated_deploy_time_seconds)
            .sum();
        let all_time: u64 = plan
            .deployment_groups
            .iter()
            .flatten()
            .map(|r| r.estimated_deploy_time_seconds)
            .sum();
        prop_assert!(!plan.critical_path.is_empty());
        prop_assert!(path_time <= all_time);
    }

    /// Test: Optimization is stable under repetition.
    #[test]
    fn optimize_twice_keeps_total(resources in arb_resources()) {
        let analyzer = DependencyAnalyzer::new();
        let plan = analyzer.analyze(&resources, Environment::Dev).unwrap();
        let (once, _) = analyzer.optimize_for_parallel(&plan);
        let (twice, _) = analyzer.optimize_for_parallel(&once);
        prop_assert_eq!(once.total_estimated_time_seconds, twice.total_estimated_time_seconds);
        prop_assert_eq!(once.resource_count(), resources.len());
    }
}
