// ABOUTME: Levelized topological grouping and critical path search.
// ABOUTME: Both tolerate cycles: grouping forces progress, path search ignores back edges.

use std::collections::{HashMap, HashSet};

use crate::diagnostics::{Diagnostics, Warning};

use super::plan::ResourceDependency;

/// Split resources into sequential groups whose dependencies are all
/// satisfied by earlier groups.
///
/// Dependencies naming resources outside the set do not block grouping (they
/// are reported separately). When a scan finds nothing ready the first
/// remaining resource is forced into a singleton group, so the loop runs at
/// most `deps.len()` times.
pub fn calculate_groups(
    deps: &mut [ResourceDependency],
    diag: &mut Diagnostics,
) -> Vec<Vec<ResourceDependency>> {
    let known: HashSet<String> = deps.iter().map(|d| d.resource_name.clone()).collect();
    let mut committed: HashSet<String> = HashSet::with_capacity(deps.len());
    let mut placed = vec![false; deps.len()];
    let mut groups: Vec<Vec<usize>> = Vec::new();

    while placed.iter().any(|p| !p) {
        let mut current: Vec<usize> = (0..deps.len())
            .filter(|&i| !placed[i])
            .filter(|&i| {
                deps[i]
                    .depends_on
                    .iter()
                    .all(|d| committed.contains(d) || !known.contains(d))
            })
            .collect();

        if current.is_empty() {
            let remaining: Vec<usize> = (0..deps.len()).filter(|&i| !placed[i]).collect();
            let forced = remaining[0];
            let names: Vec<&str> = remaining
                .iter()
                .map(|&i| deps[i].resource_name.as_str())
                .collect();
            diag.warn(Warning::dependency_cycle(
                &deps[forced].resource_name,
                &names,
            ));
            current = vec![forced];
        }

        // Commit after the scan so a group never contains its own dependencies.
        for &i in &current {
            placed[i] = true;
            committed.insert(deps[i].resource_name.clone());
        }
        groups.push(current);
    }

    for (index, members) in groups.iter().enumerate() {
        for &i in members {
            deps[i].deployment_group = index;
        }
    }

    groups
        .into_iter()
        .map(|members| members.into_iter().map(|i| deps[i].clone()).collect())
        .collect()
}

/// Longest chain of `estimated_deploy_time_seconds` along `depends_on`,
/// returned leaf-first together with its total time.
///
/// Longest-path-to-leaf is memoized per resource. An edge back onto the
/// current DFS stack contributes nothing, which keeps cyclic input finite.
pub fn critical_path(deps: &[ResourceDependency]) -> (u64, Vec<String>) {
    let index: HashMap<&str, usize> = deps
        .iter()
        .enumerate()
        .map(|(i, d)| (d.resource_name.as_str(), i))
        .collect();

    let mut search = PathSearch {
        deps,
        index: &index,
        memo: vec![None; deps.len()],
        on_stack: vec![false; deps.len()],
    };

    let mut best: Option<(u64, usize)> = None;
    for i in 0..deps.len() {
        let total = search.longest_from(i);
        if best.is_none_or(|(t, _)| total > t) {
            best = Some((total, i));
        }
    }

    let Some((total, root)) = best else {
        return (0, Vec::new());
    };

    let mut path = Vec::new();
    let mut cursor = Some(root);
    while let Some(i) = cursor {
        path.push(deps[i].resource_name.clone());
        cursor = search.memo[i].and_then(|(_, next)| next);
    }
    path.reverse();
    (total, path)
}

struct PathSearch<'a> {
    deps: &'a [ResourceDependency],
    index: &'a HashMap<&'a str, usize>,
    /// (longest time to a leaf, next hop on that path)
    memo: Vec<Option<(u64, Option<usize>)>>,
    on_stack: Vec<bool>,
}

impl PathSearch<'_> {
    fn longest_from(&mut self, i: usize) -> u64 {
        if let Some((total, _)) = self.memo[i] {
            return total;
        }

        self.on_stack[i] = true;
        let mut best_dep: Option<(u64, usize)> = None;
        let deps = self.deps;
        for dep in &deps[i].depends_on {
            let Some(&j) = self.index.get(dep.as_str()) else {
                continue;
            };
            if self.on_stack[j] {
                continue;
            }
            let time = self.longest_from(j);
            if best_dep.is_none_or(|(t, _)| time > t) {
                best_dep = Some((time, j));
            }
        }
        self.on_stack[i] = false;

        let own = deps[i].estimated_deploy_time_seconds;
        let total = own + best_dep.map_or(0, |(t, _)| t);
        self.memo[i] = Some((total, best_dep.map(|(_, j)| j)));
        total
    }
}
