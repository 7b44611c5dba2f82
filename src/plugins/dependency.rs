//! Dependency resolution for plugin declarations.
//!
//! Produces a total initialization order with Kahn's algorithm. Among
//! plugins that are ready at the same time, the one registered first comes
//! first, so the order is deterministic for a given registration sequence.

use std::collections::{BTreeSet, HashMap};

use super::error::PluginError;
use super::registry::PluginDeclaration;

/// Resolve declarations into an order where every plugin follows all of
/// its dependencies.
///
/// Fails with `UnresolvedDependency` for the first unregistered dependency
/// found in registration order, and with `CyclicDependency` (carrying a
/// closed path such as `a -> b -> a`) when the graph has a cycle.
pub fn resolve_order(declarations: &[PluginDeclaration]) -> Result<Vec<String>, PluginError> {
    let index: HashMap<&str, usize> = declarations
        .iter()
        .enumerate()
        .map(|(i, d)| (d.name(), i))
        .collect();

    // Every edge must point at a registered plugin.
    for decl in declarations {
        if let Some(missing) = decl
            .dependencies()
            .iter()
            .find(|dep| !index.contains_key(dep.as_str()))
        {
            return Err(PluginError::UnresolvedDependency {
                name: decl.name().to_string(),
                missing: missing.clone(),
            });
        }
    }

    // dependents[j] = plugins that depend on j.
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); declarations.len()];
    let mut in_degree: Vec<usize> = Vec::with_capacity(declarations.len());
    for (i, decl) in declarations.iter().enumerate() {
        in_degree.push(decl.dependencies().len());
        for dep in decl.dependencies() {
            dependents[index[dep.as_str()]].push(i);
        }
    }

    // Ready set keyed by registration index keeps the sort stable.
    let mut ready: BTreeSet<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &deg)| deg == 0)
        .map(|(i, _)| i)
        .collect();

    let mut order = Vec::with_capacity(declarations.len());
    while let Some(i) = ready.pop_first() {
        order.push(i);
        for &dependent in &dependents[i] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() < declarations.len() {
        let cycle = find_cycle(declarations, &index, &in_degree);
        return Err(PluginError::CyclicDependency { cycle });
    }

    Ok(order
        .into_iter()
        .map(|i| declarations[i].name().to_string())
        .collect())
}

/// Walk the unresolved remainder from its first-registered node until a
/// node repeats. Every leftover node has at least one leftover dependency,
/// so the walk always closes.
fn find_cycle(
    declarations: &[PluginDeclaration],
    index: &HashMap<&str, usize>,
    in_degree: &[usize],
) -> Vec<String> {
    let remaining = |i: usize| in_degree[i] > 0;
    let Some(start) = (0..declarations.len()).find(|&i| remaining(i)) else {
        return Vec::new();
    };

    let mut path: Vec<usize> = Vec::new();
    let mut seen: HashMap<usize, usize> = HashMap::new();
    let mut current = start;
    loop {
        if let Some(&pos) = seen.get(&current) {
            let mut cycle: Vec<String> = path[pos..]
                .iter()
                .map(|&i| declarations[i].name().to_string())
                .collect();
            cycle.push(declarations[current].name().to_string());
            return cycle;
        }
        seen.insert(current, path.len());
        path.push(current);

        let next = declarations[current]
            .dependencies()
            .iter()
            .map(|dep| index[dep.as_str()])
            .find(|&j| remaining(j));
        match next {
            Some(j) => current = j,
            None => {
                return path
                    .iter()
                    .map(|&i| declarations[i].name().to_string())
                    .collect()
            }
        }
    }
}
