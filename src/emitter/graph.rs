//! Emitter dependency graph and topological ordering.
//!
//! Edges run dependency → dependent, so instantiating in sorted order
//! guarantees every reference already exists when its dependent is built.
//! Kahn's algorithm; a non-empty leftover set after the queue drains is a
//! cycle and is reported with the unsorted node names.

use std::collections::{HashMap, VecDeque};

use crate::error::CompileError;

use super::EmitterSpec;

/// Topologically sort `specs`, returning indices into the slice.
///
/// Errors: duplicate names, references to unknown emitters, cycles.
pub fn topo_sort(specs: &[EmitterSpec]) -> Result<Vec<usize>, CompileError> {
    let mut index_of: HashMap<&str, usize> = HashMap::with_capacity(specs.len());
    for (i, spec) in specs.iter().enumerate() {
        if index_of.insert(spec.name.as_str(), i).is_some() {
            return Err(CompileError::DuplicateEmitter(spec.name.clone()));
        }
    }

    // dependents[d] = nodes that depend on d; indegree = unresolved deps.
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); specs.len()];
    let mut indegree = vec![0usize; specs.len()];
    for (i, spec) in specs.iter().enumerate() {
        for reference in spec.references() {
            let dep = *index_of
                .get(reference)
                .ok_or_else(|| CompileError::UnknownEmitter(reference.to_string()))?;
            dependents[dep].push(i);
            indegree[i] += 1;
        }
    }

    let mut queue: VecDeque<usize> = indegree
        .iter()
        .enumerate()
        .filter(|(_, &deg)| deg == 0)
        .map(|(i, _)| i)
        .collect();

    let mut order = Vec::with_capacity(specs.len());
    while let Some(node) = queue.pop_front() {
        order.push(node);
        for &dependent in &dependents[node] {
            indegree[dependent] -= 1;
            if indegree[dependent] == 0 {
                queue.push_back(dependent);
            }
        }
    }

    if order.len() < specs.len() {
        let mut stuck: Vec<String> = indegree
            .iter()
            .enumerate()
            .filter(|(_, &deg)| deg > 0)
            .map(|(i, _)| specs[i].name.clone())
            .collect();
        stuck.sort();
        return Err(CompileError::CyclicEmitters(stuck));
    }

    Ok(order)
}
