//! Step dependency resolution (spec section 4.9): transitive closure of the
//! requested steps, cycle detection, and a topological sort into parallel
//! waves via Kahn's algorithm.

use crate::error::{PipelineError, Result};
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Default)]
pub struct StepDag {
    /// step -> its direct in-job dependencies.
    edges: HashMap<String, Vec<String>>,
}

impl StepDag {
    pub fn new(edges: HashMap<String, Vec<String>>) -> Self {
        Self { edges }
    }

    /// Transitive closure of `requested` under the dependency map, e.g.
    /// requesting only `summarizer` pulls in `filesystem` and `ast` (S3).
    pub fn resolve_closure(&self, requested: &[String]) -> Vec<String> {
        let mut closure: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = requested.iter().cloned().collect();
        while let Some(step) = queue.pop_front() {
            if !closure.insert(step.clone()) {
                continue;
            }
            for dep in self.edges.get(&step).cloned().unwrap_or_default() {
                queue.push_back(dep);
            }
        }
        closure.into_iter().collect()
    }

    /// Splits `steps` into parallel execution waves via Kahn's algorithm
    /// restricted to the given step set. Each wave's steps have no
    /// dependency on each other and may be dispatched concurrently.
    pub fn waves(&self, steps: &[String]) -> Result<Vec<Vec<String>>> {
        let step_set: HashSet<&String> = steps.iter().collect();
        let mut in_degree: HashMap<String, usize> = HashMap::new();
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();

        for step in steps {
            let deps: Vec<String> = self
                .edges
                .get(step)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .filter(|d| step_set.contains(d))
                .collect();
            in_degree.insert(step.clone(), deps.len());
            for dep in deps {
                dependents.entry(dep).or_default().push(step.clone());
            }
        }

        let mut waves = Vec::new();
        let mut remaining = in_degree.clone();
        let mut processed: HashSet<String> = HashSet::new();

        while processed.len() < steps.len() {
            let mut wave: Vec<String> = remaining
                .iter()
                .filter(|(_, &deg)| deg == 0)
                .map(|(s, _)| s.clone())
                .collect();
            if wave.is_empty() {
                let stuck: Vec<String> = remaining.keys().cloned().collect();
                return Err(PipelineError::DependencyCycle(stuck));
            }
            wave.sort();
            for step in &wave {
                remaining.remove(step);
                processed.insert(step.clone());
                if let Some(deps) = dependents.get(step) {
                    for d in deps {
                        if let Some(count) = remaining.get_mut(d) {
                            *count -= 1;
                        }
                    }
                }
            }
            waves.push(wave);
        }
        Ok(waves)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_dag() -> StepDag {
        let mut edges = HashMap::new();
        edges.insert("filesystem".to_string(), vec![]);
        edges.insert("ast".to_string(), vec!["filesystem".to_string()]);
        edges.insert(
            "summarizer".to_string(),
            vec!["filesystem".to_string(), "ast".to_string()],
        );
        edges.insert("docgrapher".to_string(), vec!["filesystem".to_string()]);
        StepDag::new(edges)
    }

    #[test]
    fn resolve_closure_pulls_in_transitive_dependencies() {
        let dag = sample_dag();
        let closure = dag.resolve_closure(&["summarizer".to_string()]);
        let mut sorted = closure.clone();
        sorted.sort();
        assert_eq!(sorted, vec!["ast", "filesystem", "summarizer"]);
        assert!(!closure.contains(&"docgrapher".to_string()));
    }

    #[test]
    fn waves_groups_independent_steps_together() {
        let dag = sample_dag();
        let steps = vec![
            "filesystem".to_string(),
            "ast".to_string(),
            "summarizer".to_string(),
            "docgrapher".to_string(),
        ];
        let waves = dag.waves(&steps).unwrap();
        assert_eq!(waves[0], vec!["filesystem"]);
        // ast and docgrapher both only need filesystem, so they share wave 2.
        assert_eq!(waves[1], vec!["ast", "docgrapher"]);
        assert_eq!(waves[2], vec!["summarizer"]);
    }

    #[test]
    fn waves_detects_cycles() {
        let mut edges = HashMap::new();
        edges.insert("a".to_string(), vec!["b".to_string()]);
        edges.insert("b".to_string(), vec!["a".to_string()]);
        let dag = StepDag::new(edges);
        let result = dag.waves(&["a".to_string(), "b".to_string()]);
        assert!(matches!(result, Err(PipelineError::DependencyCycle(_))));
    }

    #[test]
    fn single_step_with_no_deps_is_one_wave() {
        let dag = sample_dag();
        let waves = dag.waves(&["filesystem".to_string()]).unwrap();
        assert_eq!(waves, vec![vec!["filesystem".to_string()]]);
    }

    /// Generates an acyclic dependency graph over `n` nodes by only ever
    /// letting node `i` depend on nodes `< i` — cheap to build and cycle-free
    /// by construction, so every sample exercises `waves()`'s happy path.
    fn acyclic_edges(max_nodes: usize) -> impl Strategy<Value = (usize, Vec<Vec<usize>>)> {
        (2..=max_nodes).prop_flat_map(|n| {
            let per_node: Vec<_> = (0..n)
                .map(|i| {
                    if i == 0 {
                        Just(Vec::new()).boxed()
                    } else {
                        proptest::collection::vec(0..i, 0..i.min(3))
                            .prop_map(|mut deps| {
                                deps.sort_unstable();
                                deps.dedup();
                                deps
                            })
                            .boxed()
                    }
                })
                .collect();
            per_node.prop_map(move |edges| (n, edges))
        })
    }

    proptest! {
        /// Every step lands in exactly one wave, and strictly after every
        /// wave containing one of its dependencies — the defining contract
        /// of a topological sort, checked against randomly shaped DAGs
        /// rather than the handful of graphs the enumerated tests above use.
        #[test]
        fn waves_always_orders_dependencies_before_dependents((n, adjacency) in acyclic_edges(8)) {
            let names: Vec<String> = (0..n).map(|i| format!("n{i}")).collect();
            let mut edges = HashMap::new();
            for (i, deps) in adjacency.iter().enumerate() {
                edges.insert(names[i].clone(), deps.iter().map(|&d| names[d].clone()).collect());
            }
            let dag = StepDag::new(edges);
            let waves = dag.waves(&names).unwrap();

            let mut wave_of: HashMap<&str, usize> = HashMap::new();
            for (idx, wave) in waves.iter().enumerate() {
                for step in wave {
                    wave_of.insert(step.as_str(), idx);
                }
            }
            prop_assert_eq!(wave_of.len(), n);
            for (i, deps) in adjacency.iter().enumerate() {
                for &d in deps {
                    prop_assert!(wave_of[names[i].as_str()] > wave_of[names[d].as_str()]);
                }
            }
        }
    }
}
