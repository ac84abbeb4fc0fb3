//! Bounded-concurrency DAG scheduler (spec 4.7.2): generic over what
//! "process a node" means, so content extraction, prompting, and writeback
//! stay in their own modules. A node becomes ready once every prerequisite
//! has *finished*, successfully or not — a failed prerequisite never blocks
//! its dependents, it just leaves their prompt without that node's summary.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinSet;

use super::dag::{NodeKey, SummarizerDag};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStatus {
    Pending,
    Ready,
    Processing,
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ExecutionReport {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl ExecutionReport {
    pub fn total(&self) -> usize {
        self.completed + self.failed + self.skipped
    }
}

/// Runs `process` over every node in `dag`, at most `max_concurrency` at a
/// time, respecting dependency order. `process` returns whether the node
/// succeeded; the return value only affects bookkeeping, never scheduling.
pub async fn execute<F, Fut>(dag: &SummarizerDag, max_concurrency: usize, process: F) -> ExecutionReport
where
    F: Fn(NodeKey) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    let process = Arc::new(process);
    let max_concurrency = max_concurrency.max(1);

    let mut remaining: HashMap<NodeKey, usize> = dag
        .nodes
        .keys()
        .map(|k| (k.clone(), dag.depends_on.get(k).map(|s| s.len()).unwrap_or(0)))
        .collect();
    let mut status: HashMap<NodeKey, ProcessingStatus> =
        dag.nodes.keys().map(|k| (k.clone(), ProcessingStatus::Pending)).collect();
    let mut ready: VecDeque<NodeKey> = VecDeque::new();
    for (key, count) in &remaining {
        if *count == 0 {
            status.insert(key.clone(), ProcessingStatus::Ready);
            ready.push_back(key.clone());
        }
    }

    let mut report = ExecutionReport::default();
    let mut in_flight: JoinSet<(NodeKey, bool)> = JoinSet::new();

    loop {
        while in_flight.len() < max_concurrency {
            let Some(node) = ready.pop_front() else { break };
            status.insert(node.clone(), ProcessingStatus::Processing);
            let process = process.clone();
            let node_for_task = node.clone();
            in_flight.spawn(async move {
                let ok = process(node_for_task.clone()).await;
                (node_for_task, ok)
            });
        }

        let Some(finished) = in_flight.join_next().await else {
            break;
        };
        let (node, ok) = finished.expect("summarizer worker task panicked");

        if ok {
            status.insert(node.clone(), ProcessingStatus::Completed);
            report.completed += 1;
        } else {
            status.insert(node.clone(), ProcessingStatus::Failed);
            report.failed += 1;
        }

        if let Some(dependents) = dag.dependents.get(&node) {
            for dependent in dependents {
                if let Some(count) = remaining.get_mut(dependent) {
                    *count = count.saturating_sub(1);
                    if *count == 0 && status.get(dependent) == Some(&ProcessingStatus::Pending) {
                        status.insert(dependent.clone(), ProcessingStatus::Ready);
                        ready.push_back(dependent.clone());
                    }
                }
            }
        }
    }

    // Cycle-detection fallback: any node still Pending/Ready once the
    // ready-queue and in-flight set both go empty has an unresolved
    // dependency that will never finish (a cycle `break_cycles()` failed to
    // fully sever). These survivors are marked failed, not skipped — they
    // never ran, but "skipped" would imply they were deliberately excluded
    // rather than stuck.
    for state in status.values_mut() {
        if matches!(state, ProcessingStatus::Pending | ProcessingStatus::Ready) {
            *state = ProcessingStatus::Failed;
            report.failed += 1;
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use codestory_core::domain::NodeLabel;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn dag_with_chain() -> SummarizerDag {
        // parent depends on child, child depends on grandchild: grandchild
        // must run before child, child before parent.
        let mut dag = SummarizerDag::default();
        let grandchild = (NodeLabel::Function, "grandchild".to_string());
        let child = (NodeLabel::Class, "child".to_string());
        let parent = (NodeLabel::File, "parent".to_string());
        for key in [&grandchild, &child, &parent] {
            dag.nodes.insert(
                key.clone(),
                super::super::dag::SummarizerNode { key: key.clone(), properties: Default::default() },
            );
        }
        dag.depends_on.entry(child.clone()).or_default().insert(grandchild.clone());
        dag.dependents.entry(grandchild.clone()).or_default().insert(child.clone());
        dag.depends_on.entry(parent.clone()).or_default().insert(child.clone());
        dag.dependents.entry(child).or_default().insert(parent);
        dag
    }

    #[tokio::test]
    async fn processes_every_node_in_dependency_order() {
        let dag = dag_with_chain();
        let order: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let order_clone = order.clone();
        let report = execute(&dag, 5, move |key| {
            let order = order_clone.clone();
            async move {
                order.lock().unwrap().push(key.1.clone());
                true
            }
        })
        .await;

        assert_eq!(report.completed, 3);
        assert_eq!(report.failed, 0);
        assert_eq!(report.skipped, 0);

        let seen = order.lock().unwrap().clone();
        let pos = |name: &str| seen.iter().position(|s| s == name).unwrap();
        assert!(pos("grandchild") < pos("child"));
        assert!(pos("child") < pos("parent"));
    }

    #[tokio::test]
    async fn never_exceeds_the_concurrency_cap() {
        let mut dag = SummarizerDag::default();
        for i in 0..10 {
            let key = (NodeLabel::File, format!("f{i}"));
            dag.nodes.insert(key.clone(), super::super::dag::SummarizerNode { key, properties: Default::default() });
        }
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let current_clone = current.clone();
        let peak_clone = peak.clone();
        let report = execute(&dag, 2, move |_key| {
            let current = current_clone.clone();
            let peak = peak_clone.clone();
            async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                true
            }
        })
        .await;

        assert_eq!(report.completed, 10);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn a_failed_prerequisite_does_not_block_its_dependents() {
        let dag = dag_with_chain();
        let report = execute(&dag, 5, |key| async move { key.1 != "child" }).await;
        assert_eq!(report.completed, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, 0);
    }

    /// A mutual dependency that `break_cycles()` failed to sever entirely
    /// leaves both nodes forever unready; the fallback must mark them
    /// failed rather than deadlocking the step or silently skipping them.
    #[tokio::test]
    async fn survivors_of_an_unbroken_cycle_are_marked_failed() {
        let mut dag = SummarizerDag::default();
        let a = (NodeLabel::File, "a".to_string());
        let b = (NodeLabel::File, "b".to_string());
        let independent = (NodeLabel::File, "independent".to_string());
        for key in [&a, &b, &independent] {
            dag.nodes.insert(
                key.clone(),
                super::super::dag::SummarizerNode { key: key.clone(), properties: Default::default() },
            );
        }
        dag.depends_on.entry(a.clone()).or_default().insert(b.clone());
        dag.dependents.entry(b.clone()).or_default().insert(a.clone());
        dag.depends_on.entry(b.clone()).or_default().insert(a.clone());
        dag.dependents.entry(a.clone()).or_default().insert(b.clone());

        let report = execute(&dag, 5, |_key| async move { true }).await;

        assert_eq!(report.completed, 1, "only the independent node should ever become ready");
        assert_eq!(report.failed, 2, "both cycle participants are marked failed, not skipped");
        assert_eq!(report.skipped, 0);
    }
}
