//! Task Scheduler
//!
//! Executes a [`TaskGraph`] as a dependency-driven work queue. A task becomes
//! ready once every dependency is `Done`; ready tasks are dispatched in
//! topological order onto a [`JoinSet`] with at most `max_parallel` in flight.
//! Dependents of failed or skipped tasks are never run and are marked
//! `SkippedDependencyFailed`.

use crate::types::{AppError, Result, TaskNode, TaskOutput, TaskStatus};
use crate::workflows::plan::TaskGraph;
use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Runs a single task on behalf of the scheduler.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &TaskNode) -> Result<TaskOutput>;
}

/// Error recorded for a task that did not complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub task_id: String,
    pub reason: String,
}

/// Outcome of running a whole graph.
#[derive(Debug, Clone)]
pub struct ScheduleOutcome {
    /// Tasks in declaration order with their final status.
    pub nodes: Vec<TaskNode>,
    /// Outputs of `Done` tasks, in topological order.
    pub outputs: Vec<(String, TaskOutput)>,
    pub failures: Vec<TaskFailure>,
}

impl ScheduleOutcome {
    pub fn completed(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.status == TaskStatus::Done)
            .count()
    }

    /// True when at least one task failed or was skipped.
    pub fn degraded(&self) -> bool {
        self.nodes.iter().any(|n| {
            matches!(
                n.status,
                TaskStatus::Failed | TaskStatus::SkippedDependencyFailed
            )
        })
    }
}

type Joined = (usize, Result<TaskOutput>);

#[derive(Debug, Clone)]
pub struct TaskScheduler {
    max_parallel: usize,
    cancel_grace: Duration,
}

impl TaskScheduler {
    pub fn new(max_parallel: usize, cancel_grace: Duration) -> Self {
        Self {
            max_parallel: max_parallel.max(1),
            cancel_grace,
        }
    }

    /// Run every task in `graph`.
    ///
    /// `on_dispatch` is called for each task right before it starts, in
    /// dispatch order. Returns `AppError::Cancelled` if `cancel` fires
    /// before the graph settles; in-flight tasks get the grace period to
    /// finish and are aborted after it.
    pub async fn run<F>(
        &self,
        graph: TaskGraph,
        executor: Arc<dyn TaskExecutor>,
        cancel: &CancellationToken,
        mut on_dispatch: F,
    ) -> Result<ScheduleOutcome>
    where
        F: FnMut(&TaskNode),
    {
        let order = graph.order().to_vec();
        let mut nodes = graph.into_nodes();
        let positions: std::collections::HashMap<String, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();

        let mut state = Settled {
            outputs: Vec::new(),
            failures: Vec::new(),
        };
        let mut in_flight: JoinSet<Joined> = JoinSet::new();

        loop {
            if cancel.is_cancelled() {
                break;
            }

            Self::skip_blocked(&mut nodes, &order, &positions);

            for &idx in &order {
                if in_flight.len() >= self.max_parallel {
                    break;
                }
                if nodes[idx].status != TaskStatus::Pending {
                    continue;
                }
                let ready = nodes[idx]
                    .dependencies
                    .iter()
                    .filter_map(|d| positions.get(d))
                    .all(|&d| nodes[d].status == TaskStatus::Done);
                if !ready {
                    continue;
                }

                nodes[idx].status = TaskStatus::Running;
                on_dispatch(&nodes[idx]);
                tracing::info!(
                    task = %nodes[idx].id,
                    agent = ?nodes[idx].agent,
                    "Dispatching task"
                );

                let task = nodes[idx].clone();
                let executor = Arc::clone(&executor);
                in_flight.spawn(async move {
                    let result = AssertUnwindSafe(executor.execute(&task))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| {
                            Err(AppError::Internal(format!("task '{}' panicked", task.id)))
                        });
                    (idx, result)
                });
            }

            if in_flight.is_empty() {
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                joined = in_flight.join_next() => {
                    if let Some(Ok(joined)) = joined {
                        state.settle(&mut nodes, joined);
                    }
                }
            }
        }

        if cancel.is_cancelled() {
            tracing::warn!(
                in_flight = in_flight.len(),
                grace_ms = self.cancel_grace.as_millis() as u64,
                "Run cancelled, draining in-flight tasks"
            );
            let drain = async {
                while let Some(joined) = in_flight.join_next().await {
                    if let Ok(joined) = joined {
                        state.settle(&mut nodes, joined);
                    }
                }
            };
            if tokio::time::timeout(self.cancel_grace, drain).await.is_err() {
                in_flight.abort_all();
            }
            return Err(AppError::Cancelled(format!(
                "{} of {} tasks completed before cancellation",
                nodes.iter().filter(|n| n.status == TaskStatus::Done).count(),
                nodes.len()
            )));
        }

        let rank: std::collections::HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(rank, &idx)| (nodes[idx].id.as_str(), rank))
            .collect();
        state
            .outputs
            .sort_by_key(|(id, _)| rank.get(id.as_str()).copied().unwrap_or(usize::MAX));

        Ok(ScheduleOutcome {
            nodes,
            outputs: state.outputs,
            failures: state.failures,
        })
    }

    /// Mark pending tasks whose dependencies can no longer succeed. Walking
    /// in topological order lets a skip propagate through a chain in one pass.
    fn skip_blocked(
        nodes: &mut [TaskNode],
        order: &[usize],
        positions: &std::collections::HashMap<String, usize>,
    ) {
        for &idx in order {
            if nodes[idx].status != TaskStatus::Pending {
                continue;
            }
            let blocked = nodes[idx]
                .dependencies
                .iter()
                .filter_map(|d| positions.get(d))
                .any(|&d| {
                    matches!(
                        nodes[d].status,
                        TaskStatus::Failed | TaskStatus::SkippedDependencyFailed
                    )
                });
            if blocked {
                tracing::info!(task = %nodes[idx].id, "Skipping task, a dependency failed");
                nodes[idx].status = TaskStatus::SkippedDependencyFailed;
            }
        }
    }
}

struct Settled {
    outputs: Vec<(String, TaskOutput)>,
    failures: Vec<TaskFailure>,
}

impl Settled {
    fn settle(&mut self, nodes: &mut [TaskNode], (idx, result): Joined) {
        let node = &mut nodes[idx];
        match result {
            Ok(output) => {
                tracing::debug!(task = %node.id, "Task completed");
                node.status = TaskStatus::Done;
                self.outputs.push((node.id.clone(), output));
            }
            Err(e) => {
                tracing::warn!(task = %node.id, error = %e, "Task failed");
                node.status = TaskStatus::Failed;
                self.failures.push(TaskFailure {
                    task_id: node.id.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TaskAgent, ToolOutput};
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        fail: Vec<&'static str>,
        delay: Duration,
        started: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(fail: Vec<&'static str>) -> Self {
            Self {
                fail,
                delay: Duration::from_millis(0),
                started: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TaskExecutor for Scripted {
        async fn execute(&self, task: &TaskNode) -> Result<TaskOutput> {
            self.started.lock().push(task.id.clone());
            tokio::time::sleep(self.delay).await;
            if self.fail.contains(&task.id.as_str()) {
                return Err(AppError::Internal(format!("{} broke", task.id)));
            }
            Ok(TaskOutput::Tool(ToolOutput {
                tool: "test".to_string(),
                text: task.description.clone(),
                sources: Vec::new(),
            }))
        }
    }

    /// Sleeps per task and records how many tasks overlapped.
    struct Tracked {
        delays: HashMap<&'static str, u64>,
        running: AtomicUsize,
        peak: AtomicUsize,
        finished: Mutex<Vec<String>>,
    }

    impl Tracked {
        fn new(delays: &[(&'static str, u64)]) -> Self {
            Self {
                delays: delays.iter().copied().collect(),
                running: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                finished: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TaskExecutor for Tracked {
        async fn execute(&self, task: &TaskNode) -> Result<TaskOutput> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let delay = self.delays.get(task.id.as_str()).copied().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            self.finished.lock().push(task.id.clone());
            Ok(TaskOutput::Tool(ToolOutput {
                tool: "test".to_string(),
                text: task.id.clone(),
                sources: Vec::new(),
            }))
        }
    }

    fn node(id: &str) -> TaskNode {
        TaskNode::new(id, id, TaskAgent::Retrieval)
    }

    fn status(outcome: &ScheduleOutcome, id: &str) -> TaskStatus {
        outcome
            .nodes
            .iter()
            .find(|n| n.id == id)
            .map(|n| n.status)
            .unwrap()
    }

    #[tokio::test]
    async fn test_runs_all_tasks_in_dependency_order() {
        let graph = TaskGraph::new(vec![node("c").depends_on("b"), node("a"), node("b")]).unwrap();
        let executor = Arc::new(Scripted::new(vec![]));
        let mut dispatched = Vec::new();
        let outcome = TaskScheduler::new(1, Duration::from_millis(10))
            .run(graph, executor, &CancellationToken::new(), |n| {
                dispatched.push(n.id.clone())
            })
            .await
            .unwrap();

        assert_eq!(dispatched, vec!["a", "b", "c"]);
        assert_eq!(outcome.completed(), 3);
        let ids: Vec<&str> = outcome.outputs.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_failed_dependency_skips_chain() {
        let graph = TaskGraph::new(vec![
            node("a"),
            node("b").depends_on("a"),
            node("c").depends_on("b"),
            node("d"),
        ])
        .unwrap();
        let executor = Arc::new(Scripted::new(vec!["a"]));
        let outcome = TaskScheduler::new(4, Duration::from_millis(10))
            .run(graph, executor.clone(), &CancellationToken::new(), |_| {})
            .await
            .unwrap();

        assert_eq!(status(&outcome, "a"), TaskStatus::Failed);
        assert_eq!(status(&outcome, "b"), TaskStatus::SkippedDependencyFailed);
        assert_eq!(status(&outcome, "c"), TaskStatus::SkippedDependencyFailed);
        assert_eq!(status(&outcome, "d"), TaskStatus::Done);
        assert!(outcome.degraded());
        assert_eq!(outcome.failures.len(), 1);
        let started = executor.started.lock().clone();
        assert!(!started.contains(&"b".to_string()));
    }

    #[tokio::test]
    async fn test_cancel_before_start_dispatches_nothing() {
        let graph = TaskGraph::new(vec![node("a"), node("b")]).unwrap();
        let executor = Arc::new(Scripted::new(vec![]));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = TaskScheduler::new(2, Duration::from_millis(10))
            .run(graph, executor.clone(), &cancel, |_| {})
            .await;
        assert!(matches!(result, Err(AppError::Cancelled(_))));
        assert!(executor.started.lock().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_mid_run_stops_dispatch() {
        let graph = TaskGraph::new(vec![node("a"), node("b").depends_on("a")]).unwrap();
        let executor = Arc::new(Scripted {
            fail: vec![],
            delay: Duration::from_millis(500),
            started: Mutex::new(Vec::new()),
        });
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result = TaskScheduler::new(2, Duration::from_millis(10))
            .run(graph, executor.clone(), &cancel, |_| {})
            .await;
        assert!(matches!(result, Err(AppError::Cancelled(_))));
        assert_eq!(executor.started.lock().clone(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_independent_tasks_overlap_up_to_limit() {
        let graph = TaskGraph::new(vec![node("a"), node("b"), node("c"), node("d")]).unwrap();
        let executor = Arc::new(Tracked::new(&[("a", 300), ("b", 40), ("c", 40), ("d", 40)]));
        let mut dispatched = Vec::new();

        let outcome = TaskScheduler::new(2, Duration::from_millis(10))
            .run(graph, executor.clone(), &CancellationToken::new(), |n| {
                dispatched.push(n.id.clone())
            })
            .await
            .unwrap();

        assert_eq!(outcome.completed(), 4);
        assert_eq!(executor.peak.load(Ordering::SeqCst), 2);
        // start order is kept even though `a` finishes last
        assert_eq!(dispatched, vec!["a", "b", "c", "d"]);
        assert_eq!(executor.finished.lock().last().map(String::as_str), Some("a"));
        let ids: Vec<&str> = outcome.outputs.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_parallelism_never_exceeds_limit() {
        let nodes: Vec<TaskNode> = ["a", "b", "c", "d", "e", "f"].iter().map(|id| node(id)).collect();
        let graph = TaskGraph::new(nodes).unwrap();
        let executor = Arc::new(Tracked::new(&[
            ("a", 30),
            ("b", 30),
            ("c", 30),
            ("d", 30),
            ("e", 30),
            ("f", 30),
        ]));

        TaskScheduler::new(3, Duration::from_millis(10))
            .run(graph, executor.clone(), &CancellationToken::new(), |_| {})
            .await
            .unwrap();

        assert_eq!(executor.peak.load(Ordering::SeqCst), 3);
    }
}
