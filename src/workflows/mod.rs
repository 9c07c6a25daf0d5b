//! Task planning and execution.
//!
//! A research query is decomposed into a [`TaskGraph`]: a validated DAG of
//! [`TaskNode`](crate::types::TaskNode)s, each owned by one sub-agent. The
//! [`TaskScheduler`] then runs the graph as a work queue, dispatching every
//! task whose dependencies are done and skipping the dependents of failures.
//!
//! ```ignore
//! let graph = TaskGraph::new(vec![
//!     TaskNode::new("t1", "transformer architectures", TaskAgent::Retrieval),
//!     TaskNode::new("t2", "RNN architectures", TaskAgent::Retrieval),
//! ])?;
//! let outcome = TaskScheduler::new(4, Duration::from_secs(2))
//!     .run(graph, executor, &cancel, |task| println!("started {}", task.id))
//!     .await?;
//! ```

pub mod engine;
pub mod plan;

pub use engine::{ScheduleOutcome, TaskExecutor, TaskFailure, TaskScheduler};
pub use plan::TaskGraph;
