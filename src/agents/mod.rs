//! Research agents.
//!
//! The [`Orchestrator`] owns a run. It classifies the query with the
//! [`IntentClassifier`], hands multi-step questions to the [`PlanningAgent`],
//! schedules the resulting tasks onto the [`ToolUseAgent`] and
//! [`RetrievalAgent`], and has the [`SummarizationAgent`] write the cited
//! report. Agents never call each other directly.

pub mod orchestrator;
pub mod planning;
pub mod retrieval;
pub mod router;
pub mod summarization;
pub mod tool_use;

pub use orchestrator::{Orchestrator, RunContext};
pub use planning::PlanningAgent;
pub use retrieval::RetrievalAgent;
pub use router::{CasualKind, IntentClassifier};
pub use summarization::SummarizationAgent;
pub use tool_use::ToolUseAgent;
