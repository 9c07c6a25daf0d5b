use crate::{
    agents::{
        planning::PlanningAgent,
        retrieval::RetrievalAgent,
        router::{CasualKind, IntentClassifier},
        summarization::SummarizationAgent,
        tool_use::ToolUseAgent,
    },
    db::ThoughtPathStore,
    types::{
        AgentName, AgentPath, AppError, DirectRoute, FusedEvidenceSet, Intent, Query, Report,
        Result, RunOutcome, RunState, StateTransition, TaskAgent, TaskNode, TaskOutput,
        TaskStatus, TaskSummary, ThoughtPathRecord, ToolOutput, ToolSource,
    },
    workflows::{TaskExecutor, TaskGraph, TaskScheduler},
};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Mutable state of a single run. Created per call and dropped when the run
/// ends; nothing here outlives the run except what is persisted.
#[derive(Debug)]
pub struct RunContext {
    pub query: Query,
    pub intent: Option<Intent>,
    pub path: AgentPath,
    pub transitions: Vec<StateTransition>,
    pub evidence: Vec<FusedEvidenceSet>,
    pub tool_outputs: Vec<ToolOutput>,
    pub tasks: Vec<TaskNode>,
    pub failed_tasks: usize,
}

impl RunContext {
    pub fn new(query: Query) -> Self {
        Self {
            query,
            intent: None,
            path: AgentPath::new(),
            transitions: Vec::new(),
            evidence: Vec::new(),
            tool_outputs: Vec::new(),
            tasks: Vec::new(),
            failed_tasks: 0,
        }
    }

    pub fn transition(&mut self, state: RunState) {
        tracing::debug!(state = ?state, "State transition");
        self.transitions.push(StateTransition {
            state,
            at: Utc::now(),
        });
    }

    pub fn state(&self) -> Option<RunState> {
        self.transitions.last().map(|t| t.state)
    }

    /// Provenance keys of all collected evidence, first-seen order.
    fn evidence_refs(&self) -> Vec<String> {
        let mut refs: Vec<String> = Vec::new();
        for key in self.evidence.iter().flat_map(|set| set.provenance_keys()) {
            if !refs.contains(&key) {
                refs.push(key);
            }
        }
        refs
    }

    fn tool_sources(&self) -> Vec<ToolSource> {
        self.tool_outputs
            .iter()
            .flat_map(|o| o.sources.iter().cloned())
            .collect()
    }
}

/// Routes scheduled tasks to the agent named on the task.
struct TaskDispatcher {
    tool_use: Arc<ToolUseAgent>,
    retrieval: Arc<RetrievalAgent>,
}

#[async_trait]
impl TaskExecutor for TaskDispatcher {
    async fn execute(&self, task: &TaskNode) -> Result<TaskOutput> {
        match task.agent {
            TaskAgent::ToolUse => self.tool_use.execute(task).await.map(TaskOutput::Tool),
            TaskAgent::Retrieval => self
                .retrieval
                .execute(task)
                .await
                .map(TaskOutput::Evidence),
        }
    }
}

/// Fixed replies for small talk.
pub fn casual_reply(kind: Option<CasualKind>) -> &'static str {
    match kind {
        Some(CasualKind::Greeting) => {
            "Hello! I'm Sage, a research assistant. Ask me a question and I'll dig through the knowledge base and the web for you."
        }
        Some(CasualKind::Farewell) => "Goodbye! Come back any time you have something to research.",
        Some(CasualKind::Thanks) => "You're welcome! Let me know if there's anything else to look into.",
        Some(CasualKind::Acknowledgement) => "Got it. What would you like to research next?",
        Some(CasualKind::AboutAssistant) => {
            "I'm Sage, a research assistant. I plan multi-step questions, search indexed documents and a knowledge graph, call web, Wikipedia and arXiv tools, and write cited reports."
        }
        None => "Hi! What would you like to research?",
    }
}

/// Drives one query through classification, execution and synthesis.
pub struct Orchestrator {
    classifier: IntentClassifier,
    planner: PlanningAgent,
    tool_use: Arc<ToolUseAgent>,
    retrieval: Arc<RetrievalAgent>,
    summarizer: SummarizationAgent,
    history: Arc<dyn ThoughtPathStore>,
    scheduler: TaskScheduler,
}

impl Orchestrator {
    pub fn new(
        planner: PlanningAgent,
        tool_use: Arc<ToolUseAgent>,
        retrieval: Arc<RetrievalAgent>,
        summarizer: SummarizationAgent,
        history: Arc<dyn ThoughtPathStore>,
        scheduler: TaskScheduler,
    ) -> Self {
        Self {
            classifier: IntentClassifier::new(),
            planner,
            tool_use,
            retrieval,
            summarizer,
            history,
            scheduler,
        }
    }

    pub fn with_classifier(mut self, classifier: IntentClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn classifier(&self) -> &IntentClassifier {
        &self.classifier
    }

    pub fn history(&self) -> &Arc<dyn ThoughtPathStore> {
        &self.history
    }

    /// Run a query to a terminal state.
    ///
    /// Returns the report and agent path on success. Failures before a
    /// report exists return the error and persist nothing; a failure to
    /// persist the finished run is reported on the outcome instead.
    #[tracing::instrument(skip(self, query, cancel), fields(session = %query.session_id()))]
    pub async fn run(&self, query: Query, cancel: &CancellationToken) -> Result<RunOutcome> {
        let mut ctx = RunContext::new(query);
        ctx.transition(RunState::Received);
        ctx.path.push(AgentName::Orchestrator, RunState::Received, None);

        match self.drive(&mut ctx, cancel).await {
            Ok(outcome) => {
                ctx.transition(RunState::Success);
                tracing::info!(
                    intent = %outcome.intent,
                    path = %outcome.agent_path,
                    persisted = outcome.record_id.is_some(),
                    "Run finished"
                );
                Ok(outcome)
            }
            Err(e) => {
                ctx.transition(RunState::Failed);
                tracing::warn!(error = %e, path = %ctx.path, "Run failed");
                Err(e)
            }
        }
    }

    async fn drive(&self, ctx: &mut RunContext, cancel: &CancellationToken) -> Result<RunOutcome> {
        Self::check_cancelled(cancel, "before classification")?;
        ctx.transition(RunState::Classifying);
        let intent = self.classifier.classify(ctx.query.text())?;
        ctx.intent = Some(intent);
        tracing::debug!(intent = %intent, "Query classified");

        let report = match intent {
            Intent::Casual => {
                ctx.transition(RunState::CasualReply);
                let kind = self.classifier.casual_kind(ctx.query.text());
                Report::plain(casual_reply(kind))
            }
            Intent::SingleTool(DirectRoute::Summarization) => {
                ctx.transition(RunState::SingleToolDispatch);
                ctx.transition(RunState::Synthesizing);
                ctx.path
                    .push(AgentName::Summarization, RunState::Synthesizing, None);
                self.summarizer.summarize_text(ctx.query.text()).await?
            }
            Intent::SingleTool(route) => {
                ctx.transition(RunState::SingleToolDispatch);
                let agent = match route {
                    DirectRoute::Retrieval => TaskAgent::Retrieval,
                    _ => TaskAgent::ToolUse,
                };
                let graph =
                    TaskGraph::new(vec![TaskNode::new("t1", ctx.query.text().trim(), agent)])?;
                self.execute(ctx, graph, cancel).await?;
                self.synthesize(ctx, cancel).await?
            }
            Intent::MultiStepResearch => {
                ctx.transition(RunState::PlanningHandoff);
                ctx.path
                    .push(AgentName::Planning, RunState::PlanningHandoff, None);
                let graph = self.planner.plan(ctx.query.text()).await?;
                tracing::debug!(tasks = graph.len(), "Plan ready");
                self.execute(ctx, graph, cancel).await?;
                self.synthesize(ctx, cancel).await?
            }
        };

        Self::check_cancelled(cancel, "before persistence")?;
        Ok(self.persist(ctx, intent, report).await)
    }

    async fn execute(
        &self,
        ctx: &mut RunContext,
        graph: TaskGraph,
        cancel: &CancellationToken,
    ) -> Result<()> {
        Self::check_cancelled(cancel, "before execution")?;
        ctx.transition(RunState::Executing);

        let executor: Arc<dyn TaskExecutor> = Arc::new(TaskDispatcher {
            tool_use: Arc::clone(&self.tool_use),
            retrieval: Arc::clone(&self.retrieval),
        });
        let path = &mut ctx.path;
        let outcome = self
            .scheduler
            .run(graph, executor, cancel, |node| {
                path.push(
                    AgentName::from(node.agent),
                    RunState::Executing,
                    Some(node.id.clone()),
                )
            })
            .await?;

        ctx.failed_tasks = outcome
            .nodes
            .iter()
            .filter(|n| {
                matches!(
                    n.status,
                    TaskStatus::Failed | TaskStatus::SkippedDependencyFailed
                )
            })
            .count();

        if outcome.completed() == 0 {
            let reasons: Vec<String> = outcome
                .failures
                .iter()
                .map(|f| format!("{}: {}", f.task_id, f.reason))
                .collect();
            ctx.tasks = outcome.nodes;
            return Err(AppError::ExecutionFailed(format!(
                "no task completed ({})",
                reasons.join("; ")
            )));
        }

        for (_, output) in outcome.outputs {
            match output {
                TaskOutput::Evidence(set) => ctx.evidence.push(set),
                TaskOutput::Tool(tool) => ctx.tool_outputs.push(tool),
            }
        }
        ctx.tasks = outcome.nodes;
        Ok(())
    }

    async fn synthesize(&self, ctx: &mut RunContext, cancel: &CancellationToken) -> Result<Report> {
        Self::check_cancelled(cancel, "before synthesis")?;
        ctx.transition(RunState::Synthesizing);
        ctx.path
            .push(AgentName::Summarization, RunState::Synthesizing, None);
        self.summarizer
            .summarize(
                ctx.query.text(),
                &ctx.evidence,
                &ctx.tool_outputs,
                ctx.failed_tasks,
            )
            .await
    }

    /// Store the thought path. A storage failure is logged and surfaced on
    /// the outcome; the report is still returned.
    async fn persist(&self, ctx: &mut RunContext, intent: Intent, report: Report) -> RunOutcome {
        let record = ThoughtPathRecord {
            id: Uuid::new_v4().to_string(),
            session_id: ctx.query.session_id().to_string(),
            query: ctx.query.text().to_string(),
            intent,
            agent_path: ctx.path.clone(),
            transitions: ctx.transitions.clone(),
            tasks: ctx.tasks.iter().map(TaskSummary::from).collect(),
            evidence_refs: ctx.evidence_refs(),
            tool_sources: ctx.tool_sources(),
            report: report.text.clone(),
            partial: report.partial,
            created_at: Utc::now(),
        };

        let (record_id, persistence_error) = match self.history.append(&record).await {
            Ok(id) => {
                ctx.transition(RunState::Persisted);
                (Some(id), None)
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    store = self.history.provider_name(),
                    "Failed to persist thought path"
                );
                (None, Some(e.to_string()))
            }
        };

        RunOutcome {
            record_id,
            intent,
            report,
            agent_path: ctx.path.clone(),
            tasks: ctx.tasks.clone(),
            persistence_error,
        }
    }

    fn check_cancelled(cancel: &CancellationToken, stage: &str) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled(format!("cancelled {}", stage)));
        }
        Ok(())
    }
}
