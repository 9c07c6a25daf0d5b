//! Colored output helpers for the CLI
//!
//! Consistent terminal rendering for reports, thought paths and history.

use crate::types::{
    AgentPath, RunOutcome, SessionSummary, TaskNode, TaskStatus, ThoughtPathRecord,
};
use owo_colors::OwoColorize;

/// Output style configuration
pub struct Output {
    /// Whether to use colored output
    pub colored: bool,
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

impl Output {
    pub fn new() -> Self {
        Self { colored: true }
    }

    pub fn no_color() -> Self {
        Self { colored: false }
    }

    pub fn banner(&self) {
        let version = format!("v{}", env!("CARGO_PKG_VERSION"));
        if self.colored {
            println!(
                "\n  {} {} {}\n",
                "SAGE".bright_cyan().bold(),
                "research assistant".bright_white(),
                version.dimmed()
            );
        } else {
            println!("\n  SAGE research assistant {}\n", version);
        }
    }

    pub fn success(&self, message: &str) {
        if self.colored {
            println!("  {} {}", "✓".green().bold(), message.green());
        } else {
            println!("  [OK] {}", message);
        }
    }

    pub fn info(&self, message: &str) {
        if self.colored {
            println!("  {} {}", "•".blue(), message);
        } else {
            println!("  [INFO] {}", message);
        }
    }

    pub fn warning(&self, message: &str) {
        if self.colored {
            println!("  {} {}", "⚠".yellow().bold(), message.yellow());
        } else {
            println!("  [WARN] {}", message);
        }
    }

    pub fn error(&self, message: &str) {
        if self.colored {
            eprintln!("  {} {}", "✗".red().bold(), message.red());
        } else {
            eprintln!("  [ERROR] {}", message);
        }
    }

    /// Print a step message (for multi-step operations)
    pub fn step(&self, step_num: usize, total: usize, message: &str) {
        if self.colored {
            println!(
                "  {} {}",
                format!("[{}/{}]", step_num, total).dimmed(),
                message.bright_white()
            );
        } else {
            println!("  [{}/{}] {}", step_num, total, message);
        }
    }

    pub fn header(&self, title: &str) {
        if self.colored {
            println!("\n  {}", title.bright_white().bold().underline());
        } else {
            println!("\n  === {} ===", title);
        }
    }

    pub fn subheader(&self, title: &str) {
        if self.colored {
            println!("\n  {}", title.cyan().bold());
        } else {
            println!("\n  --- {} ---", title);
        }
    }

    pub fn kv(&self, key: &str, value: &str) {
        if self.colored {
            println!("    {}: {}", key.dimmed(), value.bright_white());
        } else {
            println!("    {}: {}", key, value);
        }
    }

    pub fn list_item(&self, item: &str) {
        if self.colored {
            println!("    {} {}", "•".blue(), item);
        } else {
            println!("    - {}", item);
        }
    }

    pub fn hint(&self, message: &str) {
        if self.colored {
            println!("\n  {}", message.dimmed().italic());
        } else {
            println!("\n  [TIP] {}", message);
        }
    }

    pub fn table_header(&self, columns: &[&str]) {
        let header = Self::row_text(columns);
        if self.colored {
            println!("    {}", header.bright_white().bold());
            println!("    {}", "─".repeat(columns.len() * 16).dimmed());
        } else {
            println!("    {}", header);
            println!("    {}", "-".repeat(columns.len() * 16));
        }
    }

    pub fn table_row(&self, values: &[&str]) {
        println!("    {}", Self::row_text(values));
    }

    fn row_text(values: &[&str]) -> String {
        values
            .iter()
            .map(|v| format!("{:<15}", v))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn newline(&self) {
        println!();
    }

    /// Agent path as `orchestrator -> planning -> ...`.
    pub fn agent_path(&self, path: &AgentPath) {
        let names: Vec<String> = path
            .steps()
            .iter()
            .map(|step| match &step.task_id {
                Some(task) => format!("{}({})", step.agent, task),
                None => step.agent.to_string(),
            })
            .collect();
        let joined = names.join(" -> ");
        if self.colored {
            println!("    {} {}", "path:".dimmed(), joined.bright_cyan());
        } else {
            println!("    path: {}", joined);
        }
    }

    pub fn tasks(&self, tasks: &[TaskNode]) {
        for task in tasks {
            let status = match task.status {
                TaskStatus::Done => "done",
                TaskStatus::Failed => "failed",
                TaskStatus::SkippedDependencyFailed => "skipped",
                TaskStatus::Running => "running",
                TaskStatus::Pending => "pending",
            };
            let deps = if task.dependencies.is_empty() {
                String::new()
            } else {
                format!(" (after {})", task.dependencies.join(", "))
            };
            let line = format!(
                "{} [{}] {}{} -> {}",
                task.id,
                crate::types::AgentName::from(task.agent),
                task.description,
                deps,
                status
            );
            if self.colored {
                match task.status {
                    TaskStatus::Done => println!("    {} {}", "✓".green(), line),
                    TaskStatus::Failed => println!("    {} {}", "✗".red(), line.red()),
                    _ => println!("    {} {}", "○".yellow(), line.yellow()),
                }
            } else {
                println!("    - {}", line);
            }
        }
    }

    /// Print a finished run.
    pub fn report(&self, outcome: &RunOutcome, trace: bool) {
        println!();
        for line in outcome.report.text.lines() {
            println!("  {}", line);
        }

        if trace {
            self.subheader("Trace");
            self.kv("intent", &outcome.intent.to_string());
            self.agent_path(&outcome.agent_path);
            if !outcome.tasks.is_empty() {
                self.tasks(&outcome.tasks);
            }
        }

        if outcome.report.partial {
            self.warning("Some evidence was unavailable; the report is partial");
        }
        match (&outcome.record_id, &outcome.persistence_error) {
            (_, Some(error)) => self.warning(&format!("Run was not saved to history: {}", error)),
            (Some(id), None) if trace => self.info(&format!("Saved as {}", id)),
            _ => {}
        }
    }

    pub fn record(&self, index: usize, record: &ThoughtPathRecord) {
        let when = record.created_at.format("%Y-%m-%d %H:%M:%S").to_string();
        if self.colored {
            println!(
                "\n  {} {} {}",
                format!("#{}", index).bright_white().bold(),
                record.query.bright_white(),
                when.dimmed()
            );
        } else {
            println!("\n  #{} {} ({})", index, record.query, when);
        }
        self.kv("intent", &record.intent.to_string());
        self.agent_path(&record.agent_path);
        if !record.evidence_refs.is_empty() {
            self.kv("evidence", &record.evidence_refs.join(", "));
        }
        if record.partial {
            self.kv("partial", "yes");
        }
    }

    pub fn sessions(&self, sessions: &[SessionSummary]) {
        self.table_header(&["Session", "Runs", "Last activity", "First query"]);
        for s in sessions {
            let runs = s.runs.to_string();
            let last = s.last_activity.format("%Y-%m-%d %H:%M").to_string();
            let first: String = s.first_query.chars().take(40).collect();
            self.table_row(&[&s.session_id, &runs, &last, &first]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AgentName, Intent, Report, RunState, TaskAgent};

    fn outcome() -> RunOutcome {
        let mut path = AgentPath::new();
        path.push(AgentName::Orchestrator, RunState::Received, None);
        path.push(AgentName::Retrieval, RunState::Executing, Some("t1".to_string()));
        let mut task = TaskNode::new("t1", "RNN architectures", TaskAgent::Retrieval);
        task.status = TaskStatus::Done;
        RunOutcome {
            record_id: Some("r1".to_string()),
            intent: Intent::MultiStepResearch,
            report: Report::plain("Findings\n- RNNs are recurrent [1]"),
            agent_path: path,
            tasks: vec![task],
            persistence_error: Some("disk full".to_string()),
        }
    }

    #[test]
    fn test_output_constructors() {
        assert!(Output::new().colored);
        assert!(!Output::no_color().colored);
        assert!(Output::default().colored);
    }

    #[test]
    fn test_row_text_pads_columns() {
        assert_eq!(Output::row_text(&["a", "b"]), format!("{:<15} {:<15}", "a", "b"));
        assert_eq!(Output::row_text(&[]), "");
    }

    #[test]
    fn test_render_methods_no_panic() {
        for output in [Output::new(), Output::no_color()] {
            output.banner();
            output.success("ok");
            output.info("info");
            output.warning("warn");
            output.error("err");
            output.step(1, 2, "step");
            output.header("Header");
            output.kv("k", "v");
            output.list_item("item");
            output.hint("hint");
            output.report(&outcome(), true);
            output.sessions(&[]);
        }
    }
}
