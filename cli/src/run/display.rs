//! Live progress list and trace formatting for stderr output.
//!
//! [`ProgressPrinter`] turns each [`ProgressEvent`] into the text to write; streamed synthesis
//! tokens are written inline and closed with a newline before the next line.

use stepflow::trace::truncate_for_display;
use stepflow::{ExecutionTrace, ProgressEvent, StepOutline};

/// Indent for details under a step line.
const INDENT: &str = "    ";

/// Longest step output or error shown under a step.
const MAX_DETAIL: usize = 160;

/// Renders progress events as a readable list.
#[derive(Debug, Default)]
pub struct ProgressPrinter {
    verbose: bool,
    total_steps: usize,
    streaming: bool,
}

impl ProgressPrinter {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            ..Self::default()
        }
    }

    /// Text to write for `ev`, including trailing newlines; `None` when nothing is shown.
    pub fn render(&mut self, ev: &ProgressEvent) -> Option<String> {
        if let ProgressEvent::SynthesisToken { content } = ev {
            self.streaming = true;
            return Some(content.clone());
        }
        let line = self.line(ev)?;
        let prefix = if std::mem::take(&mut self.streaming) {
            "\n"
        } else {
            ""
        };
        Some(format!("{}{}\n", prefix, line))
    }

    fn line(&mut self, ev: &ProgressEvent) -> Option<String> {
        match ev {
            ProgressEvent::StageEnter { stage } if self.verbose => Some(format!("· {}", stage)),
            ProgressEvent::StageExit {
                stage,
                ok,
                duration_ms,
            } if self.verbose => Some(format!(
                "· {} {} ({} ms)",
                stage,
                if *ok { "done" } else { "failed" },
                duration_ms
            )),
            ProgressEvent::PlanStart { replan: true, .. } => Some("↻ Replanning...".to_string()),
            ProgressEvent::PlanStart { .. } => Some("Planning...".to_string()),
            ProgressEvent::PlanReady { steps } => {
                self.total_steps = steps.len();
                Some(format_plan(steps))
            }
            ProgressEvent::PlanError { message } => Some(format!("✗ {}", message)),
            ProgressEvent::StepStart {
                index, description, ..
            } => Some(format!(
                "→ [{}/{}] {}",
                index + 1,
                self.total_steps,
                description
            )),
            ProgressEvent::StepSuccess {
                index,
                description,
                output,
                ..
            } => {
                let mut line = format!("✓ [{}/{}] {}", index + 1, self.total_steps, description);
                let output = output.trim();
                if self.verbose && !output.is_empty() {
                    line.push('\n');
                    line.push_str(&indent(&truncate_for_display(output, MAX_DETAIL)));
                }
                Some(line)
            }
            ProgressEvent::StepFailure {
                index,
                description,
                error,
                optional,
                ..
            } => Some(format!(
                "{} [{}/{}] {}{}\n{}",
                if *optional { "○" } else { "✗" },
                index + 1,
                self.total_steps,
                description,
                if *optional { " (optional, skipped)" } else { "" },
                indent(&truncate_for_display(error, MAX_DETAIL))
            )),
            ProgressEvent::Recovery {
                decision,
                detail,
                fast_path,
                ..
            } => Some(format!(
                "↻ recovery: {}{}\n{}",
                decision,
                if *fast_path { " (rule)" } else { "" },
                indent(&truncate_for_display(detail, MAX_DETAIL))
            )),
            _ => None,
        }
    }
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("{}{}", INDENT, line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Numbered plan outline; optional steps are marked.
pub fn format_plan(steps: &[StepOutline]) -> String {
    let mut lines = vec![format!("Plan ({} step(s)):", steps.len())];
    for s in steps {
        lines.push(format!(
            "{}{}. {} [{}]{}",
            INDENT,
            s.index + 1,
            s.description,
            s.skill,
            if s.optional { " (optional)" } else { "" }
        ));
    }
    lines.join("\n")
}

/// One line per stage invocation: order, stage, status, duration and error.
pub fn format_trace(trace: &ExecutionTrace) -> String {
    let mut lines = vec![format!("Trace ({} stage run(s)):", trace.len())];
    for (i, e) in trace.entries().iter().enumerate() {
        let mut line = format!(
            "{}#{} {} {} {} ms",
            INDENT,
            i + 1,
            e.stage,
            if e.ok { "ok" } else { "error" },
            e.duration_ms
        );
        if let Some(err) = &e.error {
            line.push_str(&format!(": {}", truncate_for_display(err, MAX_DETAIL)));
        }
        lines.push(line);
    }
    lines.join("\n")
}
