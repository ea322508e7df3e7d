//! One turn of the CLI: run or resume a request, stream its progress, return the final state.

pub mod display;

use std::path::{Path, PathBuf};

use serde_json::json;
use stepflow::{to_protocol_value, EnvelopeState, Outcome, ProgressWriter, TaskRunner, WorkflowState};
use thiserror::Error;
use tokio_stream::StreamExt;

use display::ProgressPrinter;

#[derive(Error, Debug)]
pub enum RunError {
    #[error("config: {0}")]
    Config(#[from] config::LoadError),
    #[error(transparent)]
    Flow(#[from] stepflow::FlowError),
    #[error("state file {path}: {source}")]
    StateIo {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("state file {path}: {source}")]
    StateJson {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// How a turn reports progress.
#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    /// Stage enter/exit lines and step output previews.
    pub verbose: bool,
    /// NDJSON protocol events on stdout instead of the progress list on stderr.
    pub json: bool,
}

/// What the next turn does.
#[derive(Debug)]
pub enum Turn {
    /// A new request with no history.
    New(String),
    /// The user's next message for an earlier state: an answer to its pending question,
    /// or a follow-up request.
    Continue(Box<WorkflowState>, String),
}

fn session_id() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("session-{}", nanos)
}

/// Runs one turn; progress is written while the workflow runs.
pub async fn run_turn(runner: &TaskRunner, turn: Turn, opts: &RunOptions) -> WorkflowState {
    let (writer, mut events) = ProgressWriter::channel();
    let RunOptions { verbose, json } = opts.clone();
    let session = session_id();
    let consumer = tokio::spawn(async move {
        let mut printer = ProgressPrinter::new(verbose);
        let mut envelope = EnvelopeState::new(session);
        while let Some(ev) = events.next().await {
            if json {
                match to_protocol_value(&ev, &mut envelope) {
                    Ok(value) => println!("{}", value),
                    Err(e) => tracing::warn!(error = %e, "event serialization failed"),
                }
            } else if let Some(text) = printer.render(&ev) {
                eprint!("{}", text);
            }
        }
    });

    let state = match turn {
        Turn::New(request) => runner.run(request, vec![], writer).await,
        Turn::Continue(state, reply) => runner.resume(*state, reply, writer).await,
    };
    if let Err(e) = consumer.await {
        tracing::warn!(error = %e, "progress printer stopped");
    }
    state
}

/// Final answer line(s) for a finished turn.
pub fn format_reply(state: &WorkflowState, json: bool) -> String {
    let outcome = state.outcome();
    let answer = state.final_answer.clone().unwrap_or_default();
    if json {
        return json!({
            "type": "reply",
            "outcome": outcome.as_str(),
            "reply": answer,
            "options": state.pending_question.as_ref().map(|q| q.options.clone()),
        })
        .to_string();
    }
    match outcome {
        Outcome::AwaitingUser => format!("? {}", answer),
        _ => answer,
    }
}

/// Process exit code for an outcome: 1 only when the run failed.
pub fn exit_code(outcome: Outcome) -> i32 {
    match outcome {
        Outcome::Failed => 1,
        Outcome::Succeeded | Outcome::AwaitingUser => 0,
    }
}

pub fn load_state(path: &Path) -> Result<WorkflowState, RunError> {
    let text = std::fs::read_to_string(path).map_err(|source| RunError::StateIo {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| RunError::StateJson {
        path: path.to_path_buf(),
        source,
    })
}

pub fn save_state(path: &Path, state: &WorkflowState) -> Result<(), RunError> {
    let text = serde_json::to_string_pretty(state).map_err(|source| RunError::StateJson {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, text).map_err(|source| RunError::StateIo {
        path: path.to_path_buf(),
        source,
    })
}
