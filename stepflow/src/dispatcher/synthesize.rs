//! The `synthesize` step: an LLM answer over earlier step outputs, run inline.
//!
//! The answer is always written to an ephemeral file under the temp directory and, when the
//! step names `save_to`, to that path as well. Both paths and the answer become substitution
//! variables for later steps.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::graph::RunContext;
use crate::llm::{GenerateOptions, LlmBackend, TokenChunk};
use crate::progress::ProgressEvent;
use crate::state::{SkillStep, StepResult, WorkflowState};
use crate::trace::truncate_for_display;

/// Variable holding the latest synthesis text.
pub const VAR_ANSWER: &str = "synthesisAnswer";
/// Variable holding the ephemeral file path.
pub const VAR_PATH: &str = "synthesisPath";
/// Variable holding the caller-requested path, when one was written.
pub const VAR_SAVED_PATH: &str = "synthesisSavedPath";

/// Characters of each prior output handed to the LLM.
const MAX_INPUT_CHARS: usize = 4000;

/// System prompt for the synthesize step.
pub const SYNTHESIZE_SYSTEM: &str = r#"You write the final answer of an automation task for the user.
You get the user's request, an instruction, and the outputs of the steps that already ran.
Rules:
- Answer only from the step outputs; do not invent facts that are not there.
- Be concise and well structured; use short lists where they help.
- If the outputs do not contain what was asked, say so plainly."#;

/// Synthesis output.
#[derive(Debug)]
pub struct Synthesis {
    pub result: StepResult,
    /// `(name, value)` substitution variables to set; empty on failure.
    pub vars: Vec<(String, String)>,
}

/// Runs one synthesize step at `index`.
pub async fn run_synthesis(
    llm: &Arc<dyn LlmBackend>,
    state: &WorkflowState,
    step: &SkillStep,
    index: usize,
    ctx: &RunContext,
) -> Synthesis {
    let started = Instant::now();
    if !llm.is_available() {
        return failed(index, step, "no language model is available for synthesis", started);
    }

    let instruction = step
        .arg_str("instruction")
        .or_else(|| step.arg_str("prompt"))
        .unwrap_or("Summarize the results for the user.");
    let outputs: Vec<Value> = state
        .skill_results
        .iter()
        .filter(|r| r.ok)
        .map(|r| {
            json!({
                "step": r.step_index,
                "skill": r.skill,
                "description": r.description,
                "output": truncate_for_display(&r.output_text(), MAX_INPUT_CHARS),
            })
        })
        .collect();
    let payload = json!({ "request": state.request, "outputs": outputs });
    let options = GenerateOptions::default()
        .with_system(SYNTHESIZE_SYSTEM)
        .with_temperature(0.3);

    let (tx, mut rx) = mpsc::channel::<TokenChunk>(64);
    let generate = llm.generate_answer(instruction, &payload, &options, Some(tx));
    let forward = async {
        while let Some(chunk) = rx.recv().await {
            ctx.emit(ProgressEvent::SynthesisToken {
                content: chunk.content,
            });
        }
    };
    let (answer, ()) = tokio::join!(generate, forward);
    let answer = match answer {
        Ok(text) => text.trim().to_string(),
        Err(e) => return failed(index, step, &format!("synthesis failed: {}", e), started),
    };

    let mut vars = vec![(VAR_ANSWER.to_string(), answer.clone())];
    let ephemeral = ephemeral_path(&ctx.run_id, index);
    let ephemeral = match write_file(&ephemeral, &answer).await {
        Ok(()) => {
            vars.push((VAR_PATH.to_string(), ephemeral.display().to_string()));
            Some(ephemeral)
        }
        Err(e) => {
            tracing::warn!(path = %ephemeral.display(), error = %e, "could not write synthesis file");
            None
        }
    };

    let mut saved = None;
    if let Some(target) = step.arg_str("save_to").filter(|s| !s.trim().is_empty()) {
        let target = expand_home(target.trim());
        if let Err(e) = write_file(&target, &answer).await {
            return failed(
                index,
                step,
                &format!("failed to save synthesis to {}: {}", target.display(), e),
                started,
            );
        }
        vars.push((VAR_SAVED_PATH.to_string(), target.display().to_string()));
        saved = Some(target);
    }

    let result = StepResult {
        step_index: index,
        skill: step.skill,
        args: step.args.clone(),
        description: step.description.clone(),
        ok: true,
        stdout: answer,
        stderr: String::new(),
        exit_code: None,
        result: Some(json!({
            "path": ephemeral.map(|p| p.display().to_string()),
            "saved_path": saved.map(|p| p.display().to_string()),
        })),
        url: None,
        error: None,
        execution_time_ms: started.elapsed().as_millis() as u64,
    };
    Synthesis { result, vars }
}

fn failed(index: usize, step: &SkillStep, error: &str, started: Instant) -> Synthesis {
    let mut result = StepResult::failure(index, step, error);
    result.execution_time_ms = started.elapsed().as_millis() as u64;
    Synthesis {
        result,
        vars: Vec::new(),
    }
}

/// `<temp>/stepflow/synthesis-<run>-<index>.md`
pub fn ephemeral_path(run_id: &str, index: usize) -> PathBuf {
    std::env::temp_dir()
        .join("stepflow")
        .join(format!("synthesis-{}-{}.md", run_id, index))
}

/// Expands a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    let rest = if path == "~" {
        Some("")
    } else {
        path.strip_prefix("~/")
    };
    match (rest, dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

async fn write_file(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await
}
