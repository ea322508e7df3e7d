//! Interactive loop: read stdin, run or continue the task, print the reply, repeat until EOF
//! or quit.
//!
//! Used when `-i/--interactive` is passed. Each line answers the pending question of the
//! previous turn, or is a follow-up request in the same conversation.

use std::io::Write;
use std::path::Path;

use tokio::io::{AsyncBufReadExt, BufReader};

use cli::{format_reply, run_turn, save_state, RunOptions, Turn};
use stepflow::{TaskRunner, WorkflowState};

fn is_quit_command(s: &str) -> bool {
    let lower = s.trim().to_lowercase();
    matches!(lower.as_str(), "quit" | "exit" | "/quit")
}

/// Next turn for `line` given the previous state, if any.
fn next_turn(previous: Option<WorkflowState>, line: String) -> Turn {
    match previous {
        Some(state) => Turn::Continue(Box::new(state), line),
        None => Turn::New(line),
    }
}

/// Runs the loop starting from `state` (the result of an earlier turn, if any).
///
/// Exits on EOF (Ctrl+D) or `quit`/`exit`/`/quit`; empty lines are skipped. Returns the last
/// state so the caller can save it.
pub async fn run_repl_loop(
    runner: &TaskRunner,
    mut state: Option<WorkflowState>,
    opts: &RunOptions,
    save_path: Option<&Path>,
) -> Result<Option<WorkflowState>, Box<dyn std::error::Error>> {
    let mut reader = BufReader::new(tokio::io::stdin()).lines();

    loop {
        eprint!("> ");
        std::io::stderr().flush()?;

        let line = match reader.next_line().await? {
            None => break,
            Some(s) if s.trim().is_empty() => continue,
            Some(s) if is_quit_command(&s) => break,
            Some(s) => s,
        };

        let finished = run_turn(runner, next_turn(state.take(), line), opts).await;
        println!("{}", format_reply(&finished, opts.json));
        if let Some(path) = save_path {
            if let Err(e) = save_state(path, &finished) {
                eprintln!("error: {}", e);
            }
        }
        state = Some(finished);
    }

    eprintln!("Bye.");
    Ok(state)
}
