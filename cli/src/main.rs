//! Stepflow CLI binary: plan and run a multi-step automation request from the command line.
//!
//! Subcommands: `run` (one request, optionally resuming a saved state or continuing
//! interactively) and `config` (print the resolved settings).

mod log_format;
mod logging;
mod repl;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use cli::{exit_code, format_reply, format_trace, load_state, run_turn, save_state, RunOptions, Turn};
use stepflow::{Outcome, Settings, TaskRunner};

#[derive(Parser, Debug)]
#[command(name = "stepflow")]
#[command(about = "Stepflow: plan, run and recover multi-step automation tasks")]
struct Args {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one request (or answer a saved pending question with --resume)
    Run(RunArgs),
    /// Print the settings resolved from the environment and config files (API key hidden)
    Config,
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// The request, e.g. `stepflow run list the pdf files in ~/Downloads`
    #[arg(trailing_var_arg = true)]
    request: Vec<String>,

    /// Command-execution service URL (default: STEPFLOW_EXECUTOR_URL or http://127.0.0.1:4723)
    #[arg(long, value_name = "URL")]
    executor_url: Option<String>,

    /// Print progress as NDJSON protocol events on stdout, then a reply line
    #[arg(long)]
    json: bool,

    /// Write the final state to this file (to resume after a question)
    #[arg(long, value_name = "PATH")]
    save_state: Option<PathBuf>,

    /// Load a saved state and treat the request text as the reply to its pending question
    #[arg(long, value_name = "PATH")]
    resume: Option<PathBuf>,

    /// Verbose: stage enter/exit, step output previews, debug logs
    #[arg(short, long)]
    verbose: bool,

    /// Print the execution trace after the run
    #[arg(long)]
    trace: bool,

    /// Keep reading replies and follow-up requests from stdin after the first turn
    #[arg(short, long)]
    interactive: bool,
}

fn print_config(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let mut value = serde_json::to_value(settings)?;
    if let Some(llm) = value.get_mut("llm").and_then(|v| v.as_object_mut()) {
        let shown = if settings.llm.api_key.is_some() { "<set>" } else { "<unset>" };
        llm.insert("api_key".to_string(), serde_json::Value::from(shown));
    }
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

async fn run(args: RunArgs, settings: Settings) -> Result<Outcome, Box<dyn std::error::Error>> {
    let settings = match &args.executor_url {
        Some(url) => settings.with_executor_url(url.clone()),
        None => settings,
    };
    let runner = TaskRunner::from_settings(settings, None)?;
    tracing::debug!(backend = %runner.backend().name, "runner ready");
    let opts = RunOptions {
        verbose: args.verbose,
        json: args.json,
    };

    let request = args.request.join(" ");
    let first = match (&args.resume, request.trim().is_empty()) {
        (Some(path), false) => Some(Turn::Continue(Box::new(load_state(path)?), request)),
        (Some(_), true) => return Err("--resume needs the reply text as the request".into()),
        (None, false) => Some(Turn::New(request)),
        (None, true) if args.interactive => None,
        (None, true) => return Err("missing request; try `stepflow run <REQUEST...>`".into()),
    };

    let mut state = None;
    if let Some(turn) = first {
        let finished = run_turn(&runner, turn, &opts).await;
        println!("{}", format_reply(&finished, opts.json));
        if args.trace {
            eprintln!("{}", format_trace(&finished.trace));
        }
        if let Some(path) = &args.save_state {
            save_state(path, &finished)?;
        }
        state = Some(finished);
    }
    if args.interactive {
        state = repl::run_repl_loop(&runner, state, &opts, args.save_state.as_deref()).await?;
    }
    Ok(state.map(|s| s.outcome()).unwrap_or(Outcome::Succeeded))
}

async fn dispatch(cmd: Command) -> Result<i32, Box<dyn std::error::Error>> {
    let settings = Settings::load(None)?;
    match cmd {
        Command::Config => print_config(&settings).map(|_| 0),
        Command::Run(run_args) => Ok(exit_code(run(run_args, settings).await?)),
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let verbose = matches!(&args.cmd, Command::Run(r) if r.verbose);
    let log = logging::init(verbose);

    let code = match dispatch(args.cmd).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            2
        }
    };
    if code != 0 {
        drop(log);
        std::process::exit(code);
    }
}
