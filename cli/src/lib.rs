//! Library side of the `stepflow` binary: turn execution, progress display and state files.

pub mod run;

pub use run::display::{format_plan, format_trace, ProgressPrinter};
pub use run::{exit_code, format_reply, load_state, run_turn, save_state, RunError, RunOptions, Turn};
