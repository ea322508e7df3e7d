//! Plain-text log formatter that prefixes each line with the span path (`run>stage`).
//!
//! Used by `logging::init()` for the rolling log file so lines from one run can be grouped.
//! Interacts with: `tracing_subscriber::fmt::Layer`, `FmtContext`, `FormatEvent`.

use std::fmt;

use tracing_core::Subscriber;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::time::{FormatTime, SystemTime};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;

/// Output format: `TIMESTAMP LEVEL [run#ID>stage] target: fields`.
///
/// `ID` is the root span's id, so every line of one run shares it. Events outside any span
/// have no bracket part.
pub struct TextWithSpanPath {
    timer: SystemTime,
    with_target: bool,
}

impl Default for TextWithSpanPath {
    fn default() -> Self {
        Self {
            timer: SystemTime,
            with_target: true,
        }
    }
}

impl TextWithSpanPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the target (module path) from each line.
    pub fn with_target(mut self, on: bool) -> Self {
        self.with_target = on;
        self
    }
}

impl<S, N> FormatEvent<S, N> for TextWithSpanPath
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing_core::Event<'_>,
    ) -> fmt::Result {
        self.timer.format_time(&mut writer)?;
        write!(writer, " {}", event.metadata().level())?;

        if let Some(scope) = ctx.event_scope() {
            let mut path = Vec::new();
            for (depth, span) in scope.from_root().enumerate() {
                if depth == 0 {
                    path.push(format!("{}#{}", span.name(), span.id().into_u64()));
                } else {
                    path.push(span.name().to_string());
                }
            }
            write!(writer, " [{}]", path.join(">"))?;
        }
        if self.with_target {
            write!(writer, " {}:", event.metadata().target())?;
        }
        write!(writer, " ")?;

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
