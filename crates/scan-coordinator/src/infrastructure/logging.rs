//! Global tracing subscriber: human-readable logs on stderr, and the
//! `metrics` target routed verbatim to a rolling metrics file.

use std::fmt;
use std::path::Path;

use anyhow::Context;
use tracing::field::Field;
use tracing::field::Visit;
use tracing::Event;
use tracing::Subscriber;
use tracing_appender::non_blocking::NonBlocking;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::filter;
use tracing_subscriber::filter::FilterExt;
use tracing_subscriber::fmt::format;
use tracing_subscriber::fmt::layer;
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::fmt::FormatEvent;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;

pub const METRICS_TARGET: &str = "metrics";

/// Writes only the recorded field values, so a pre-encoded metrics line
/// lands in the file unchanged.
struct RawLineFormatter;

struct FieldVisitor {
    msg: String,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, _: &Field, value: &str) {
        self.msg.push_str(value);
    }

    fn record_debug(&mut self, _: &Field, value: &dyn fmt::Debug) {
        self.msg.push_str(&format!("{value:?}"));
    }
}

impl<S, N> FormatEvent<S, N> for RawLineFormatter
where
    S: Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut visitor = FieldVisitor { msg: String::new() };
        event.record(&mut visitor);
        write!(writer, "{}", visitor.msg)
    }
}

/// Non-blocking writer to the rolling metrics file, or nothing when metrics
/// are disabled.
fn metrics_output(
    metrics_file: Option<&Path>,
) -> anyhow::Result<(Option<NonBlocking>, Option<WorkerGuard>)> {
    let Some(metrics_file) = metrics_file else {
        return Ok((None, None));
    };
    let directory = metrics_file
        .parent()
        .context("metrics file has no parent directory")?;
    let file_name = metrics_file
        .file_name()
        .and_then(|name| name.to_str())
        .context("metrics file has no valid file name")?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(file_name)
        .max_log_files(3)
        .build(directory)
        .context("failed to create rolling metrics file appender")?;
    let (file_writer, file_guard) = tracing_appender::non_blocking(appender);
    Ok((Some(file_writer), Some(file_guard)))
}

/// Install the global subscriber. When `metrics_file` is set, the returned
/// guard must be held for the lifetime of the process to keep the metrics
/// file writer flushing.
pub fn init(metrics_file: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let env_filter = filter::EnvFilter::builder()
        .with_default_directive(filter::LevelFilter::INFO.into())
        .from_env_lossy();

    let fmt_layer = layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(env_filter.and(filter::filter_fn(|metadata| {
            metadata.target() != METRICS_TARGET
        })));

    let (file_writer, file_guard) = metrics_output(metrics_file)?;
    let metrics_layer = file_writer.map(|writer| {
        layer()
            .event_format(RawLineFormatter)
            .fmt_fields(format::DefaultFields::new())
            .with_writer(writer)
            .with_ansi(false)
            .with_filter(filter::filter_fn(|metadata| {
                metadata.target() == METRICS_TARGET
            }))
    });

    registry().with(fmt_layer).with(metrics_layer).try_init()?;
    Ok(file_guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_metrics_open_no_file() {
        let (writer, guard) = metrics_output(None).unwrap();

        assert!(writer.is_none());
        assert!(guard.is_none());
    }

    #[test]
    fn metrics_file_needs_a_file_name() {
        let err = metrics_output(Some(Path::new("/"))).unwrap_err();

        assert!(err.to_string().contains("metrics file"), "{err}");
    }

    #[test]
    fn metrics_file_directory_is_created() {
        let directory = std::env::temp_dir().join(format!(
            "scan-coordinator-metrics-{}",
            std::process::id()
        ));
        let (writer, guard) = metrics_output(Some(&directory.join("metrics.log"))).unwrap();

        assert!(writer.is_some());
        assert!(guard.is_some());
        assert!(directory.is_dir());
        drop(guard);
        let _ = std::fs::remove_dir_all(directory);
    }
}
