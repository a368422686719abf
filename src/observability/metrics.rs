//! Console metrics.
//!
//! Prometheus-compatible counters and histograms with label cardinality
//! protection: command labels only ever carry registered keys, everything
//! typed at the prompt that is not registered is bucketed as `__unknown__`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::console::CommandRegistry;
use crate::error::ConsoleError;

/// Guard to prevent double-initialization of the metrics recorder.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Label used for command names that are not registered.
pub const UNKNOWN_LABEL: &str = "__unknown__";

/// Initializes the global metrics recorder.
///
/// When `port` is `Some`, a Prometheus HTTP listener is started on
/// `127.0.0.1:<port>`. When `None`, the recorder is installed without an
/// HTTP endpoint.
///
/// # Errors
///
/// Returns `ConsoleError::Io` if the recorder or HTTP listener cannot be
/// installed (e.g. port already in use).
pub fn init_metrics(port: Option<u16>) -> Result<(), ConsoleError> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        tracing::debug!("metrics already initialized, skipping");
        return Ok(());
    }
    port.map_or_else(
        || PrometheusBuilder::new().install_recorder().map(|_| ()),
        |p| {
            PrometheusBuilder::new()
                .with_http_listener(([127, 0, 0, 1], p))
                .install()
        },
    )
    .map_err(|e| ConsoleError::Io(std::io::Error::other(e.to_string())))?;

    describe_metrics();
    Ok(())
}

fn describe_metrics() {
    describe_counter!("promptline_lines_total", "Total number of input lines read");
    describe_counter!(
        "promptline_commands_total",
        "Total number of dispatched command lines"
    );
    describe_counter!(
        "promptline_dispatch_errors_total",
        "Non-fatal and terminal dispatch errors by kind"
    );
    describe_histogram!(
        "promptline_command_duration_ms",
        "Command handler duration in milliseconds"
    );
}

/// Returns the metrics label for a typed command name.
#[must_use]
pub fn command_label<'a>(registry: &CommandRegistry, name: &'a str) -> &'a str {
    if registry.lookup(name).is_ok() {
        name
    } else {
        UNKNOWN_LABEL
    }
}

/// Records one line read from the input source.
pub fn record_line() {
    counter!("promptline_lines_total").increment(1);
}

/// Records a dispatched command line. `label` comes from [`command_label`].
pub fn record_command(label: &str) {
    counter!("promptline_commands_total", "command" => label.to_owned()).increment(1);
}

/// Records how long a registered command's handler ran.
pub fn record_command_duration(command: &str, duration: Duration) {
    histogram!("promptline_command_duration_ms", "command" => command.to_owned())
        .record(duration.as_secs_f64() * 1000.0);
}

/// Records a dispatch error by kind (see [`ConsoleError::kind`]).
pub fn record_dispatch_error(kind: &'static str) {
    counter!("promptline_dispatch_errors_total", "kind" => kind).increment(1);
}
