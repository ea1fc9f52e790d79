use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod color;
pub mod time;
mod verbosity;

pub use color::{TerminalColor, set_colored_override};
pub use verbosity::{Verbosity, VerbosityLevel};

/// Environment variable that overrides the filter derived from `-v` flags.
pub const GTRUN_LOG: &str = "GTRUN_LOG";

/// Installs the global tracing subscriber for the given verbosity.
///
/// Logs always go to stderr so that stdout stays reserved for test results.
/// `GTRUN_LOG` takes precedence over the verbosity level when it is set to a
/// valid filter directive. Calling this more than once is harmless: only the
/// first subscriber is kept.
pub fn setup_tracing(level: VerbosityLevel) {
    let filter = EnvFilter::try_from_env(GTRUN_LOG)
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.level_filter().into()));

    let registry = tracing_subscriber::registry().with(filter);

    let result = if level.is_trace() {
        registry
            .with(
                tracing_tree::HierarchicalLayer::default()
                    .with_indent_lines(true)
                    .with_indent_amount(2)
                    .with_bracketed_fields(true)
                    .with_thread_ids(true)
                    .with_targets(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(level >= VerbosityLevel::ExtraVerbose)
                    .with_thread_names(level >= VerbosityLevel::ExtraVerbose)
                    .without_time()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };

    if let Err(err) = result {
        tracing::debug!("Tracing subscriber already installed: {err}");
    }
}
