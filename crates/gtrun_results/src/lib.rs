mod error_message;
mod model;
mod parser;
mod reporter;
mod stats;

pub use error_message::{ErrorMessageParser, ParsedErrorMessage, create_stack_trace_entry};
pub use model::{TestCase, TestOutcome, TestResult};
pub use parser::{CRASH_TEXT, StreamingOutputParser, markers, parse_duration};
pub use reporter::{
    ReportEvent, ResultReporter, ResultSink, TestFrameworkReporter, ThrottleSettings,
};
pub use stats::{DisplayTestResultStats, TestResultStats};
