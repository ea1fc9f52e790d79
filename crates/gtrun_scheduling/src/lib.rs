mod durations;
mod splitter;

pub use durations::{DURATIONS_FILE_EXTENSION, DurationsError, TestDurationStore};
pub use splitter::{DurationBasedTestsSplitter, NumberBasedTestsSplitter, TestsSplitter};
