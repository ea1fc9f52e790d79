use std::sync::LazyLock;

use regex::{Captures, Regex};

const FILE: &str = r"((?:[a-zA-Z]:)?[^\n:()]+)";
const LINE: &str = r"([0-9]+)";
const ERROR: &str = r"(?:error: |Failure\n)";

fn file_and_line() -> String {
    format!(r"{FILE}(?::{LINE}|\({LINE}\):)")
}

static SPLIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?mi)^{}:? {ERROR}", file_and_line())).unwrap());

static PARSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?i)^{}(?::? {ERROR})?", file_and_line())).unwrap());

static SCOPED_TRACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?i){FILE}(?::{LINE}|\({LINE}\)): (.*)")).unwrap());

static SCOPED_TRACE_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Google Test trace:\s*").unwrap());

static CALL_STACK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^(.*)[\r\n]+call stack:\s*(.*)$").unwrap());

/// One line of the textual stack trace attached to a failed result.
pub fn create_stack_trace_entry(label: &str, file: &str, line: &str) -> String {
    format!("at {label} in {file}:line {line}\n")
}

/// Error message and stack trace extracted from the output of a failed test.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedErrorMessage {
    pub message: String,
    pub stack_trace: String,
}

/// Splits the console output of a failed test into its individual assertion
/// failures and turns their `file:line` locations into stack trace entries.
///
/// Understands both the gcc style (`foo.cc:12: Failure`) and the MSVC style
/// (`foo.cc(12): error: `) failure headers, `SCOPED_TRACE` blocks and
/// `call stack:` sections.
#[derive(Debug)]
pub struct ErrorMessageParser {
    failures: Vec<String>,
    output_before_first_failure: String,
}

impl ErrorMessageParser {
    pub fn new(console_output: &str) -> Self {
        let mut parser = Self {
            failures: Vec::new(),
            output_before_first_failure: String::new(),
        };
        parser.split(console_output);
        parser
    }

    fn split(&mut self, output: &str) {
        if output.is_empty() {
            return;
        }

        let starts: Vec<usize> = SPLIT_RE.find_iter(output).map(|m| m.start()).collect();
        let Some(&first) = starts.first() else {
            self.failures.push(output.to_string());
            return;
        };

        self.output_before_first_failure = output[..first].to_string();

        for (index, &start) in starts.iter().enumerate() {
            let end = starts.get(index + 1).copied().unwrap_or(output.len());
            self.failures.push(output[start..end].to_string());
        }
    }

    pub fn parse(self) -> ParsedErrorMessage {
        let mut parsed = match self.failures.as_slice() {
            [] => ParsedErrorMessage::default(),
            [single] => parse_failure(single, None),
            multiple => {
                let mut messages = Vec::with_capacity(multiple.len());
                let mut stack_trace = String::new();
                for (index, failure) in multiple.iter().enumerate() {
                    let id = index + 1;
                    let parsed = parse_failure(failure, Some(id));
                    messages.push(format!("#{id} - {}", parsed.message));
                    stack_trace.push_str(&parsed.stack_trace);
                }
                ParsedErrorMessage {
                    message: messages.join("\n"),
                    stack_trace,
                }
            }
        };

        let mut prefix = self.output_before_first_failure;
        if !prefix.is_empty() {
            if !prefix.ends_with('\n') {
                prefix.push('\n');
            }
            prefix.push_str(&parsed.message);
            parsed.message = prefix;
        }

        parsed
    }
}

fn line_number<'a>(captures: &'a Captures<'_>, first: usize, second: usize) -> &'a str {
    captures
        .get(first)
        .or_else(|| captures.get(second))
        .map_or("", |m| m.as_str())
}

fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn scoped_trace_entries(text: &str, label_prefix: &str) -> String {
    SCOPED_TRACE_RE
        .captures_iter(text)
        .map(|captures| {
            let file = captures.get(1).map_or("", |m| m.as_str());
            let line = line_number(&captures, 2, 3);
            let message = captures.get(4).map_or("", |m| m.as_str().trim());
            create_stack_trace_entry(&format!("{label_prefix}{message}"), file, line)
        })
        .collect()
}

fn parse_failure(failure: &str, id: Option<usize>) -> ParsedErrorMessage {
    if let Some(captures) = CALL_STACK_RE.captures(failure) {
        let message = captures.get(1).map_or("", |m| m.as_str()).trim();
        let call_stack = captures.get(2).map_or("", |m| m.as_str());
        return ParsedErrorMessage {
            message: message.to_string(),
            stack_trace: scoped_trace_entries(call_stack, ""),
        };
    }

    let Some(captures) = PARSE_RE.captures(failure) else {
        return ParsedErrorMessage {
            message: failure.to_string(),
            stack_trace: String::new(),
        };
    };

    let header = captures.get(0).map_or(0..0, |m| m.range());
    let full_path = captures.get(1).map_or("", |m| m.as_str());
    let line = line_number(&captures, 2, 3);
    let reference = id.map(|id| format!("#{id} - ")).unwrap_or_default();

    let mut stack_trace = create_stack_trace_entry(
        &format!("{reference}{}:{line}", file_name(full_path)),
        full_path,
        line,
    );

    let mut message = failure[header.end..].trim();
    if let Some(trace_start) = SCOPED_TRACE_START_RE.find(message) {
        stack_trace.push_str(&scoped_trace_entries(&message[trace_start.end()..], "-->"));
        message = message[..trace_start.start()].trim();
    }

    ParsedErrorMessage {
        message: message.to_string(),
        stack_trace,
    }
}
