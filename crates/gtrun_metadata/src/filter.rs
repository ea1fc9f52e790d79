use std::fmt;

/// A gtest-style test filter: `POSITIVE[-NEGATIVE]`, where both parts are
/// `:`-separated lists of wildcard patterns (`*` matches any string, `?` any
/// single character).
///
/// A test is selected when it matches any positive pattern (an empty positive
/// part means `*`) and none of the negative ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestFilter {
    positive: Vec<String>,
    negative: Vec<String>,
}

impl TestFilter {
    pub fn new(input: &str) -> Result<Self, TestFilterError> {
        let input = input.trim();
        if input.contains(char::is_whitespace) {
            return Err(TestFilterError {
                message: format!("test filter `{input}` must not contain whitespace"),
            });
        }

        let (positive, negative) = input.split_once('-').unwrap_or((input, ""));

        let mut positive = split_patterns(positive);
        if positive.is_empty() {
            positive.push("*".to_string());
        }

        Ok(Self {
            positive,
            negative: split_patterns(negative),
        })
    }

    pub fn matches(&self, fully_qualified_name: &str) -> bool {
        self.positive
            .iter()
            .any(|pattern| wildcard_match(pattern, fully_qualified_name))
            && !self
                .negative
                .iter()
                .any(|pattern| wildcard_match(pattern, fully_qualified_name))
    }
}

impl fmt::Display for TestFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.positive.join(":"))?;
        if !self.negative.is_empty() {
            write!(f, "-{}", self.negative.join(":"))?;
        }
        Ok(())
    }
}

fn split_patterns(patterns: &str) -> Vec<String> {
    patterns
        .split(':')
        .filter(|pattern| !pattern.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => {
                let Some((star, matched)) = backtrack else {
                    return false;
                };
                p = star + 1;
                t = matched + 1;
                backtrack = Some((star, matched + 1));
            }
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

#[derive(Debug)]
pub struct TestFilterError {
    message: String,
}

impl fmt::Display for TestFilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TestFilterError {}
