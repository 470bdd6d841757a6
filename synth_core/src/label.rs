use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SynthError};

/// One unit of synthesis input: a full-context query plus the speed factor
/// the scheduler stamps on it when it is dequeued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub query: String,
    #[serde(default = "default_speed")]
    pub speed: f64,
    /// Free-form diagnostic text (usually the phone or word being spoken).
    #[serde(default)]
    pub text: Option<String>,
}

fn default_speed() -> f64 {
    1.0
}

impl Label {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            speed: default_speed(),
            text: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn set_speed(&mut self, speed: f64) {
        self.speed = speed;
    }

    /// Parse one line of an HTS-style label file.
    ///
    /// Accepts either a bare query or `start end query`, where the times are
    /// integers in 100 ns units. Times are dropped; durations come from the
    /// engine.
    pub fn parse(line: &str) -> Result<Self> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let query = match tokens.as_slice() {
            [] => return Err(SynthError::InvalidLabel("empty label line".to_string())),
            [query] => *query,
            [start, end, query, ..]
                if start.parse::<u64>().is_ok() && end.parse::<u64>().is_ok() =>
            {
                *query
            }
            _ => {
                return Err(SynthError::InvalidLabel(format!(
                    "expected `query` or `start end query`, got {:?}",
                    line.trim()
                )))
            }
        };
        Ok(Self::new(query))
    }

    /// Parse every non-blank line of a label file, in order.
    pub fn parse_lines(text: &str) -> Result<Vec<Self>> {
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .map(Self::parse)
            .collect()
    }
}

impl FromStr for Label {
    type Err = SynthError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.text {
            Some(text) => write!(f, "{} ({})", self.query, text),
            None => f.write_str(&self.query),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_query() {
        let label = Label::parse("x^x-sil+h=e@1_1").unwrap();
        assert_eq!(label.query, "x^x-sil+h=e@1_1");
        assert_eq!(label.speed, 1.0);
    }

    #[test]
    fn test_parse_timed_query() {
        let label = Label::parse("0 3050000 x^sil-h+e=l@1_3").unwrap();
        assert_eq!(label.query, "x^sil-h+e=l@1_3");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Label::parse("   ").is_err());
        assert!(Label::parse("foo bar").is_err());
    }

    #[test]
    fn test_parse_lines_skips_blank() {
        let labels = Label::parse_lines("a\n\n0 10 b\n  \nc\n").unwrap();
        let queries: Vec<_> = labels.iter().map(|l| l.query.as_str()).collect();
        assert_eq!(queries, vec!["a", "b", "c"]);
    }
}
