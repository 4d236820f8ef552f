//! Log line format module
//!
//! Two line formats are supported:
//! - `text`: `<rfc3339 time> LEVEL message`
//! - `json`: one JSON object per line

use chrono::{DateTime, Local, SecondsFormat};

use super::Level;

/// A single log line before rendering
#[derive(Debug, Clone)]
pub struct LogRecord<'a> {
    pub time: DateTime<Local>,
    pub level: Level,
    pub message: &'a str,
}

impl<'a> LogRecord<'a> {
    pub fn new(level: Level, message: &'a str) -> Self {
        Self {
            time: Local::now(),
            level,
            message,
        }
    }

    pub fn format(&self, format: LineFormat) -> String {
        match format {
            LineFormat::Text => self.format_text(),
            LineFormat::Json => self.format_json(),
        }
    }

    fn format_text(&self) -> String {
        format!(
            "{} {:<5} {}",
            self.time.to_rfc3339_opts(SecondsFormat::Millis, false),
            self.level.as_str(),
            self.message
        )
    }

    fn format_json(&self) -> String {
        serde_json::json!({
            "time": self.time.to_rfc3339_opts(SecondsFormat::Millis, false),
            "level": self.level.as_str(),
            "message": self.message,
        })
        .to_string()
    }
}

/// Selected output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineFormat {
    Text,
    Json,
}

impl LineFormat {
    /// Unknown names fall back to text
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Text
        }
    }
}
