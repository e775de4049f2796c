// ABOUTME: Output formatting for CLI feedback.
// ABOUTME: Supports human-readable text and JSON lines.

use serde::Serialize;
use std::time::Instant;

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Normal,
    /// JSON lines for scripting
    Json,
}

/// Handles CLI output based on the configured mode.
pub struct Output {
    mode: OutputMode,
    start_time: Instant,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: Instant::now(),
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Print a line of text (suppressed in JSON mode).
    pub fn line(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    /// Print a structured record (JSON mode only).
    pub fn record<T: Serialize>(&self, event: &str, data: &T) {
        if self.mode != OutputMode::Json {
            return;
        }
        let record = JsonRecord { event, data };
        if let Ok(json) = serde_json::to_string(&record) {
            println!("{json}");
        }
    }

    /// Print a success message with elapsed wall time.
    pub fn success(&self, message: &str) {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        match self.mode {
            OutputMode::Normal => println!("{message} ({:.1}s)", elapsed),
            OutputMode::Json => self.record(
                "success",
                &Summary {
                    message,
                    duration_secs: elapsed,
                },
            ),
        }
    }

    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => eprintln!("Error: {message}"),
            OutputMode::Json => {
                let record = JsonRecord {
                    event: "error",
                    data: message,
                };
                if let Ok(json) = serde_json::to_string(&record) {
                    eprintln!("{json}");
                }
            }
        }
    }
}

#[derive(Serialize)]
struct JsonRecord<'a, T: Serialize + ?Sized> {
    event: &'a str,
    data: &'a T,
}

#[derive(Serialize)]
struct Summary<'a> {
    message: &'a str,
    duration_secs: f64,
}
