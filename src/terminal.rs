use std::collections::VecDeque;

use ::time::{macros::format_description, OffsetDateTime};
use colored::Color;

/// Severity of a log panel line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    /// Colour the panel is printed in.
    pub fn color(self) -> Color {
        match self {
            Severity::Info => Color::Blue,
            Severity::Success => Color::Green,
            Severity::Warning => Color::Yellow,
            Severity::Error => Color::Red,
        }
    }

    fn log_level(self) -> log::Level {
        match self {
            Severity::Info | Severity::Success => log::Level::Info,
            Severity::Warning => log::Level::Warn,
            Severity::Error => log::Level::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    /// Wall-clock `HH:MM:SS`.
    pub time: String,
    pub severity: Severity,
    pub message: String,
}

/// Scrolling log panel. Bounded: the oldest lines fall off once `capacity`
/// is reached, and readers always see the tail.
#[derive(Debug, Clone)]
pub struct LogPanel {
    lines: VecDeque<LogLine>,
    capacity: usize,
    /// Lines handed out by `take_new` so far, counted across evictions.
    seen: u64,
    total: u64,
}

pub const DEFAULT_CAPACITY: usize = 500;

impl LogPanel {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            capacity: capacity.max(1),
            seen: 0,
            total: 0,
        }
    }

    /// Append a timestamped line and mirror it to the `log` facade.
    pub fn log(&mut self, message: impl Into<String>, severity: Severity) {
        let message = message.into();
        log::log!(severity.log_level(), "{message}");
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(LogLine {
            time: clock_time(),
            severity,
            message,
        });
        self.total += 1;
    }

    pub fn lines(&self) -> impl Iterator<Item = &LogLine> {
        self.lines.iter()
    }

    pub fn last(&self) -> Option<&LogLine> {
        self.lines.back()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines appended since the previous call (still retained ones only).
    pub fn take_new(&mut self) -> Vec<LogLine> {
        let unseen = (self.total - self.seen).min(self.lines.len() as u64) as usize;
        self.seen = self.total;
        self.lines
            .iter()
            .skip(self.lines.len() - unseen)
            .cloned()
            .collect()
    }
}

impl Default for LogPanel {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

fn clock_time() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_else(|_| String::from("00:00:00"))
}
