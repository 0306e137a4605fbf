use std::sync::LazyLock;

use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Cue, Transcript};

const HEADER: &str = "WEBVTT";

static TIMING_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{2}:\d{2}:\d{2}\.\d{3}) --> (\d{2}:\d{2}:\d{2}\.\d{3})").expect("invalid timing regex")
});

// Styling spans and inline karaoke timestamps, e.g. <c> or <00:00:01.500>
static TAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("invalid tag regex"));

/// What to do with cues whose start is after their end
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingPolicy {
    /// Keep every cue as written
    #[default]
    Permissive,
    /// Discard cues with `start > end`
    DropInverted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    pub timing: TimingPolicy,
}

/// Parse a WebVTT caption stream with the default (permissive) options
pub fn parse(content: &str) -> Transcript {
    parse_with(content, &ParseOptions::default())
}

/// Parse a WebVTT caption stream into cues.
///
/// Never fails: lines that do not fit the header/timing/text structure are
/// skipped, and a timing line with no text after it yields no cue.
pub fn parse_with(content: &str, options: &ParseOptions) -> Transcript {
    let mut cues = Vec::new();
    let mut pending: Option<PendingCue> = None;

    for line in content.split('\n') {
        let line = line.trim();
        if line.is_empty() || line == HEADER {
            continue;
        }

        if let Some(caps) = TIMING_PATTERN.captures(line) {
            if let Some(cue) = pending.take() {
                cue.flush_into(&mut cues, options);
            }
            pending = Some(PendingCue::new(&caps[1], &caps[2]));
        } else if let Some(cue) = pending.as_mut() {
            cue.push_line(&TAG_PATTERN.replace_all(line, ""));
        }
    }

    if let Some(cue) = pending {
        cue.flush_into(&mut cues, options);
    }

    debug!("Parsed {} cues", cues.len());
    cues
}

struct PendingCue {
    start: String,
    end: String,
    text: String,
}

impl PendingCue {
    fn new(start: &str, end: &str) -> Self {
        Self {
            start: start.to_string(),
            end: end.to_string(),
            text: String::new(),
        }
    }

    fn push_line(&mut self, line: &str) {
        // A line that was nothing but markup adds no text
        if line.trim().is_empty() {
            return;
        }
        if !self.text.is_empty() {
            self.text.push(' ');
        }
        self.text.push_str(line);
    }

    fn flush_into(self, cues: &mut Vec<Cue>, options: &ParseOptions) {
        if self.text.is_empty() {
            return;
        }
        // Fixed-width timestamps order correctly as strings
        if options.timing == TimingPolicy::DropInverted && self.start > self.end {
            debug!("Dropping inverted cue {} --> {}", self.start, self.end);
            return;
        }
        cues.push(Cue {
            start: self.start,
            end: self.end,
            text: self.text,
        });
    }
}
