pub mod config;
pub mod generate;
pub mod output;
pub mod reference;
pub mod server;
pub mod vtt;
pub mod ytdlp;

use serde::{Deserialize, Serialize};

pub use reference::{InvalidReferenceError, VideoId, resolve};
pub use vtt::{ParseOptions, TimingPolicy, parse, parse_with};

/// A single timed caption entry
///
/// Timestamps keep the `HH:MM:SS.mmm` form they had in the caption stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cue {
    pub start: String,
    pub end: String,
    pub text: String,
}

/// Cues in the order they first appeared in the caption stream
pub type Transcript = Vec<Cue>;
