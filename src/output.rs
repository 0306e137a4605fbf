use eyre::Result;

use crate::Cue;

/// Render cues as plain text (one cue per line, no timestamps)
pub fn render_text(cues: &[Cue]) -> String {
    cues.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join("\n")
}

/// Render cues as a pretty-printed JSON array
pub fn render_json(cues: &[Cue]) -> Result<String> {
    Ok(serde_json::to_string_pretty(cues)?)
}

/// Render cues as SubRip
pub fn render_srt(cues: &[Cue]) -> String {
    cues.iter()
        .enumerate()
        .map(|(i, c)| {
            format!(
                "{}\n{} --> {}\n{}\n",
                i + 1,
                srt_timestamp(&c.start),
                srt_timestamp(&c.end),
                c.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// SRT uses a comma before the milliseconds
fn srt_timestamp(ts: &str) -> String {
    ts.replacen('.', ",", 1)
}
