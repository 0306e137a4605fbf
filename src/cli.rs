use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Srt,
}

#[derive(Parser)]
#[command(
    name = "ytgist",
    about = "YouTube metadata, captions and summaries over HTTP",
    version = env!("GIT_DESCRIBE"),
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Config file (default: ~/.config/ytgist/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Print resolved settings to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve(ServeArgs),

    /// Print the video ID for a URL or ID
    Resolve {
        /// YouTube video URL or video ID
        input: String,
    },

    /// Parse a WebVTT file into cues
    Parse {
        /// WebVTT file (reads from stdin if omitted)
        file: Option<PathBuf>,

        /// Output format: text (default), json, srt
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Discard cues whose start is after their end
        #[arg(long)]
        drop_inverted: bool,
    },
}

#[derive(Args, Default)]
pub struct ServeArgs {
    /// Address to bind (env: HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on (env: PORT)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Directory holding the built client (index.html and assets)
    #[arg(long)]
    pub static_dir: Option<PathBuf>,

    /// LLM model for summaries and answers
    #[arg(short, long)]
    pub model: Option<String>,

    /// Preferred caption language
    #[arg(short, long)]
    pub lang: Option<String>,
}
