use std::io::Read;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::process::Command as Process;
use std::sync::Arc;

use eyre::{Result, WrapErr};
use log::{debug, info, warn};

mod cli;

use cli::{Cli, Command, OutputFormat, ServeArgs};
use ytgist::config::{self, Config};
use ytgist::generate::LlmClient;
use ytgist::server::{self, AppState};
use ytgist::ytdlp::YtDlp;
use ytgist::{ParseOptions, TimingPolicy};

fn setup_logging() -> Result<()> {
    let log_dir = log_dir();
    std::fs::create_dir_all(&log_dir)?;
    let log_file = log_dir.join("ytgist.log");

    let target = Box::new(std::fs::OpenOptions::new().create(true).append(true).open(&log_file)?);

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized: {}", log_file.display());
    Ok(())
}

fn log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ytgist")
        .join("logs")
}

fn tool_version(name: &str) -> Option<String> {
    Process::new(name)
        .arg("--version")
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| {
            String::from_utf8_lossy(&o.stdout)
                .trim()
                .lines()
                .next()
                .unwrap_or("")
                .to_string()
        })
}

fn build_after_help() -> String {
    let yt_dlp_line = match tool_version(config::DEFAULT_YT_DLP) {
        Some(v) => format!("  \x1b[32m✅\x1b[0m yt-dlp     {v}"),
        None => "  \x1b[31m❌\x1b[0m yt-dlp     (not found — needed for metadata and subtitles)".to_string(),
    };

    let log_path = log_dir().join("ytgist.log");

    format!(
        "\nREQUIRED TOOLS:\n{yt_dlp_line}\n\nLogs are written to: {}",
        log_path.display()
    )
}

fn load_config(path: Option<&Path>) -> Config {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config::config_path);
    // Missing or invalid config falls back to defaults
    Config::load_from(&path).unwrap_or_else(|e| {
        warn!("Ignoring invalid config {}: {e}", path.display());
        eprintln!("Ignoring invalid config {}: {e}", path.display());
        Config::default()
    })
}

fn env_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

async fn run_server(args: ServeArgs, config: Config, verbose: bool) -> Result<()> {
    // flag > env > config file > default
    let host = args
        .host
        .or_else(|| env_var("HOST"))
        .or_else(|| config.host.clone())
        .unwrap_or_else(|| config::DEFAULT_HOST.to_string());
    let port = args
        .port
        .or_else(|| env_var("PORT"))
        .or(config.port)
        .unwrap_or(config::DEFAULT_PORT);
    let static_dir = args
        .static_dir
        .or_else(|| config.static_dir.clone())
        .unwrap_or_else(|| PathBuf::from(config::DEFAULT_STATIC_DIR));
    let model = args
        .model
        .or_else(|| config.model.clone())
        .unwrap_or_else(|| config::DEFAULT_MODEL.to_string());
    let lang = args.lang.unwrap_or_else(|| config.caption_lang().to_string());

    let ip: IpAddr = host.parse().wrap_err_with(|| format!("invalid host address: {host}"))?;
    let addr = SocketAddr::new(ip, port);

    debug!("Serving {} with model {model}, caption language {lang}", static_dir.display());
    if verbose {
        eprintln!(
            "Address: {addr}\nStatic dir: {}\nModel: {model}\nCaption language: {lang}\nCue timing: {:?}",
            static_dir.display(),
            config.cue_timing(),
        );
    }

    let generator = LlmClient::new(reqwest::Client::new(), &model, config.max_chars());
    let source = YtDlp::new(config.yt_dlp(), lang, config.socket_timeout());

    let state = AppState {
        source: Arc::new(source),
        generator: Arc::new(generator),
        parse_options: ParseOptions {
            timing: config.cue_timing(),
        },
    };

    server::serve(state, addr, static_dir).await
}

fn run_resolve(input: &str) -> Result<()> {
    let id = ytgist::resolve(input)?;
    println!("{id}\n{}", id.watch_url());
    Ok(())
}

fn run_parse(file: Option<&Path>, format: OutputFormat, drop_inverted: bool, config: &Config) -> Result<()> {
    let content = match file {
        Some(path) => std::fs::read_to_string(path).wrap_err_with(|| format!("reading {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let timing = if drop_inverted {
        TimingPolicy::DropInverted
    } else {
        config.cue_timing()
    };
    let cues = ytgist::parse_with(&content, &ParseOptions { timing });

    let rendered = match format {
        OutputFormat::Text => ytgist::output::render_text(&cues),
        OutputFormat::Json => ytgist::output::render_json(&cues)?,
        OutputFormat::Srt => ytgist::output::render_srt(&cues),
    };
    println!("{rendered}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging()?;

    let after_help = build_after_help();
    let cmd = <Cli as clap::CommandFactory>::command().after_help(after_help);
    let matches = cmd.get_matches();
    let cli = <Cli as clap::FromArgMatches>::from_arg_matches(&matches)?;

    let config = load_config(cli.config.as_deref());

    if cli.verbose {
        let config_path = cli.config.clone().unwrap_or_else(config::config_path);
        if config_path.exists() {
            eprintln!("Config: {}", config_path.display());
        }
    }

    match cli.command.unwrap_or(Command::Serve(ServeArgs::default())) {
        Command::Serve(args) => run_server(args, config, cli.verbose).await,
        Command::Resolve { input } => run_resolve(&input),
        Command::Parse {
            file,
            format,
            drop_inverted,
        } => run_parse(file.as_deref(), format, drop_inverted, &config),
    }
}
