use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use eyre::{Result, WrapErr, bail};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::VideoId;

/// Metadata returned for a single video
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadata {
    pub title: Option<String>,
    pub channel: Option<String>,
    pub upload_date: Option<String>,
    pub view_count: Option<serde_json::Number>,
    pub duration: Option<serde_json::Number>,
    pub thumbnail: Option<String>,
    pub id: Option<String>,
}

/// Fields of yt-dlp's info JSON that we pass on
#[derive(Debug, Deserialize)]
struct InfoJson {
    title: Option<String>,
    uploader: Option<String>,
    upload_date: Option<String>,
    view_count: Option<serde_json::Number>,
    duration: Option<serde_json::Number>,
    thumbnail: Option<String>,
    id: Option<String>,
}

impl From<InfoJson> for VideoMetadata {
    fn from(info: InfoJson) -> Self {
        Self {
            title: info.title,
            channel: info.uploader,
            upload_date: info.upload_date,
            view_count: info.view_count,
            duration: info.duration,
            thumbnail: info.thumbnail,
            id: info.id,
        }
    }
}

/// A caption track the video offers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionLanguage {
    pub code: String,
    pub name: Option<String>,
    pub is_generated: bool,
}

#[derive(Debug, Default, Deserialize)]
struct TrackFormat {
    name: Option<String>,
}

/// Caption track listings from yt-dlp's info JSON, keyed by language code
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CaptionIndex {
    subtitles: BTreeMap<String, Vec<TrackFormat>>,
    automatic_captions: BTreeMap<String, Vec<TrackFormat>>,
}

impl CaptionIndex {
    /// Uploaded tracks first, then generated ones, each ordered by code
    fn into_languages(self) -> Vec<CaptionLanguage> {
        let uploaded = self.subtitles.into_iter().map(|track| (track, false));
        let generated = self.automatic_captions.into_iter().map(|track| (track, true));

        uploaded
            .chain(generated)
            // yt-dlp lists live chat replay as a subtitle track
            .filter(|((code, _), _)| code != "live_chat")
            .map(|((code, formats), is_generated)| CaptionLanguage {
                name: formats.into_iter().find_map(|f| f.name),
                code,
                is_generated,
            })
            .collect()
    }
}

/// Where video metadata and raw caption streams come from
#[async_trait]
pub trait VideoSource: Send + Sync {
    async fn metadata(&self, id: &VideoId) -> Result<VideoMetadata>;

    /// Caption tracks available for the video
    async fn languages(&self, id: &VideoId) -> Result<Vec<CaptionLanguage>>;

    /// Raw WebVTT caption stream for the video, in `lang` or the source's default
    async fn captions(&self, id: &VideoId, lang: Option<&str>) -> Result<String>;
}

/// `VideoSource` backed by the yt-dlp command line tool
#[derive(Debug, Clone)]
pub struct YtDlp {
    program: PathBuf,
    lang: String,
    socket_timeout: u64,
}

impl YtDlp {
    pub fn new(program: impl Into<PathBuf>, lang: impl Into<String>, socket_timeout: u64) -> Self {
        Self {
            program: program.into(),
            lang: lang.into(),
            socket_timeout,
        }
    }

    async fn run(&self, args: &[&str]) -> Result<Vec<u8>> {
        debug!("Running {} {}", self.program.display(), args.join(" "));

        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        match output {
            Ok(o) if o.status.success() => Ok(o.stdout),
            Ok(o) => {
                let stderr = String::from_utf8_lossy(&o.stderr);
                bail!("yt-dlp exited with status {}: {}", o.status, stderr.trim());
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                bail!(
                    "{} not found. Install it to fetch video data:\n  \
                     pip install yt-dlp\n  \
                     or: brew install yt-dlp",
                    self.program.display()
                );
            }
            Err(e) => bail!("failed to run yt-dlp: {e}"),
        }
    }

    async fn info_json(&self, id: &VideoId) -> Result<Vec<u8>> {
        let url = id.watch_url();
        let timeout = self.socket_timeout.to_string();
        self.run(&[
            "--dump-single-json",
            "--no-playlist",
            "--no-warnings",
            "--socket-timeout",
            &timeout,
            &url,
        ])
        .await
    }

    async fn download_captions(&self, id: &VideoId, lang: &str, dir: &Path) -> Result<String> {
        let template = dir.join("captions.%(ext)s");
        let template = template.to_string_lossy();
        let url = id.watch_url();
        let timeout = self.socket_timeout.to_string();

        self.run(&[
            "--skip-download",
            "--write-subs",
            "--write-auto-subs",
            "--sub-langs",
            lang,
            "--sub-format",
            "vtt",
            "--no-playlist",
            "--no-warnings",
            "--socket-timeout",
            &timeout,
            "-o",
            &template,
            &url,
        ])
        .await?;

        let Some(path) = find_caption_file(dir).await? else {
            bail!("No {lang} subtitles found");
        };
        debug!("Using subtitle file: {}", path.display());

        Ok(tokio::fs::read_to_string(&path).await?)
    }
}

#[async_trait]
impl VideoSource for YtDlp {
    async fn metadata(&self, id: &VideoId) -> Result<VideoMetadata> {
        let stdout = self.info_json(id).await?;
        let metadata = parse_metadata(&stdout)?;
        debug!("Metadata retrieved for {id}: {:?}", metadata.title);
        Ok(metadata)
    }

    async fn languages(&self, id: &VideoId) -> Result<Vec<CaptionLanguage>> {
        let stdout = self.info_json(id).await?;
        let languages = parse_languages(&stdout)?;
        debug!("{} caption tracks listed for {id}", languages.len());
        Ok(languages)
    }

    async fn captions(&self, id: &VideoId, lang: Option<&str>) -> Result<String> {
        let lang = lang.unwrap_or(self.lang.as_str());
        let dir = tokio::task::spawn_blocking(|| tempfile::Builder::new().prefix("ytgist-").tempdir())
            .await?
            .wrap_err("creating caption download directory")?;

        let result = self.download_captions(id, lang, dir.path()).await;

        let path = dir.path().to_path_buf();
        match tokio::task::spawn_blocking(move || dir.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to remove {}: {e}", path.display()),
            Err(e) => warn!("Cleanup of {} did not finish: {e}", path.display()),
        }
        result
    }
}

fn parse_metadata(stdout: &[u8]) -> Result<VideoMetadata> {
    let info: InfoJson = serde_json::from_slice(stdout)?;
    Ok(info.into())
}

fn parse_languages(stdout: &[u8]) -> Result<Vec<CaptionLanguage>> {
    let index: CaptionIndex = serde_json::from_slice(stdout)?;
    Ok(index.into_languages())
}

/// First `.vtt` file in `dir`, by name
async fn find_caption_file(dir: &Path) -> Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "vtt") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files.into_iter().next())
}
