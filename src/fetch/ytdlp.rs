//! yt-dlp backed media fetcher
//!
//! yt-dlp runs as a child process. Progress comes from a custom
//! `--progress-template` printed on stdout, one line per update thanks to
//! `--newline`; errors come from `ERROR:` lines on stderr and the exit status.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::debug;

use super::{FetchError, FetchEvent, FetchRequest, MediaFetcher};

/// Prefix of our progress lines, so they can't be confused with tool chatter
const PROGRESS_MARKER: &str = "tunepull-progress";

/// Stderr lines kept for the error message of a failed run
const STDERR_TAIL: usize = 5;

/// Fetches media by spawning yt-dlp
#[derive(Debug, Clone)]
pub struct YtDlpFetcher {
    binary: PathBuf,
}

impl YtDlpFetcher {
    pub fn new(binary: PathBuf) -> Self {
        Self { binary }
    }

    fn tool_name(&self) -> String {
        self.binary
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "yt-dlp".to_string())
    }

    /// Command line for a request, without the binary
    pub fn build_args(request: &FetchRequest) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--newline".into(),
            "--no-playlist".into(),
            "--progress-template".into(),
            format!(
                "download:{} %(progress.status)s %(progress.downloaded_bytes)s \
                 %(progress.total_bytes)s %(progress.total_bytes_estimate)s",
                PROGRESS_MARKER
            ),
            "--retries".into(),
            "10".into(),
            "--fragment-retries".into(),
            "10".into(),
            "--format".into(),
            "bestaudio/best".into(),
            "--output".into(),
            request.output_template.clone(),
        ];

        if request.transcode {
            args.extend([
                "--extract-audio".to_string(),
                "--audio-format".to_string(),
                request.audio_format.clone(),
                "--audio-quality".to_string(),
                "5".to_string(),
                "--embed-metadata".to_string(),
                "--embed-thumbnail".to_string(),
                "--convert-thumbnails".to_string(),
                "jpg".to_string(),
            ]);
            if let Some(path) = &request.transcoder_path {
                args.push("--ffmpeg-location".into());
                args.push(path.to_string_lossy().into_owned());
            }
        }

        if let Some(archive) = &request.archive {
            args.push("--download-archive".into());
            args.push(archive.to_string_lossy().into_owned());
        }

        args.push(request.url.clone());
        args
    }
}

/// Parse one stdout line of our progress template
pub fn parse_progress_line(line: &str) -> Option<FetchEvent> {
    let start = line.find(PROGRESS_MARKER)?;
    let mut fields = line[start + PROGRESS_MARKER.len()..].split_whitespace();

    let status = fields.next()?;
    let downloaded = fields.next().and_then(parse_bytes);
    let total = fields.next().and_then(parse_bytes);
    let estimate = fields.next().and_then(parse_bytes);

    match status {
        "downloading" => Some(FetchEvent::Downloading {
            downloaded_bytes: downloaded.unwrap_or(0),
            total_bytes: total.or(estimate),
        }),
        "finished" => Some(FetchEvent::Finished),
        "error" => Some(FetchEvent::Error("download error".to_string())),
        _ => None,
    }
}

/// Byte counts are printed as integers, estimates as floats, unknowns as `NA`
fn parse_bytes(field: &str) -> Option<u64> {
    let value: f64 = field.parse().ok()?;
    if value.is_finite() && value >= 0.0 {
        Some(value as u64)
    } else {
        None
    }
}

/// Read `reader` line by line until EOF, decoding lossily
///
/// Output is drained to the end even when a line is not valid UTF-8, so the
/// child never writes into a closed pipe.
async fn for_each_line<R, F>(reader: R, mut handle: F)
where
    R: AsyncRead + Unpin,
    F: FnMut(String),
{
    let mut segments = BufReader::new(reader).split(b'\n');
    loop {
        match segments.next_segment().await {
            Ok(Some(bytes)) => {
                let line = String::from_utf8_lossy(&bytes);
                handle(line.trim_end_matches('\r').to_string());
            }
            Ok(None) => break,
            Err(e) => {
                debug!("Stopped reading tool output: {}", e);
                break;
            }
        }
    }
}

/// Extract the message from an `ERROR:` stderr line
pub fn parse_error_line(line: &str) -> Option<String> {
    line.trim()
        .strip_prefix("ERROR:")
        .map(|message| message.trim().to_string())
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn fetch(
        &self,
        request: &FetchRequest,
        events: mpsc::UnboundedSender<FetchEvent>,
    ) -> Result<(), FetchError> {
        let tool = self.tool_name();
        let args = Self::build_args(request);
        debug!("Running {} {}", self.binary.display(), args.join(" "));

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| FetchError::Spawn {
                tool: tool.clone(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let stdout_events = events.clone();
        let read_stdout = async move {
            let Some(stdout) = stdout else { return };
            for_each_line(stdout, |line| {
                if let Some(event) = parse_progress_line(&line) {
                    let _ = stdout_events.send(event);
                } else {
                    debug!("{}", line);
                }
            })
            .await;
        };

        let read_stderr = async move {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL);
            let Some(stderr) = stderr else { return tail };
            for_each_line(stderr, |line| {
                if let Some(message) = parse_error_line(&line) {
                    let _ = events.send(FetchEvent::Error(message));
                }
                if tail.len() == STDERR_TAIL {
                    tail.pop_front();
                }
                tail.push_back(line);
            })
            .await;
            tail
        };

        let ((), tail) = tokio::join!(read_stdout, read_stderr);
        let status = child.wait().await?;

        if status.success() {
            Ok(())
        } else {
            Err(FetchError::Tool {
                tool,
                status: status.to_string(),
                message: tail.into_iter().collect::<Vec<_>>().join("\n"),
            })
        }
    }
}
