//! `spotdl` CLI adapter.
//!
//! Runs `spotdl <url> --output <dir> --overwrite skip --format <fmt>` in a
//! per-request directory and reports the audio files it left behind.

use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use async_trait::async_trait;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::Command,
};
use tracing::{debug, info, warn};

use sdb_core::{
    download::{spotdl_invocation, DownloadOutcome, DownloadRequest, Downloader},
    errors::Error,
    format::AudioFormat,
    Result,
};

const STDERR_TAIL_MAX_BYTES: usize = 16 * 1024;
const STDERR_TAIL_MAX_LINES: usize = 200;

/// How long to wait for the stderr reader after the process has exited.
const STDERR_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Consecutive read errors after which a pipe reader gives up.
const MAX_READ_ERRORS: usize = 16;

#[derive(Clone, Debug)]
pub struct SpotdlClient {
    program: PathBuf,
    timeout: Duration,
}

#[derive(Clone, Debug, Default)]
struct StderrTail {
    lines: VecDeque<String>,
    bytes: usize,
}

impl StderrTail {
    fn push_line(&mut self, line: String) {
        // +1 for the '\n' we join with later.
        self.bytes = self.bytes.saturating_add(line.len() + 1);
        self.lines.push_back(line);

        while self.lines.len() > STDERR_TAIL_MAX_LINES || self.bytes > STDERR_TAIL_MAX_BYTES {
            if let Some(front) = self.lines.pop_front() {
                self.bytes = self.bytes.saturating_sub(front.len() + 1);
            } else {
                break;
            }
        }
    }

    fn snapshot(&self) -> String {
        self.lines.iter().cloned().collect::<Vec<_>>().join("\n")
    }
}

impl SpotdlClient {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Downloader for SpotdlClient {
    fn name(&self) -> &'static str {
        "spotdl"
    }

    async fn download(&self, req: DownloadRequest) -> Result<DownloadOutcome> {
        reset_dir(&req.output_dir).await?;

        let inv = spotdl_invocation(&self.program, &req);
        debug!(program = %inv.program.display(), args = ?inv.args, "spawning spotdl");

        let mut child = Command::new(&inv.program)
            .args(&inv.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Drain both pipes in background so a chatty run never blocks on a full
        // pipe. Readers must outlive the process: a closed pipe kills spotdl.
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(drain_lines(stdout, |line| debug!(target: "spotdl", "{line}")));
        }

        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut tail = StderrTail::default();
                drain_lines(stderr, |line| tail.push_line(line)).await;
                tail
            })
        });

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                warn!(url = %req.url, after_secs = self.timeout.as_secs(), "spotdl timed out; killing");
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to kill spotdl");
                }
                if let Some(task) = stderr_task {
                    task.abort();
                }
                return Err(Error::Timeout {
                    what: "spotdl".to_string(),
                    after: self.timeout,
                });
            }
        };

        let stderr_tail = match stderr_task {
            Some(task) => match tokio::time::timeout(STDERR_DRAIN_GRACE, task).await {
                Ok(Ok(tail)) => tail,
                _ => StderrTail::default(),
            },
            None => StderrTail::default(),
        };

        if !status.success() {
            let stderr = stderr_tail.snapshot();
            if !stderr.trim().is_empty() {
                return Err(Error::Download(format!(
                    "spotdl exited with status {status}\nstderr (tail):\n{stderr}"
                )));
            }
            return Err(Error::Download(format!("spotdl exited with status {status}")));
        }

        let dir = req.output_dir.clone();
        let format = req.format;
        let files = tokio::task::spawn_blocking(move || collect_audio_files(&dir, format))
            .await
            .map_err(|e| Error::External(format!("scan task failed: {e}")))??;

        info!(url = %req.url, %format, files = files.len(), "spotdl finished");
        Ok(DownloadOutcome { files })
    }
}

/// Read `reader` to EOF, handing each line (lossily decoded, without the line
/// terminator) to `on_line`.
async fn drain_lines<R>(reader: R, mut on_line: impl FnMut(String))
where
    R: AsyncRead + Unpin,
{
    let mut r = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut errors = 0usize;

    loop {
        buf.clear();
        match r.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                errors = 0;
                let line = String::from_utf8_lossy(&buf);
                on_line(line.trim_end_matches(|c| c == '\n' || c == '\r').to_string());
            }
            Err(e) => {
                errors += 1;
                if errors >= MAX_READ_ERRORS {
                    warn!(error = %e, "giving up on spotdl output pipe");
                    break;
                }
                debug!(error = %e, "spotdl output read failed; continuing");
            }
        }
    }
}

/// Remove leftovers from an earlier attempt and start from an empty directory.
async fn reset_dir(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(Error::Io(e)),
    }
    tokio::fs::create_dir_all(dir).await?;
    Ok(())
}

/// All files under `dir` (recursively) whose extension matches `format`,
/// case-insensitively, sorted by path.
pub fn collect_audio_files(dir: &Path, format: AudioFormat) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut stack = vec![dir.to_path_buf()];

    while let Some(current) = stack.pop() {
        for entry in std::fs::read_dir(&current)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                stack.push(path);
            } else if file_type.is_file() && has_extension(&path, format.extension()) {
                out.push(path);
            }
        }
    }

    out.sort();
    Ok(out)
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;
    use tokio::sync::Mutex;

    // Scripts are written and then exec'd; keep forks from other tests out of
    // that window (ETXTBSY).
    fn serial() -> &'static Mutex<()> {
        static SERIAL: OnceLock<Mutex<()>> = OnceLock::new();
        SERIAL.get_or_init(|| Mutex::new(()))
    }

    fn tmp_root(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let root = PathBuf::from(format!("/tmp/{prefix}-{}-{ts}", std::process::id()));
        std::fs::create_dir_all(&root).unwrap();
        root
    }

    /// Write an executable stand-in for spotdl. `$3` is the output dir, `$7` the format.
    fn fake_spotdl(root: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = root.join("spotdl");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn request(root: &Path, format: AudioFormat) -> DownloadRequest {
        DownloadRequest {
            url: "https://open.spotify.com/album/xyz".to_string(),
            format,
            output_dir: root.join("out"),
        }
    }

    #[test]
    fn stderr_tail_is_bounded() {
        let mut tail = StderrTail::default();
        for i in 0..(STDERR_TAIL_MAX_LINES + 50) {
            tail.push_line(format!("line {i}"));
        }
        assert_eq!(tail.lines.len(), STDERR_TAIL_MAX_LINES);
        assert!(tail.snapshot().ends_with(&format!("line {}", STDERR_TAIL_MAX_LINES + 49)));

        let mut tail = StderrTail::default();
        tail.push_line("x".repeat(STDERR_TAIL_MAX_BYTES));
        tail.push_line("last".to_string());
        assert_eq!(tail.snapshot(), "last");
    }

    #[tokio::test]
    async fn drain_lines_decodes_invalid_utf8_lossily() {
        let input: &[u8] = b"Processing query\n\xff\xfe broken\r\nDownloaded \"Song\"";
        let mut lines = Vec::new();
        drain_lines(input, |l| lines.push(l)).await;
        assert_eq!(
            lines,
            vec![
                "Processing query".to_string(),
                "\u{FFFD}\u{FFFD} broken".to_string(),
                "Downloaded \"Song\"".to_string(),
            ]
        );
    }

    #[test]
    fn scan_is_recursive_and_case_insensitive() {
        let root = tmp_root("sdb-scan");
        std::fs::create_dir_all(root.join("disc 2")).unwrap();
        std::fs::write(root.join("b.mp3"), "b").unwrap();
        std::fs::write(root.join("A.MP3"), "a").unwrap();
        std::fs::write(root.join("disc 2/c.mp3"), "c").unwrap();
        std::fs::write(root.join("cover.jpg"), "x").unwrap();
        std::fs::write(root.join("d.m4a"), "d").unwrap();
        std::fs::create_dir_all(root.join("trap.mp3")).unwrap();

        let files = collect_audio_files(&root, AudioFormat::Mp3).unwrap();
        assert_eq!(
            files,
            vec![
                root.join("A.MP3"),
                root.join("b.mp3"),
                root.join("disc 2/c.mp3"),
            ]
        );

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn download_collects_produced_files() {
        let _serial = serial().lock().await;
        let root = tmp_root("sdb-spotdl-ok");
        let program = fake_spotdl(
            &root,
            r#"mkdir -p "$3/sub"
printf a > "$3/sub/a.$7"
printf b > "$3/b.$7"
printf x > "$3/cover.jpg"
echo "Downloaded 2 songs""#,
        );

        // Stale output from an earlier attempt is cleared first.
        let req = request(&root, AudioFormat::Opus);
        std::fs::create_dir_all(&req.output_dir).unwrap();
        std::fs::write(req.output_dir.join("stale.opus"), "old").unwrap();

        let client = SpotdlClient::new(&program, Duration::from_secs(10));
        let out = client.download(req.clone()).await.unwrap();
        assert_eq!(
            out.files,
            vec![
                req.output_dir.join("b.opus"),
                req.output_dir.join("sub/a.opus"),
            ]
        );

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn non_utf8_output_does_not_break_the_run() {
        let _serial = serial().lock().await;
        let root = tmp_root("sdb-spotdl-bytes");
        let program = fake_spotdl(
            &root,
            r#"printf '\377\n' >&2
printf '\376 progress\n'
sleep 0.3
echo 'Downloaded song' >&2
echo 'Done'
printf a > "$3/a.$7"
exit 0"#,
        );

        let req = request(&root, AudioFormat::Mp3);
        let client = SpotdlClient::new(&program, Duration::from_secs(10));
        let out = client.download(req.clone()).await.unwrap();
        assert_eq!(out.files, vec![req.output_dir.join("a.mp3")]);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn no_matching_files_is_an_empty_outcome() {
        let _serial = serial().lock().await;
        let root = tmp_root("sdb-spotdl-empty");
        let program = fake_spotdl(&root, r#"printf x > "$3/track.mp3""#);

        let client = SpotdlClient::new(&program, Duration::from_secs(10));
        let out = client.download(request(&root, AudioFormat::Flac)).await.unwrap();
        assert!(out.is_empty());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn nonzero_exit_reports_stderr_tail() {
        let _serial = serial().lock().await;
        let root = tmp_root("sdb-spotdl-fail");
        let program = fake_spotdl(&root, "echo 'LookupError: no results' >&2\nexit 3");

        let client = SpotdlClient::new(&program, Duration::from_secs(10));
        let err = client
            .download(request(&root, AudioFormat::Mp3))
            .await
            .unwrap_err();
        match err {
            Error::Download(msg) => {
                assert!(msg.contains("exit status: 3"), "{msg}");
                assert!(msg.contains("LookupError: no results"), "{msg}");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn slow_run_times_out() {
        let _serial = serial().lock().await;
        let root = tmp_root("sdb-spotdl-slow");
        let program = fake_spotdl(&root, "exec sleep 30");

        let client = SpotdlClient::new(&program, Duration::from_millis(300));
        let started = std::time::Instant::now();
        let err = client
            .download(request(&root, AudioFormat::Mp3))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }), "{err:?}");
        assert!(started.elapsed() < Duration::from_secs(10));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn missing_binary_is_an_error() {
        let root = tmp_root("sdb-spotdl-missing");
        let client = SpotdlClient::new(root.join("does-not-exist"), Duration::from_secs(1));
        assert!(client
            .download(request(&root, AudioFormat::Mp3))
            .await
            .is_err());

        let _ = std::fs::remove_dir_all(&root);
    }
}
