//! Downloader port and the `spotdl` command line it is driven with.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::{format::AudioFormat, Result};

#[derive(Clone, Debug)]
pub struct DownloadRequest {
    /// Link exactly as the user sent it (trimmed).
    pub url: String,
    pub format: AudioFormat,
    /// Directory owned by this request; recreated empty before the run.
    pub output_dir: PathBuf,
}

#[derive(Clone, Debug, Default)]
pub struct DownloadOutcome {
    /// Produced audio files, sorted.
    pub files: Vec<PathBuf>,
}

impl DownloadOutcome {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// A concrete CLI invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CliInvocation {
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// Build the `spotdl` invocation for a request:
/// `spotdl <url> --output <dir> --overwrite skip --format <fmt>`.
pub fn spotdl_invocation(program: &std::path::Path, req: &DownloadRequest) -> CliInvocation {
    let args = vec![
        req.url.clone(),
        "--output".to_string(),
        req.output_dir.display().to_string(),
        "--overwrite".to_string(),
        "skip".to_string(),
        "--format".to_string(),
        req.format.as_str().to_string(),
    ];

    CliInvocation {
        program: program.to_path_buf(),
        args,
    }
}

/// Port for whatever turns a link into local audio files.
#[async_trait]
pub trait Downloader: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run one download to completion. Zero produced files is not an error.
    async fn download(&self, req: DownloadRequest) -> Result<DownloadOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn builds_spotdl_args() {
        let req = DownloadRequest {
            url: "https://open.spotify.com/album/xyz".to_string(),
            format: AudioFormat::Flac,
            output_dir: PathBuf::from("downloads/42-1"),
        };
        let inv = spotdl_invocation(Path::new("/usr/bin/spotdl"), &req);
        assert_eq!(inv.program, PathBuf::from("/usr/bin/spotdl"));
        assert_eq!(
            inv.args,
            vec![
                "https://open.spotify.com/album/xyz",
                "--output",
                "downloads/42-1",
                "--overwrite",
                "skip",
                "--format",
                "flac",
            ]
        );
    }
}
