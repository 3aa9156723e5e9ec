//! Joining downloaded segments into one media file with an external program.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;

use crate::config::MuxerConfig;
use crate::error::{Error, Result};

/// Tags written into the output container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaMetadata {
    pub title: String,
    pub artist: String,
}

impl MediaMetadata {
    #[must_use]
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
        }
    }
}

/// Concatenates the segments listed in a manifest into `target`.
#[async_trait]
pub trait Muxer: Send + Sync {
    /// Runs the join to completion.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Muxer`] with the process diagnostics when the join fails.
    async fn join(
        &self,
        manifest: &Path,
        target: &Path,
        metadata: &MediaMetadata,
        overwrite: bool,
    ) -> Result<()>;
}

/// Stream-copies segments with `ffmpeg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfmpegMuxer {
    program: PathBuf,
    encoded_by: String,
}

impl Default for FfmpegMuxer {
    fn default() -> Self {
        Self::from_config(&MuxerConfig::default())
    }
}

impl FfmpegMuxer {
    #[must_use]
    pub fn from_config(config: &MuxerConfig) -> Self {
        Self {
            program: config.program.clone(),
            encoded_by: config.encoded_by.clone(),
        }
    }

    /// Command-line arguments for one join.
    #[must_use]
    pub fn args(
        &self,
        manifest: &Path,
        target: &Path,
        metadata: &MediaMetadata,
        overwrite: bool,
    ) -> Vec<OsString> {
        let mut output = OsString::from("file:");
        output.push(target);

        let mut args: Vec<OsString> = vec!["-i".into(), manifest.into()];
        args.extend(
            [
                "-c".to_string(),
                "copy".to_string(),
                "-metadata".to_string(),
                format!("artist={}", metadata.artist),
                "-metadata".to_string(),
                format!("title={}", metadata.title),
                "-metadata".to_string(),
                format!("encoded_by={}", self.encoded_by),
                "-stats".to_string(),
                "-loglevel".to_string(),
                "warning".to_string(),
            ]
            .map(OsString::from),
        );
        args.push(output);
        if overwrite {
            args.push("-y".into());
        }
        args
    }
}

#[async_trait]
impl Muxer for FfmpegMuxer {
    async fn join(
        &self,
        manifest: &Path,
        target: &Path,
        metadata: &MediaMetadata,
        overwrite: bool,
    ) -> Result<()> {
        let args = self.args(manifest, target, metadata, overwrite);
        log::info!(
            "Running {} {}",
            self.program.display(),
            args.iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );

        let output = tokio::process::Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        log::error!("{} exited with {}: {stderr}", self.program.display(), output.status);
        Err(Error::Muxer {
            status: output.status,
            stderr,
        })
    }
}
