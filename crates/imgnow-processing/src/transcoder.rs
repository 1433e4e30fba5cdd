//! Video transcoding through an external ffmpeg process

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use imgnow_core::TranscodeSettings;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Turns one input video into an MP4 payload.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(&self, input: Vec<u8>) -> Result<Vec<u8>>;
}

/// H.265/AAC fragmented MP4 via ffmpeg, streaming through stdin/stdout.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
    preset: String,
    crf: u8,
}

impl FfmpegTranscoder {
    pub fn new(settings: &TranscodeSettings) -> Result<Self> {
        // Validate ffmpeg_path
        let dangerous_chars = [';', '|', '&', '$', '`', '(', ')', '<', '>', '\n', '\r'];
        if settings
            .ffmpeg_path
            .chars()
            .any(|c| dangerous_chars.contains(&c))
        {
            return Err(anyhow!(
                "Invalid ffmpeg_path: contains dangerous characters"
            ));
        }
        if settings.preset.is_empty() || !settings.preset.chars().all(|c| c.is_ascii_alphabetic())
        {
            return Err(anyhow!("Invalid ffmpeg preset: {}", settings.preset));
        }

        Ok(Self {
            ffmpeg_path: settings.ffmpeg_path.clone(),
            preset: settings.preset.clone(),
            crf: settings.crf,
        })
    }

    pub fn args(&self) -> Vec<String> {
        let crf = self.crf.to_string();
        let args: [&str; 19] = [
            "-i",
            "pipe:0",
            "-c:v",
            "libx265",
            "-preset",
            self.preset.as_str(),
            "-crf",
            crf.as_str(),
            "-tag:v",
            "hvc1",
            "-c:a",
            "aac",
            "-b:a",
            "128k",
            "-f",
            "mp4",
            "-movflags",
            "+frag_keyframe+empty_moov",
            "pipe:1",
        ];
        args.iter().map(|s| s.to_string()).collect()
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, input: Vec<u8>) -> Result<Vec<u8>> {
        let start = std::time::Instant::now();
        let input_bytes = input.len();

        let mut child = Command::new(&self.ffmpeg_path)
            .args(self.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .context("Failed to execute ffmpeg")?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("ffmpeg stdin was not captured"))?;

        // Feed stdin concurrently; ffmpeg starts writing stdout before it has read all input.
        let writer = tokio::spawn(async move {
            stdin.write_all(&input).await?;
            stdin.shutdown().await
        });

        let output = child
            .wait_with_output()
            .await
            .context("Failed to wait for ffmpeg")?;
        let write_result = writer.await.context("ffmpeg stdin task panicked")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "FFmpeg transcode failed ({}): {}",
                output.status,
                stderr.trim()
            ));
        }
        write_result.context("Failed to write video to ffmpeg")?;

        tracing::debug!(
            input_bytes,
            output_bytes = output.stdout.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "FFmpeg transcode finished"
        );

        Ok(output.stdout)
    }
}
