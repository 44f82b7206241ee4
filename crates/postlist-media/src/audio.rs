//! Audio extraction for transcription.

use std::path::Path;
use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Sample rate expected by speech-to-text services.
pub const SPEECH_SAMPLE_RATE: u32 = 16_000;

/// Extract the audio track of `video` as mono 16 kHz WAV.
pub async fn extract_speech_audio(
    video: impl AsRef<Path>,
    output: impl AsRef<Path>,
    timeout_secs: u64,
) -> MediaResult<()> {
    let video = video.as_ref();
    let output = output.as_ref();

    if !video.exists() {
        return Err(MediaError::FileNotFound(video.to_path_buf()));
    }

    let cmd = FfmpegCommand::new(video, output)
        .mono_audio(SPEECH_SAMPLE_RATE)
        .output_arg("-f")
        .output_arg("wav");

    FfmpegRunner::new().with_timeout(timeout_secs).run(&cmd).await?;

    if !output.exists() {
        return Err(MediaError::ffmpeg_failed(
            "Audio output not created (video may have no audio track)",
            None,
            None,
        ));
    }

    debug!(output = %output.display(), "Extracted speech audio");
    Ok(())
}
