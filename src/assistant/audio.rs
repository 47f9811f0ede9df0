//! Audio conversion through an `ffmpeg` subprocess.
//!
//! Telegram voice notes are OGG Opus; Whisper wants 16 kHz mono samples and
//! the speech endpoint returns WAV.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

static SCRATCH_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A temp file path unique within this process.
fn scratch_path(prefix: &str, ext: &str) -> PathBuf {
    let n = SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("voxmate_{prefix}_{}_{n}.{ext}", std::process::id()))
}

/// Removes the file when dropped.
struct ScratchFile(PathBuf);

impl ScratchFile {
    fn write(prefix: &str, ext: &str, data: &[u8]) -> Result<Self, String> {
        let path = scratch_path(prefix, ext);
        std::fs::write(&path, data).map_err(|e| format!("Failed to write temp file: {e}"))?;
        Ok(Self(path))
    }

    fn arg(&self) -> Result<&str, String> {
        self.0.to_str().ok_or_else(|| format!("Non-UTF-8 temp path: {:?}", self.0))
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

fn ffmpeg(args: &[&str]) -> Result<Vec<u8>, String> {
    let output = Command::new("ffmpeg")
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| format!("Failed to run ffmpeg: {e}"))?;

    if !output.status.success() {
        return Err(format!("ffmpeg failed: {}", String::from_utf8_lossy(&output.stderr)));
    }
    Ok(output.stdout)
}

/// Decode a voice note to 16 kHz mono f32 samples.
pub fn ogg_to_pcm(ogg_data: &[u8]) -> Result<Vec<f32>, String> {
    // OGG demuxing needs a seekable input.
    let input = ScratchFile::write("stt", "ogg", ogg_data)?;
    let raw = ffmpeg(&[
        "-i", input.arg()?,
        "-ar", "16000",
        "-ac", "1",
        "-f", "s16le",
        "-acodec", "pcm_s16le",
        "-y",
        "pipe:1",
    ])?;

    let samples = pcm_from_s16le(&raw);
    debug!("Decoded {} bytes of OGG to {} samples", ogg_data.len(), samples.len());
    Ok(samples)
}

/// Encode WAV audio as an OGG Opus voice note.
pub fn wav_to_ogg(wav_data: &[u8]) -> Result<Vec<u8>, String> {
    let input = ScratchFile::write("tts", "wav", wav_data)?;
    let output = ScratchFile(scratch_path("tts", "ogg"));

    // Telegram clips the first ~200ms of playback, so pad with silence.
    ffmpeg(&[
        "-y",
        "-f", "lavfi",
        "-i", "anullsrc=r=44100:cl=mono",
        "-i", input.arg()?,
        "-filter_complex", "[0]atrim=0:0.3[silence];[silence][1:a]concat=n=2:v=0:a=1",
        "-c:a", "libopus",
        "-b:a", "64k",
        output.arg()?,
    ])?;

    let ogg = std::fs::read(&output.0).map_err(|e| format!("Failed to read OGG output: {e}"))?;
    debug!("Encoded {} bytes of WAV to {} bytes of OGG", wav_data.len(), ogg.len());
    Ok(ogg)
}

fn pcm_from_s16le(raw: &[u8]) -> Vec<f32> {
    raw.chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}
