//! The audio transform: typed parameters, their translation to an ffmpeg
//! filter chain, and the single-shot invocation.
//!
//! Parameter-to-argv translation is pure ([`TransformSpec::filter_chain`],
//! [`build_args`]) so it can be tested without spawning a process.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::command::ToolCommand;
use crate::tools::ToolRegistry;

/// Closed range of accepted speed factors.
pub const SPEED_RANGE: (f64, f64) = (0.5, 2.0);
/// Closed range of accepted volume factors.
pub const VOLUME_RANGE: (f64, f64) = (0.0, 2.0);
/// Default speed factor (the service's original raison d'être).
pub const DEFAULT_SPEED: f64 = 1.15;
/// Default volume factor.
pub const DEFAULT_VOLUME: f64 = 1.0;

/// Pitch-shift ratio used by the voice preset.
const VOICE_PITCH: &str = "1.25";
/// Sample rate the voice preset resamples through.
const VOICE_SAMPLE_RATE: u32 = 44100;

/// Optional effect preset layered on top of the speed/volume change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectPreset {
    /// Pitch shift + echo + telephone-style band-pass EQ.
    Voice,
}

impl EffectPreset {
    /// Parse a form-field value. Empty and "none" mean no preset.
    pub fn parse(value: &str) -> tf_core::Result<Option<Self>> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(None),
            "voice" => Ok(Some(EffectPreset::Voice)),
            other => Err(tf_core::Error::InvalidParameter(format!(
                "unknown effect '{other}' (expected 'voice' or 'none')"
            ))),
        }
    }
}

/// Validated transform parameters for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformSpec {
    /// Tempo scaling factor, pitch-preserving. Range [0.5, 2.0].
    pub speed: f64,
    /// Gain multiplier. Range [0.0, 2.0].
    pub volume: f64,
    /// Optional effect preset.
    pub effect: Option<EffectPreset>,
}

impl Default for TransformSpec {
    fn default() -> Self {
        Self {
            speed: DEFAULT_SPEED,
            volume: DEFAULT_VOLUME,
            effect: None,
        }
    }
}

impl TransformSpec {
    /// Enforce the closed parameter ranges.
    pub fn validate(&self) -> tf_core::Result<()> {
        if !self.speed.is_finite() || self.speed < SPEED_RANGE.0 || self.speed > SPEED_RANGE.1 {
            return Err(tf_core::Error::InvalidParameter(format!(
                "speed {} outside [{}, {}]",
                self.speed, SPEED_RANGE.0, SPEED_RANGE.1
            )));
        }
        if !self.volume.is_finite() || self.volume < VOLUME_RANGE.0 || self.volume > VOLUME_RANGE.1
        {
            return Err(tf_core::Error::InvalidParameter(format!(
                "volume {} outside [{}, {}]",
                self.volume, VOLUME_RANGE.0, VOLUME_RANGE.1
            )));
        }
        Ok(())
    }

    /// Build the ffmpeg audio-filter chain for these parameters.
    ///
    /// `atempo` changes tempo without affecting pitch and natively accepts
    /// exactly our [0.5, 2.0] range. The voice preset shifts pitch by
    /// resampling (`asetrate` + `aresample`), then layers an echo and a
    /// telephone band-pass.
    pub fn filter_chain(&self) -> String {
        let mut filters = vec![
            format!("atempo={}", self.speed),
            format!("volume={}", self.volume),
        ];

        if let Some(EffectPreset::Voice) = self.effect {
            filters.push(format!(
                "asetrate={VOICE_SAMPLE_RATE}*{VOICE_PITCH}"
            ));
            filters.push(format!("aresample={VOICE_SAMPLE_RATE}"));
            filters.push("aecho=0.8:0.9:40:0.25".to_string());
            filters.push("highpass=f=300".to_string());
            filters.push("lowpass=f=3400".to_string());
        }

        filters.join(",")
    }
}

/// Translate a spec plus input/output paths into the ffmpeg argument vector.
pub fn build_args(spec: &TransformSpec, input: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-nostdin".to_string(),
        "-i".to_string(),
        input.to_string_lossy().to_string(),
        "-vn".to_string(),
        "-filter:a".to_string(),
        spec.filter_chain(),
        output.to_string_lossy().to_string(),
    ]
}

/// Narrow capability for best-effort progress reporting.
///
/// The invoker reports coarse phase information when it has any; with plain
/// ffmpeg output capture it only signals the start of processing. Absence of
/// fine-grained progress is the common case, not an error.
pub trait ProgressSink: Send + Sync {
    /// Report fractional progress in [0.0, 1.0].
    fn report(&self, progress: f32);
}

/// Invoke ffmpeg once to transform `input` into `output`.
///
/// The invocation has no internal deadline; callers that need a bound
/// enforce it by dropping this future (the child is killed on drop).
///
/// On success the output file is complete and safe to read — that return
/// value is the only valid signal. On failure any partial output is removed
/// before the error is returned, so a half-written file is never visible as
/// a result.
pub async fn run_transform(
    tools: &ToolRegistry,
    spec: &TransformSpec,
    input: &Path,
    output: &Path,
    progress: Option<&dyn ProgressSink>,
) -> tf_core::Result<()> {
    let ffmpeg = tools.require("ffmpeg")?.to_path_buf();

    if let Some(sink) = progress {
        sink.report(0.0);
    }

    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        speed = spec.speed,
        volume = spec.volume,
        effect = ?spec.effect,
        "Running audio transform"
    );

    let result = ToolCommand::new(ffmpeg)
        .args(build_args(spec, input, output))
        .execute()
        .await;

    match result {
        Ok(_) => {
            if !output.exists() {
                return Err(tf_core::Error::tool(
                    "ffmpeg",
                    "exited successfully but produced no output file",
                ));
            }
            Ok(())
        }
        Err(e) => {
            // Never leave a partial output visible as complete.
            if output.exists() {
                if let Err(rm) = std::fs::remove_file(output) {
                    tracing::warn!(
                        output = %output.display(),
                        error = %rm,
                        "Failed to remove partial transform output"
                    );
                }
            }
            Err(e)
        }
    }
}
