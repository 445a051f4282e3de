//! Duration probing via ffprobe's JSON metadata mode.
//!
//! The probe is deliberately forgiving: any failure — ffprobe missing, the
//! file unreadable, an unrecognized container, no duration in the output —
//! yields `None` rather than an error. Absence of duration information is
//! not a rejection reason; callers treat it as a degraded-confidence path
//! and proceed.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::command::ToolCommand;
use crate::tools::ToolRegistry;

/// Probes must never hang a request worker; metadata reads are fast or broken.
const PROBE_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Probe the playable duration of `path`.
///
/// Returns `None` on every failure path, logging the reason at `warn`.
pub async fn duration_of(tools: &ToolRegistry, path: &Path) -> Option<Duration> {
    let ffprobe = match tools.require("ffprobe") {
        Ok(p) => p.to_path_buf(),
        Err(e) => {
            tracing::warn!(input = %path.display(), error = %e, "Duration probe unavailable");
            return None;
        }
    };

    let result = ToolCommand::new(ffprobe)
        .args(["-v", "quiet", "-print_format", "json", "-show_format"])
        .path_arg(path)
        .deadline(PROBE_DEADLINE)
        .execute()
        .await;

    let output = match result {
        Ok(out) => out,
        Err(e) => {
            tracing::warn!(input = %path.display(), error = %e, "Duration probe failed");
            return None;
        }
    };

    match parse_duration(&output.stdout) {
        Some(d) => Some(d),
        None => {
            tracing::warn!(
                input = %path.display(),
                "Duration probe returned no usable duration; proceeding without it"
            );
            None
        }
    }
}

/// Extract `format.duration` from ffprobe JSON output.
fn parse_duration(stdout: &str) -> Option<Duration> {
    let parsed: FfprobeOutput = serde_json::from_str(stdout).ok()?;
    let secs: f64 = parsed.format?.duration?.parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Some(Duration::from_secs_f64(secs))
}
