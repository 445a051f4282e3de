//! Shared test harness for integration tests.
//!
//! Builds a full [`AppContext`] against shell-script stand-ins for ffmpeg
//! and ffprobe, and starts the router on a random port for HTTP-level
//! testing. The scratch directory owns both the fake tools and the artifact
//! store, so asserting "no artifacts left behind" is a directory listing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempoforge::jobs::JobRegistry;
use tempoforge::server::{create_router, AppContext};
use tf_av::{ArtifactStore, ToolRegistry};
use tf_core::config::Config;

/// Test harness wrapping a fully-constructed [`AppContext`].
pub struct TestHarness {
    pub ctx: AppContext,
    /// Owns the scratch directory for artifacts and fake tools.
    pub temp: tempfile::TempDir,
}

impl TestHarness {
    /// Create a harness with the given configuration and tool registry.
    ///
    /// The configured temp dir is ignored; artifacts go under the harness's
    /// scratch directory.
    pub fn new(mut config: Config, tools: ToolRegistry) -> Self {
        let temp = tempfile::tempdir().expect("failed to create scratch dir");
        let artifact_root = temp.path().join("artifacts");
        config.server.temp_dir = Some(artifact_root.clone());

        let artifacts =
            ArtifactStore::new(&artifact_root).expect("failed to create artifact store");
        let registry = JobRegistry::new(&config, artifacts.clone());

        let ctx = AppContext {
            config: Arc::new(config),
            tools: Arc::new(tools),
            artifacts,
            registry,
        };

        Self { ctx, temp }
    }

    /// Start an Axum server on a random port and return the harness together
    /// with the bound socket address.
    pub async fn with_server(config: Config, tools: ToolRegistry) -> (Self, SocketAddr) {
        let harness = Self::new(config, tools);
        let app = create_router(harness.ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (harness, addr)
    }

    /// Directory where this harness's fake tools live.
    pub fn tool_dir(&self) -> PathBuf {
        self.temp.path().to_path_buf()
    }

    /// Number of artifacts currently on disk.
    pub fn artifact_count(&self) -> usize {
        std::fs::read_dir(self.ctx.artifacts.root())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    /// Wait until the artifact directory is empty, failing after `timeout`.
    ///
    /// Cleanup on the streaming path happens when the response body drops,
    /// slightly after the client finishes reading, so tests poll briefly.
    pub async fn wait_for_empty_artifacts(&self, timeout: Duration) {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if self.artifact_count() == 0 {
                return;
            }
            assert!(
                std::time::Instant::now() < deadline,
                "artifacts still on disk: {:?}",
                std::fs::read_dir(self.ctx.artifacts.root())
                    .map(|d| d.filter_map(|e| e.ok()).map(|e| e.file_name()).collect::<Vec<_>>())
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

/// Config for the degraded synchronous mode (queue disabled at startup).
pub fn sync_config() -> Config {
    let mut config = Config::default();
    config.queue.enabled = false;
    config.queue.workers = 0;
    config
}

/// Write an executable shell script to stand in for an external tool.
pub fn fake_tool(dir: &Path, name: &str, script: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, script).expect("failed to write fake tool");
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// An ffmpeg stand-in that copies the input (the value after `-i`) to the
/// output (the final argument).
pub fn copying_ffmpeg(dir: &Path) -> PathBuf {
    fake_tool(
        dir,
        "ffmpeg",
        concat!(
            "#!/bin/sh\n",
            "in=\"\"; out=\"\"; prev=\"\"\n",
            "for a in \"$@\"; do\n",
            "  if [ \"$prev\" = \"-i\" ]; then in=\"$a\"; fi\n",
            "  prev=\"$a\"; out=\"$a\"\n",
            "done\n",
            "cp \"$in\" \"$out\"\n",
        ),
    )
}

/// An ffmpeg stand-in that writes nothing, complains, and exits non-zero.
pub fn failing_ffmpeg(dir: &Path) -> PathBuf {
    fake_tool(
        dir,
        "ffmpeg",
        "#!/bin/sh\necho 'Error while filtering: synthetic failure' >&2\nexit 1\n",
    )
}

/// An ffprobe stand-in that reports a fixed duration for any input.
pub fn fixed_duration_ffprobe(dir: &Path, secs: f64) -> PathBuf {
    fake_tool(
        dir,
        "ffprobe",
        &format!("#!/bin/sh\necho '{{\"format\": {{\"duration\": \"{secs}\"}}}}'\n"),
    )
}

/// An ffprobe stand-in whose output carries no duration.
pub fn silent_ffprobe(dir: &Path) -> PathBuf {
    fake_tool(dir, "ffprobe", "#!/bin/sh\necho '{\"format\": {}}'\n")
}

/// A registry with just a copying ffmpeg (no ffprobe: the guard goes
/// permissive).
pub fn copying_tools(dir: &Path) -> ToolRegistry {
    ToolRegistry::with_paths([("ffmpeg".to_string(), copying_ffmpeg(dir))])
}
