//! External tool detection and management.
//!
//! The [`ToolRegistry`] discovers and caches the locations of ffmpeg and
//! ffprobe. Resolution order per tool: explicit override (config file or
//! environment) → platform well-known install directories → `PATH` lookup.
//! A tool that cannot be found is recorded as absent rather than failing
//! startup; [`ToolRegistry::require`] errors only when an invocation
//! actually needs the missing binary.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use tf_core::config::ToolsConfig;

/// Tool names the registry manages.
const KNOWN_TOOLS: &[&str] = &["ffmpeg", "ffprobe"];

/// Availability information for a tool, returned by [`ToolRegistry::check_all`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name.
    pub name: String,
    /// Whether the tool was found.
    pub available: bool,
    /// Version string (first line of `-version` output), if available.
    pub version: Option<String>,
    /// Resolved path to the executable.
    pub path: Option<PathBuf>,
}

/// Registry holding discovered tool locations.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, PathBuf>,
}

impl ToolRegistry {
    /// Discover tools using overrides from config, well-known install
    /// directories, and `PATH`.
    ///
    /// An override that does not point at an existing file falls through to
    /// the search, so a stale config entry degrades instead of breaking.
    pub fn discover(tools_config: &ToolsConfig) -> Self {
        let mut tools = HashMap::new();

        for &name in KNOWN_TOOLS {
            let override_path = match name {
                "ffmpeg" => tools_config.ffmpeg_path.as_deref(),
                "ffprobe" => tools_config.ffprobe_path.as_deref(),
                _ => None,
            };

            if let Some(path) = resolve(name, override_path) {
                tracing::debug!(tool = name, path = %path.display(), "Resolved external tool");
                tools.insert(name.to_string(), path);
            } else {
                tracing::warn!(tool = name, "Tool not found; transforms will fail until installed");
            }
        }

        Self { tools }
    }

    /// Build a registry from explicit paths, bypassing discovery.
    pub fn with_paths(entries: impl IntoIterator<Item = (String, PathBuf)>) -> Self {
        Self {
            tools: entries.into_iter().collect(),
        }
    }

    /// Return the resolved path for the given tool, or a tool error if it
    /// was not found during discovery.
    pub fn require(&self, name: &str) -> tf_core::Result<&Path> {
        self.tools
            .get(name)
            .map(PathBuf::as_path)
            .ok_or_else(|| {
                tf_core::Error::tool(name, format!("{name} not found; is it installed and in PATH?"))
            })
    }

    /// Check all known tools and return availability information.
    pub fn check_all(&self) -> Vec<ToolInfo> {
        KNOWN_TOOLS
            .iter()
            .map(|&name| match self.tools.get(name) {
                Some(path) => ToolInfo {
                    name: name.to_string(),
                    available: true,
                    version: detect_version(path),
                    path: Some(path.clone()),
                },
                None => ToolInfo {
                    name: name.to_string(),
                    available: false,
                    version: None,
                    path: None,
                },
            })
            .collect()
    }
}

/// Resolve one tool: override → well-known directories → `PATH`.
fn resolve(name: &str, override_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = override_path {
        if p.exists() {
            return Some(p.to_path_buf());
        }
        tracing::warn!(
            tool = name,
            path = %p.display(),
            "Configured tool path does not exist; falling back to search"
        );
    }

    let binary = binary_name(name);
    for dir in well_known_dirs() {
        let candidate = dir.join(&binary);
        if candidate.exists() {
            return Some(candidate);
        }
    }

    which::which(name).ok()
}

fn binary_name(name: &str) -> String {
    if cfg!(windows) {
        format!("{name}.exe")
    } else {
        name.to_string()
    }
}

/// Install directories checked before falling back to `PATH`.
fn well_known_dirs() -> Vec<PathBuf> {
    if cfg!(windows) {
        vec![
            PathBuf::from(r"C:\Program Files\ffmpeg\bin"),
            PathBuf::from(r"C:\ffmpeg\bin"),
        ]
    } else {
        vec![
            PathBuf::from("/usr/local/bin"),
            PathBuf::from("/opt/homebrew/bin"),
            PathBuf::from("/usr/bin"),
        ]
    }
}

/// Run `<tool> -version` and return the first line of stdout.
fn detect_version(path: &Path) -> Option<String> {
    let output = std::process::Command::new(path)
        .arg("-version")
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|s| s.to_string())
}
