/// Configuration management for the Nextflow launcher
///
/// Handles server configuration, the on-disk layout under the base directory,
/// and the executables used to run and supervise pipelines.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// File name of the status store inside the base directory
pub const DATABASE_FILE: &str = "db.sqlite";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Launcher configuration
    pub launcher: LauncherConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "127.0.0.1")
    pub host: String,
    /// Server port number
    pub port: u16,
}

/// Filesystem layout and executables for launching instances
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LauncherConfig {
    /// Base directory holding `instances/`, `workflows/` and `db.sqlite`
    pub base_dir: PathBuf,
    /// Executable invoked as `<nextflow> run ...` for every instance
    pub nextflow_bin: String,
    /// Executable providing the `supervise` subcommand.
    /// Falls back to the currently running executable when unset.
    pub supervisor_bin: Option<PathBuf>,
}

impl LauncherConfig {
    /// Build a launcher configuration rooted at `base_dir` with default executables
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            nextflow_bin: "nextflow".to_string(),
            supervisor_bin: None,
        }
    }

    /// Directory holding one `<workflow>-<id>` directory per instance
    pub fn instances_dir(&self) -> PathBuf {
        self.base_dir.join("instances")
    }

    /// Directory scanned for workflow definitions
    pub fn workflows_dir(&self) -> PathBuf {
        self.base_dir.join("workflows")
    }

    /// Path of the shared status store file
    pub fn database_path(&self) -> PathBuf {
        self.base_dir.join(DATABASE_FILE)
    }
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for container deployment
    fn default() -> Self {
        let base_dir = std::env::var("NF_LAUNCHER_BASE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                std::env::current_dir()
                    .unwrap_or_else(|_| PathBuf::from("."))
                    .join("epi2melabs")
            });

        Self {
            server: ServerConfig {
                host: std::env::var("NF_LAUNCHER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                port: std::env::var("NF_LAUNCHER_PORT")
                    .unwrap_or_else(|_| "9021".to_string())
                    .parse()
                    .unwrap_or(9021),
            },
            launcher: LauncherConfig {
                base_dir,
                nextflow_bin: std::env::var("NF_LAUNCHER_NEXTFLOW")
                    .unwrap_or_else(|_| "nextflow".to_string()),
                supervisor_bin: std::env::var("NF_LAUNCHER_SUPERVISOR").ok().map(PathBuf::from),
            },
        }
    }
}
