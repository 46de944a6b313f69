/// Instance type definitions
///
/// An instance is the durable record of one pipeline run. The record is owned by
/// the status store; everything else holds only the instance `id` and re-fetches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

/// Parameters document written into every instance directory
pub const PARAMS_FILE: &str = "params.json";

/// Combined pipeline output captured by the supervisor
pub const LOG_FILE: &str = "nextflow.stdout";

/// Lifecycle state of an instance
///
/// Only `UNKNOWN -> LAUNCHED -> terminal` is a legal path, plus
/// `UNKNOWN -> ENCOUNTERED_ERROR` when the pipeline could not be started at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    Unknown,
    Launched,
    CompletedSuccessfully,
    EncounteredError,
    Terminated,
}

impl InstanceStatus {
    pub const ALL: [InstanceStatus; 5] = [
        InstanceStatus::Unknown,
        InstanceStatus::Launched,
        InstanceStatus::CompletedSuccessfully,
        InstanceStatus::EncounteredError,
        InstanceStatus::Terminated,
    ];

    /// Wire representation, also used as the stored column value
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Unknown => "UNKNOWN",
            InstanceStatus::Launched => "LAUNCHED",
            InstanceStatus::CompletedSuccessfully => "COMPLETED_SUCCESSFULLY",
            InstanceStatus::EncounteredError => "ENCOUNTERED_ERROR",
            InstanceStatus::Terminated => "TERMINATED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InstanceStatus::CompletedSuccessfully
                | InstanceStatus::EncounteredError
                | InstanceStatus::Terminated
        )
    }

    /// Whether a record currently in `self` may be moved to `next`
    pub fn can_transition_to(&self, next: InstanceStatus) -> bool {
        match (self, next) {
            (InstanceStatus::Unknown, InstanceStatus::Launched) => true,
            (InstanceStatus::Unknown, InstanceStatus::EncounteredError) => true,
            (InstanceStatus::Launched, next) => next.is_terminal(),
            _ => false,
        }
    }

    /// Every status from which `next` is reachable in one step
    pub fn predecessors(next: InstanceStatus) -> Vec<InstanceStatus> {
        Self::ALL
            .into_iter()
            .filter(|status| status.can_transition_to(next))
            .collect()
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| format!("unknown instance status: {}", value))
    }
}

/// Durable record of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    /// Short collision-resistant identifier
    pub id: String,
    /// OS pid of the supervisor process, set once it has started
    pub pid: Option<i64>,
    /// Dedicated `<workflow>-<id>` directory under the instances root
    pub path: PathBuf,
    /// Name of the workflow that produced this instance
    pub workflow: String,
    pub status: InstanceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Instance {
    /// Create a fresh `UNKNOWN` record for a run of `workflow` under `instances_dir`
    pub fn new(workflow: &str, instances_dir: &Path) -> Self {
        let id = generate_id();
        let path = instances_dir.join(format!("{}-{}", workflow, id));
        let now = Utc::now();
        Self {
            id,
            pid: None,
            path,
            workflow: workflow.to_string(),
            status: InstanceStatus::Unknown,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn params_file(&self) -> PathBuf {
        self.path.join(PARAMS_FILE)
    }

    pub fn log_file(&self) -> PathBuf {
        self.path.join(LOG_FILE)
    }

    /// External projection consumed by the HTTP layer
    pub fn summary(&self) -> InstanceSummary {
        InstanceSummary {
            id: self.id.clone(),
            pid: self.pid,
            path: self.path.to_string_lossy().into_owned(),
            status: self.status,
            workflow: self.workflow.clone(),
        }
    }
}

/// External projection of an instance: exactly `id, pid, path, status, workflow`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSummary {
    pub id: String,
    pub pid: Option<i64>,
    pub path: String,
    pub status: InstanceStatus,
    pub workflow: String,
}

const ID_ALPHABET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
const ID_LENGTH: usize = 22;

/// Generate a short unique identifier
///
/// Encodes a random v4 UUID in a 57-character alphabet without look-alike glyphs,
/// giving 22 characters that are safe in paths and URL segments.
pub fn generate_id() -> String {
    let base = ID_ALPHABET.len() as u128;
    let mut value = Uuid::new_v4().as_u128();
    let mut encoded = Vec::with_capacity(ID_LENGTH);

    for _ in 0..ID_LENGTH {
        encoded.push(ID_ALPHABET[(value % base) as usize]);
        value /= base;
    }
    encoded.reverse();

    String::from_utf8_lossy(&encoded).into_owned()
}
