/// Invoker: starts and stops supervisor processes
///
/// `start` spawns one detached supervisor process per instance and returns
/// immediately. `stop` signals the supervisor recorded in the status store.
/// The in-memory handle map only lets `stop` wait for a supervisor this process
/// spawned itself; after a restart the persisted pid is all there is.

use crate::instance::{Instance, InstanceStatus, StatusStore};
use crate::runtime::process::{daemonize, send_interrupt};
use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

/// Subcommand of the supervisor executable that runs the supervisor routine
pub const SUPERVISE_SUBCOMMAND: &str = "supervise";

/// Local process invoker backed by the shared status store
#[derive(Debug)]
pub struct Invoker {
    /// Status store the supervisors update; also the source of truth for `stop`
    store: StatusStore,
    /// Executable exposing the `supervise` subcommand
    supervisor_bin: PathBuf,
    /// Supervisors spawned by this process, keyed by instance id
    processes: Mutex<HashMap<String, Child>>,
}

impl Invoker {
    pub fn new(store: StatusStore, supervisor_bin: impl Into<PathBuf>) -> Self {
        Self {
            store,
            supervisor_bin: supervisor_bin.into(),
            processes: Mutex::new(HashMap::new()),
        }
    }

    /// Spawn a supervisor that runs `command` for instance `id`
    ///
    /// The supervisor runs in its own session so it outlives this process and is
    /// not hit by signals or a hangup aimed at it. Its stdout/stderr append to the
    /// instance log.
    pub async fn start(&self, command: &str, id: &str) -> Result<String> {
        let instance = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| anyhow!("Instance not found: {}", id))?;

        let log_path = instance.log_file();
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("Failed to open log file '{}'", log_path.display()))?;
        let log_err = log.try_clone().context("Failed to duplicate log file handle")?;

        let mut supervisor = Command::new(&self.supervisor_bin);
        supervisor
            .arg(SUPERVISE_SUBCOMMAND)
            .arg("--id")
            .arg(id)
            .arg("--database")
            .arg(self.store.path())
            .arg("--command")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));
        daemonize(&mut supervisor);

        let child = supervisor.spawn().with_context(|| {
            format!(
                "Failed to spawn supervisor '{}' for instance {}",
                self.supervisor_bin.display(),
                id
            )
        })?;
        tracing::info!("🚀 Spawned supervisor for instance {} (pid {:?})", id, child.id());

        let mut processes = self.processes.lock().await;
        // Drop handles of supervisors that already exited so the map stays small
        processes.retain(|_, handle| matches!(handle.try_wait(), Ok(None)));
        processes.insert(id.to_string(), child);

        Ok(id.to_string())
    }

    /// Ask the supervisor of instance `id` to terminate its pipeline
    ///
    /// Returns `None` for an unknown id. Instances that are not `LAUNCHED` are
    /// left alone and their status returned unchanged. When this process spawned
    /// the supervisor, waits for it to exit so the returned status is final;
    /// otherwise the caller may briefly still see `LAUNCHED`.
    pub async fn stop(&self, id: &str) -> Result<Option<InstanceStatus>> {
        let Some(instance) = self.store.get(id).await? else {
            return Ok(None);
        };

        if instance.status != InstanceStatus::Launched {
            tracing::debug!("Instance {} is {}; nothing to stop", id, instance.status);
            return Ok(Some(instance.status));
        }

        self.interrupt(&instance).await;
        Ok(self.store.get(id).await?.map(|instance| instance.status))
    }

    /// Stop the supervisor of a record that was just deleted
    ///
    /// Covers a supervisor that persisted `LAUNCHED` after `stop` last looked.
    /// One still on `UNKNOWN` needs nothing: its `LAUNCHED` write fails on the
    /// missing record and it kills its own pipeline.
    pub async fn stop_removed(&self, removed: &Instance) {
        if removed.status == InstanceStatus::Launched {
            tracing::warn!("Instance {} was LAUNCHED when deleted; stopping it", removed.id);
            self.interrupt(removed).await;
        } else {
            self.processes.lock().await.remove(&removed.id);
        }
    }

    /// Signal the recorded supervisor and wait for it when it is ours
    async fn interrupt(&self, instance: &Instance) {
        let id = &instance.id;
        match instance.pid {
            Some(pid) => match send_interrupt(pid) {
                Ok(()) => tracing::info!("⏹️ Sent interrupt to supervisor {} of instance {}", pid, id),
                Err(e) => tracing::debug!("Supervisor {} of instance {} not signalled: {}", pid, id, e),
            },
            None => tracing::warn!("Instance {} is LAUNCHED without a recorded pid", id),
        }

        let local = self.processes.lock().await.remove(id);
        if let Some(mut child) = local {
            match child.wait().await {
                Ok(status) => tracing::debug!("Supervisor of instance {} exited: {}", id, status),
                Err(e) => tracing::warn!("Failed waiting on supervisor of instance {}: {}", id, e),
            }
        }
    }

    /// Whether this process holds a handle for the supervisor of `id`
    pub async fn has_local_handle(&self, id: &str) -> bool {
        self.processes.lock().await.contains_key(id)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::time::Duration;
    use tempfile::tempdir;

    async fn invoker(dir: &std::path::Path) -> Invoker {
        let store = StatusStore::open(&dir.join("db.sqlite")).await.unwrap();
        Invoker::new(store, "/nonexistent/supervisor")
    }

    fn removed_record(dir: &std::path::Path, child: &Child, status: InstanceStatus) -> Instance {
        let mut instance = Instance::new("demo", dir);
        instance.pid = child.id().map(i64::from);
        instance.status = status;
        instance
    }

    #[tokio::test]
    async fn stop_removed_interrupts_launched_supervisor() {
        let dir = tempdir().unwrap();
        let invoker = invoker(dir.path()).await;
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();

        let removed = removed_record(dir.path(), &child, InstanceStatus::Launched);
        invoker.stop_removed(&removed).await;

        let status = tokio::time::timeout(Duration::from_secs(10), child.wait())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status.signal(), Some(libc::SIGINT));
    }

    #[tokio::test]
    async fn stop_removed_leaves_unlaunched_supervisor_alone() {
        let dir = tempdir().unwrap();
        let invoker = invoker(dir.path()).await;
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();

        let removed = removed_record(dir.path(), &child, InstanceStatus::Unknown);
        invoker.stop_removed(&removed).await;

        assert!(matches!(child.try_wait(), Ok(None)));
        child.kill().await.unwrap();
    }

    #[tokio::test]
    async fn stop_of_unknown_id_is_none() {
        let dir = tempdir().unwrap();
        let invoker = invoker(dir.path()).await;
        assert!(invoker.stop("missing").await.unwrap().is_none());
    }
}
