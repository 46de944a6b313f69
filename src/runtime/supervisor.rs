/// Supervisor routine executed inside the per-instance supervisor process
///
/// The supervisor owns the pipeline child and every status write for its
/// instance. It records its own pid, starts the pipeline with output appended to
/// the instance log, persists `LAUNCHED`, then waits for whichever comes first:
/// the pipeline exiting or an interrupt. The terminal status is persisted before
/// the process exits.

use crate::instance::{Instance, InstanceStatus, StatusStore};
use crate::runtime::process::{detach, kill_group, shell_command};
use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::process::Child;

/// Pipeline finished successfully, or was terminated on request
pub const EXIT_OK: i32 = 0;
/// Pipeline failed, or the supervisor hit an internal fault
pub const EXIT_FAILURE: i32 = 1;
/// The instance record does not exist; nothing was started
pub const EXIT_MISSING_RECORD: i32 = 2;

/// Everything the supervisor process needs, as passed on its command line
#[derive(Debug, Clone)]
pub struct SuperviseRequest {
    pub id: String,
    pub database: PathBuf,
    pub command: String,
}

/// How the wait on the pipeline ended
#[derive(Debug)]
enum Outcome {
    Exited(ExitStatus),
    Interrupted,
}

/// Run the supervisor routine to completion and return the process exit code
pub async fn supervise(request: &SuperviseRequest) -> i32 {
    let store = match StatusStore::open(&request.database).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Cannot open status store {}: {}", request.database.display(), e);
            return EXIT_FAILURE;
        }
    };

    let instance = match store.get(&request.id).await {
        Ok(Some(instance)) => instance,
        Ok(None) => {
            tracing::error!("Instance {} not found; refusing to start", request.id);
            return EXIT_MISSING_RECORD;
        }
        Err(e) => {
            tracing::error!("Cannot read instance {}: {}", request.id, e);
            return EXIT_FAILURE;
        }
    };

    tracing::info!("Initialising workflow for instance {}", instance.id);
    tracing::info!("Command: {}", request.command);

    match run_pipeline(&store, &instance, &request.command).await {
        Ok(outcome) => finish(&store, &instance.id, outcome).await,
        Err(e) => {
            tracing::error!("Workflow encountered an error: {:#}", e);
            persist(&store, &instance.id, InstanceStatus::EncounteredError).await;
            EXIT_FAILURE
        }
    }
}

async fn run_pipeline(store: &StatusStore, instance: &Instance, command: &str) -> Result<Outcome> {
    let pid = std::process::id();
    tracing::info!("The supervisor PID is {}", pid);
    store
        .set_pid(&instance.id, i64::from(pid))
        .await
        .context("Failed to record supervisor pid")?;

    // Listen before LAUNCHED is visible: stop() only signals LAUNCHED instances
    let mut interrupt = Interrupt::install().context("Failed to install interrupt handler")?;

    let mut child = spawn_pipeline(instance, command)?;
    tracing::info!("The workflow PID is {:?}", child.id());

    if let Err(e) = store.update_status(&instance.id, InstanceStatus::Launched).await {
        kill_pipeline(&mut child).await;
        return Err(e).context("Failed to persist LAUNCHED");
    }

    tokio::select! {
        biased;
        _ = interrupt.recv() => {
            tracing::info!("Interrupt detected: terminating workflow");
            kill_pipeline(&mut child).await;
            Ok(Outcome::Interrupted)
        }
        status = child.wait() => {
            let status = status.context("Failed waiting for workflow")?;
            Ok(Outcome::Exited(status))
        }
    }
}

fn spawn_pipeline(instance: &Instance, command: &str) -> Result<Child> {
    let log_path = instance.log_file();
    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file '{}'", log_path.display()))?;
    let log_err = log
        .try_clone()
        .context("Failed to duplicate log file handle")?;

    let mut pipeline = shell_command(command);
    pipeline
        .current_dir(&instance.path)
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err));
    detach(&mut pipeline);

    pipeline.spawn().context("Failed to launch workflow")
}

/// Kill the pipeline's whole process group, then reap the direct child
async fn kill_pipeline(child: &mut Child) {
    if let Some(pid) = child.id() {
        if let Err(e) = kill_group(i64::from(pid)) {
            tracing::debug!("killpg({}) failed: {}", pid, e);
        }
    }
    if let Err(e) = child.kill().await {
        tracing::debug!("Workflow already gone: {}", e);
    }
}

async fn finish(store: &StatusStore, id: &str, outcome: Outcome) -> i32 {
    let (status, code) = match outcome {
        Outcome::Interrupted => (InstanceStatus::Terminated, EXIT_OK),
        Outcome::Exited(exit) if exit.success() => {
            tracing::info!("Workflow completed");
            (InstanceStatus::CompletedSuccessfully, EXIT_OK)
        }
        Outcome::Exited(exit) => {
            tracing::info!("Workflow encountered an error: {}", exit);
            (InstanceStatus::EncounteredError, EXIT_FAILURE)
        }
    };

    if persist(store, id, status).await {
        code
    } else {
        EXIT_FAILURE
    }
}

/// Best-effort terminal write; the supervisor exits either way
async fn persist(store: &StatusStore, id: &str, status: InstanceStatus) -> bool {
    match store.update_status(id, status).await {
        Ok(_) => true,
        Err(e) => {
            tracing::error!("Failed to persist {} for {}: {}", status, id, e);
            false
        }
    }
}

/// SIGINT (and SIGTERM) delivered to the supervisor
#[cfg(unix)]
struct Interrupt {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Interrupt {
    fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    async fn recv(&mut self) {
        tokio::select! {
            _ = self.interrupt.recv() => {}
            _ = self.terminate.recv() => {}
        }
    }
}

#[cfg(not(unix))]
struct Interrupt;

#[cfg(not(unix))]
impl Interrupt {
    fn install() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn seeded(dir: &std::path::Path) -> (StatusStore, Instance) {
        let store = StatusStore::open(&dir.join("db.sqlite")).await.unwrap();
        let instance = Instance::new("demo", dir);
        std::fs::create_dir_all(&instance.path).unwrap();
        store.put(&instance).await.unwrap();
        (store, instance)
    }

    fn request(store: &StatusStore, id: &str, command: &str) -> SuperviseRequest {
        SuperviseRequest {
            id: id.to_string(),
            database: store.path().to_path_buf(),
            command: command.to_string(),
        }
    }

    #[tokio::test]
    async fn missing_record_exits_without_running() {
        let dir = tempdir().unwrap();
        let (store, _) = seeded(dir.path()).await;
        let marker = dir.path().join("ran");
        let command = format!("touch {}", marker.display());

        let code = supervise(&request(&store, "missing", &command)).await;
        assert_eq!(code, EXIT_MISSING_RECORD);
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn successful_pipeline_completes() {
        let dir = tempdir().unwrap();
        let (store, instance) = seeded(dir.path()).await;

        let code = supervise(&request(&store, &instance.id, "echo hello; echo oops >&2")).await;
        assert_eq!(code, EXIT_OK);

        let stored = store.get(&instance.id).await.unwrap().unwrap();
        assert_eq!(stored.status, InstanceStatus::CompletedSuccessfully);
        assert_eq!(stored.pid, Some(i64::from(std::process::id())));

        let log = std::fs::read_to_string(instance.log_file()).unwrap();
        assert!(log.contains("hello"));
        assert!(log.contains("oops"));
    }

    #[tokio::test]
    async fn failing_pipeline_records_error() {
        let dir = tempdir().unwrap();
        let (store, instance) = seeded(dir.path()).await;

        let code = supervise(&request(&store, &instance.id, "exit 2")).await;
        assert_eq!(code, EXIT_FAILURE);

        let stored = store.get(&instance.id).await.unwrap().unwrap();
        assert_eq!(stored.status, InstanceStatus::EncounteredError);
    }

    #[tokio::test]
    async fn log_output_is_appended() {
        let dir = tempdir().unwrap();
        let (store, instance) = seeded(dir.path()).await;
        std::fs::write(instance.log_file(), "existing\n").unwrap();

        supervise(&request(&store, &instance.id, "echo appended")).await;
        let log = std::fs::read_to_string(instance.log_file()).unwrap();
        assert!(log.starts_with("existing\n"));
        assert!(log.contains("appended"));
    }
}
