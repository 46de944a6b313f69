/// Launcher: top-level orchestration of workflows and instances
///
/// Composes the workflow registry, the status store and the invoker. Lookups
/// return `Option`/empty results for unknown names and ids; only store and
/// filesystem failures surface as errors.

use crate::config::LauncherConfig;
use crate::instance::{Instance, InstanceStatus, InstanceSummary, StatusStore};
use crate::runtime::{process::shell_quote, Invoker};
use crate::workflow::{JsonSchemaValidator, SchemaValidator, Workflow, WorkflowRegistry};
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// Parameter coercion and output-directory rewrite
pub mod params;

/// Orchestrates workflow lookup, instance creation, launch and teardown
pub struct Launcher {
    config: LauncherConfig,
    registry: WorkflowRegistry,
    store: StatusStore,
    invoker: Invoker,
    validator: Box<dyn SchemaValidator>,
}

impl Launcher {
    /// Create the base directory layout, open the status store and set up the invoker
    pub async fn new(config: LauncherConfig) -> Result<Self> {
        for dir in [
            config.base_dir.clone(),
            config.instances_dir(),
            config.workflows_dir(),
        ] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory '{}'", dir.display()))?;
        }

        let store = StatusStore::open(&config.database_path())
            .await
            .context("Failed to open status store")?;

        let supervisor_bin = match &config.supervisor_bin {
            Some(path) => path.clone(),
            None => std::env::current_exe().context("Failed to locate supervisor executable")?,
        };
        tracing::debug!("Supervisor executable: {}", supervisor_bin.display());

        Ok(Self {
            registry: WorkflowRegistry::new(config.workflows_dir()),
            invoker: Invoker::new(store.clone(), supervisor_bin),
            validator: Box::new(JsonSchemaValidator),
            store,
            config,
        })
    }

    /// Replace the parameter validator
    pub fn with_validator(mut self, validator: impl SchemaValidator + 'static) -> Self {
        self.validator = Box::new(validator);
        self
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    pub fn store(&self) -> &StatusStore {
        &self.store
    }

    pub fn invoker(&self) -> &Invoker {
        &self.invoker
    }

    //
    // Workflows
    //

    pub fn get_workflows(&self) -> BTreeMap<String, Arc<Workflow>> {
        self.registry.list_workflows()
    }

    pub fn get_workflow(&self, name: &str) -> Option<Arc<Workflow>> {
        self.registry.get_workflow(name)
    }

    /// Forget cached workflows and reload them from disk
    pub fn rescan_workflows(&self) -> usize {
        self.registry.rescan()
    }

    //
    // Instances
    //

    pub async fn get_instances(&self) -> Result<BTreeMap<String, InstanceSummary>> {
        Ok(self
            .store
            .list()
            .await?
            .into_iter()
            .map(|instance| (instance.id.clone(), instance.summary()))
            .collect())
    }

    pub async fn get_instance(&self, id: &str) -> Result<Option<InstanceSummary>> {
        Ok(self.store.get(id).await?.map(|instance| instance.summary()))
    }

    /// Create the record, directory and `params.json` for a new run of `workflow`
    ///
    /// Returns the stored `UNKNOWN` record and the parameters as written.
    pub async fn create_instance(
        &self,
        workflow: &Workflow,
        params: Map<String, Value>,
    ) -> Result<(Instance, Map<String, Value>)> {
        let instance = Instance::new(&workflow.name, &self.config.instances_dir());
        self.store.put(&instance).await?;

        std::fs::create_dir_all(&instance.path).with_context(|| {
            format!("Failed to create instance directory '{}'", instance.path.display())
        })?;

        let params = params::prepare(params, &instance.path);
        write_params(&instance.params_file(), &params)?;

        tracing::info!("📁 Created instance {} of workflow {}", instance.id, workflow.name);
        Ok((instance, params))
    }

    /// Stop, remove and forget an instance; `false` when the id is unknown
    pub async fn delete_instance(&self, id: &str) -> Result<bool> {
        let Some(instance) = self.store.get(id).await? else {
            return Ok(false);
        };

        // Stop first so no pipeline keeps running without a record
        self.invoker.stop(id).await?;

        // The supervisor may have moved on since; act on the state actually deleted
        if let Some(removed) = self.store.delete(id).await? {
            self.invoker.stop_removed(&removed).await;
        }

        match std::fs::remove_dir_all(&instance.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                "Failed to remove instance directory {}: {}",
                instance.path.display(),
                e
            ),
        }

        tracing::info!("🗑️ Deleted instance {}", id);
        Ok(true)
    }

    /// Stop a running instance, returning its status (`None` for unknown ids)
    pub async fn stop_instance(&self, id: &str) -> Result<Option<InstanceStatus>> {
        self.invoker.stop(id).await
    }

    /// Launch a new instance of `workflow_name`
    ///
    /// `(false, None)` when the workflow is unknown; nothing is created then.
    /// `(false, Some(..))` when the instance was created but its supervisor
    /// could not be spawned; the instance is marked `ENCOUNTERED_ERROR`.
    pub async fn launch(
        &self,
        workflow_name: &str,
        params: Map<String, Value>,
    ) -> Result<(bool, Option<InstanceSummary>)> {
        let Some(workflow) = self.registry.get_workflow(workflow_name) else {
            tracing::warn!("Launch requested for unknown workflow: {}", workflow_name);
            return Ok((false, None));
        };

        let (instance, _params) = self.create_instance(&workflow, params).await?;
        let command = self.pre_launch(&workflow, &instance)?;

        if let Err(e) = self.invoker.start(&command, &instance.id).await {
            tracing::error!("❌ Failed to start instance {}: {:#}", instance.id, e);
            let failed = self
                .store
                .update_status(&instance.id, InstanceStatus::EncounteredError)
                .await?;
            return Ok((false, Some(failed.summary())));
        }

        Ok((true, Some(instance.summary())))
    }

    /// Touch the log file, create the output directory and build the pipeline command
    fn pre_launch(&self, workflow: &Workflow, instance: &Instance) -> Result<String> {
        let log_file = instance.log_file();
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .with_context(|| format!("Failed to create log file '{}'", log_file.display()))?;

        let out_dir = params::output_dir(&instance.path);
        std::fs::create_dir_all(&out_dir)
            .with_context(|| format!("Failed to create output directory '{}'", out_dir.display()))?;

        Ok(self.pipeline_command(workflow, instance, &out_dir))
    }

    fn pipeline_command(&self, workflow: &Workflow, instance: &Instance, out_dir: &Path) -> String {
        let quote = |path: PathBuf| shell_quote(&path.to_string_lossy());
        format!(
            "{} run {} -params-file {} -w {}",
            self.config.nextflow_bin,
            quote(workflow.entry_file()),
            quote(instance.params_file()),
            quote(out_dir.join("work")),
        )
    }

    //
    // Validation
    //

    /// Validate `params` layered over the workflow's defaults
    ///
    /// Works on a copy; the cached workflow is never touched.
    pub fn validate(
        &self,
        workflow: &Workflow,
        params: &Map<String, Value>,
    ) -> (bool, BTreeMap<String, String>) {
        let mut input = workflow.defaults.clone();
        input.extend(params.iter().map(|(key, value)| (key.clone(), value.clone())));

        let errors = self.validator.validate(&Value::Object(input), &workflow.schema);
        (!errors.is_empty(), errors)
    }

    //
    // Instance files
    //

    /// Lines of the captured pipeline output, trailing whitespace stripped
    pub async fn read_logs(&self, id: &str) -> Result<Option<Vec<String>>> {
        let Some(instance) = self.store.get(id).await? else {
            return Ok(None);
        };

        match std::fs::read_to_string(instance.log_file()) {
            Ok(text) => Ok(Some(text.lines().map(|line| line.trim_end().to_string()).collect())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).context("Failed to read instance log"),
        }
    }

    /// Parameters document written for the instance
    pub async fn read_params(&self, id: &str) -> Result<Option<Value>> {
        let Some(instance) = self.store.get(id).await? else {
            return Ok(None);
        };

        match std::fs::read_to_string(instance.params_file()) {
            Ok(text) => Ok(Some(
                serde_json::from_str(&text).context("Invalid instance params file")?,
            )),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).context("Failed to read instance params"),
        }
    }
}

/// Write `params` as JSON indented with four spaces
fn write_params(path: &Path, params: &Map<String, Value>) -> Result<()> {
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    params
        .serialize(&mut serializer)
        .context("Failed to serialize params")?;

    std::fs::write(path, buffer)
        .with_context(|| format!("Failed to write params file '{}'", path.display()))
}
