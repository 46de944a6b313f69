/// Workflow registry backed by the workflows directory
///
/// Provides lock-free reads of the in-memory workflow cache. Scans only add
/// workflows that are not cached yet; a cached workflow stays even if its
/// directory disappears, until an explicit [`WorkflowRegistry::rescan`].

use crate::workflow::{schema::load_workflow, types::Workflow};
use arc_swap::ArcSwap;
use std::{
    collections::{BTreeMap, HashMap},
    path::PathBuf,
    sync::Arc,
};

/// Cache of workflows discovered under a root directory
///
/// Uses ArcSwap so a scan swaps in a new map atomically while readers keep
/// whatever snapshot they already loaded.
#[derive(Debug)]
pub struct WorkflowRegistry {
    /// Key: workflow name (directory name), Value: loaded definition
    workflows: ArcSwap<HashMap<String, Arc<Workflow>>>,

    /// Directory scanned for workflow subdirectories
    root: PathBuf,
}

impl WorkflowRegistry {
    /// Create an empty registry over `root`; nothing is read until first access
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            workflows: ArcSwap::new(Arc::new(HashMap::new())),
            root: root.into(),
        }
    }

    /// All known workflows, after picking up any new directories
    pub fn list_workflows(&self) -> BTreeMap<String, Arc<Workflow>> {
        self.scan();
        self.workflows
            .load()
            .iter()
            .map(|(name, workflow)| (name.clone(), Arc::clone(workflow)))
            .collect()
    }

    /// Look up a workflow by name
    ///
    /// A miss triggers one scan for new directories before giving up, so a
    /// workflow dropped into the directory is launchable without listing first.
    pub fn get_workflow(&self, name: &str) -> Option<Arc<Workflow>> {
        if let Some(workflow) = self.workflows.load().get(name) {
            return Some(Arc::clone(workflow));
        }

        self.scan();
        self.workflows.load().get(name).cloned()
    }

    /// Load every uncached workflow directory, returning how many were added
    ///
    /// Directories that are not valid workflows are skipped silently.
    pub fn scan(&self) -> usize {
        let cached = self.workflows.load();
        let discovered: Vec<(String, Arc<Workflow>)> = self
            .candidate_dirs()
            .into_iter()
            .filter(|(name, _)| !cached.contains_key(name))
            .filter_map(|(name, path)| match load_workflow(&name, &path) {
                Ok(workflow) => Some((name, Arc::new(workflow))),
                Err(e) => {
                    tracing::debug!("Skipping workflow directory {}: {:#}", path.display(), e);
                    None
                }
            })
            .collect();
        drop(cached);

        if discovered.is_empty() {
            return 0;
        }

        let added = discovered.len();
        self.workflows.rcu(|current| {
            let mut next = (**current).clone();
            for (name, workflow) in &discovered {
                next.entry(name.clone()).or_insert_with(|| Arc::clone(workflow));
            }
            next
        });

        tracing::info!("📥 Registered {} new workflow(s) from {}", added, self.root.display());
        added
    }

    /// Drop the cache and reload every workflow from disk
    ///
    /// The only way a vanished workflow directory leaves the registry.
    pub fn rescan(&self) -> usize {
        self.workflows.store(Arc::new(HashMap::new()));
        self.scan();
        let count = self.workflows.load().len();
        tracing::info!("Rescanned workflow registry: {} workflow(s)", count);
        count
    }

    /// Immediate subdirectories of the root as `(name, path)` pairs
    fn candidate_dirs(&self) -> Vec<(String, PathBuf)> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Cannot read workflows directory {}: {}", self.root.display(), e);
                return Vec::new();
            }
        };

        entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .filter_map(|path| {
                let name = path.file_name()?.to_str()?.to_string();
                Some((name, path))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::schema::{MANIFEST_FILE, SCHEMA_FILE};
    use std::path::Path;
    use serde_json::json;
    use tempfile::tempdir;

    fn write_workflow(root: &Path, name: &str) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(MANIFEST_FILE), "workflow {}").unwrap();
        let schema = json!({
            "description": format!("{} workflow", name),
            "properties": { "out_dir": { "type": "string", "default": "output" } }
        });
        std::fs::write(dir.join(SCHEMA_FILE), schema.to_string()).unwrap();
    }

    #[test]
    fn broken_directories_are_silently_absent() {
        let root = tempdir().unwrap();
        write_workflow(root.path(), "demo");

        // No manifest
        std::fs::create_dir_all(root.path().join("no-manifest")).unwrap();
        // Manifest but empty schema
        let empty = root.path().join("empty-schema");
        std::fs::create_dir_all(&empty).unwrap();
        std::fs::write(empty.join(MANIFEST_FILE), "").unwrap();
        std::fs::write(empty.join(SCHEMA_FILE), "{}").unwrap();
        // Plain file at the top level
        std::fs::write(root.path().join("README"), "hello").unwrap();

        let registry = WorkflowRegistry::new(root.path());
        let workflows = registry.list_workflows();
        assert_eq!(workflows.keys().collect::<Vec<_>>(), vec!["demo"]);
        assert_eq!(workflows["demo"].desc, "demo workflow");
        assert!(registry.get_workflow("no-manifest").is_none());
    }

    #[test]
    fn get_picks_up_new_directories_on_miss() {
        let root = tempdir().unwrap();
        let registry = WorkflowRegistry::new(root.path());
        assert!(registry.get_workflow("late").is_none());

        write_workflow(root.path(), "late");
        let workflow = registry.get_workflow("late").unwrap();
        assert_eq!(workflow.path, root.path().join("late"));
    }

    #[test]
    fn removed_directories_stay_cached_until_rescan() {
        let root = tempdir().unwrap();
        write_workflow(root.path(), "demo");
        let registry = WorkflowRegistry::new(root.path());
        assert_eq!(registry.list_workflows().len(), 1);

        std::fs::remove_dir_all(root.path().join("demo")).unwrap();
        assert!(registry.get_workflow("demo").is_some());
        assert_eq!(registry.list_workflows().len(), 1);

        assert_eq!(registry.rescan(), 0);
        assert!(registry.get_workflow("demo").is_none());
    }

    #[test]
    fn cached_workflows_are_not_reloaded() {
        let root = tempdir().unwrap();
        write_workflow(root.path(), "demo");
        let registry = WorkflowRegistry::new(root.path());
        let before = registry.get_workflow("demo").unwrap();

        std::fs::write(
            root.path().join("demo").join(SCHEMA_FILE),
            json!({ "description": "changed", "properties": {} }).to_string(),
        )
        .unwrap();
        assert_eq!(registry.scan(), 0);
        let after = registry.get_workflow("demo").unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(after.desc, "demo workflow");
    }

    #[test]
    fn missing_root_yields_empty_registry() {
        let root = tempdir().unwrap();
        let registry = WorkflowRegistry::new(root.path().join("absent"));
        assert!(registry.list_workflows().is_empty());
    }
}
