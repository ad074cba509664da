//! Plugin registry and dependency-resolved execution.

use crate::defaults::{PLUGIN_SUITE_EXTENSION, PLUGIN_WORKERS};
use crate::error::{ConvoscribeError, Result};
use crate::pipeline::component::Runtime;
use crate::pipeline::error::{ErrorReporter, LogReporter};
use crate::plugins::config::{PluginCatalog, PluginConfig, PluginSuite};
use crate::plugins::plugin::{ApplyConfig, DependencyOutputs, Plugin, PluginValue};
use crate::plugins::summary::{PluginManagerSummary, PluginRecord, PluginStatus};
use crate::pool::worker_pool::panic_message;
use crate::pool::{PoolError, TaskError, WorkerPool};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

struct RegisteredPlugin {
    config: PluginConfig,
    plugin: Arc<dyn Plugin>,
}

/// Read-only description of a registered plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginDetails {
    pub name: String,
    pub dependencies: Vec<String>,
    pub module: Option<String>,
    pub entry: String,
}

/// One plugin dispatched to the pool.
struct Dispatch {
    plugin: Arc<dyn Plugin>,
    dependency_outputs: DependencyOutputs,
    input: ApplyConfig,
}

/// What came back from one dispatched plugin.
struct Run {
    output: std::result::Result<PluginValue, String>,
    accepted: bool,
    runtime: Runtime,
}

/// Registers plugins and applies requested subsets of them to payloads.
pub struct PluginManager {
    plugins: BTreeMap<String, RegisteredPlugin>,
    catalog: PluginCatalog,
    workers: usize,
    error_reporter: Arc<dyn ErrorReporter>,
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new(PluginCatalog::with_builtins())
    }
}

impl PluginManager {
    /// Creates a manager resolving entry points through `catalog`.
    pub fn new(catalog: PluginCatalog) -> Self {
        Self {
            plugins: BTreeMap::new(),
            catalog,
            workers: PLUGIN_WORKERS,
            error_reporter: Arc::new(LogReporter),
        }
    }

    /// Maximum number of plugins run at once per `apply_plugins` call.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Sets a custom error reporter for plugin failures.
    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.error_reporter = reporter;
        self
    }

    pub fn catalog(&self) -> &PluginCatalog {
        &self.catalog
    }

    /// Registers an already-built plugin under `config.name`.
    ///
    /// Re-registering an existing name is rejected and leaves the registered
    /// plugin in place.
    pub fn register_plugin(
        &mut self,
        config: PluginConfig,
        plugin: Arc<dyn Plugin>,
    ) -> Result<String> {
        config.validate()?;
        if self.plugins.contains_key(&config.name) {
            return Err(ConvoscribeError::DuplicatePlugin { name: config.name });
        }
        let name = config.name.clone();
        tracing::debug!(plugin = %name, dependencies = ?config.dependencies, "registered plugin");
        self.plugins
            .insert(name.clone(), RegisteredPlugin { config, plugin });
        Ok(name)
    }

    /// Registers a plugin described by configuration data, building it through
    /// the catalog.
    pub fn register_plugin_using_config_data(&mut self, config: PluginConfig) -> Result<String> {
        config.validate()?;
        if self.plugins.contains_key(&config.name) {
            return Err(ConvoscribeError::DuplicatePlugin { name: config.name });
        }
        let plugin = self.catalog.build(&config)?;
        self.register_plugin(config, plugin)
    }

    /// Registers each record; a failing record is logged and skipped.
    ///
    /// Returns the names that were newly added.
    pub fn register_plugins(&mut self, configs: Vec<PluginConfig>) -> Vec<String> {
        let mut added = Vec::new();
        for config in configs {
            let name = config.name.clone();
            match self.register_plugin_using_config_data(config) {
                Ok(name) => added.push(name),
                Err(error) => {
                    tracing::warn!(plugin = %name, %error, "plugin registration failed, skipping")
                }
            }
        }
        added
    }

    /// Registers every plugin in one suite file.
    pub fn register_plugins_from_file(&mut self, path: &Path) -> Result<Vec<String>> {
        let suite = PluginSuite::load(path)?;
        Ok(self.register_plugins(suite.plugins))
    }

    /// Scans `directory` for plugin suite files and registers their plugins.
    ///
    /// Files are visited in name order. A malformed file, or a failing plugin in
    /// a file, is logged and skipped without aborting the scan. Only an
    /// unreadable directory is an error.
    pub fn register_plugins_from_directory(&mut self, directory: &Path) -> Result<Vec<String>> {
        let mut files: Vec<PathBuf> = fs::read_dir(directory)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .is_some_and(|ext| ext == PLUGIN_SUITE_EXTENSION)
            })
            .collect();
        files.sort();

        let mut added = Vec::new();
        for file in files {
            match PluginSuite::load(&file) {
                Ok(suite) => added.extend(self.register_plugins(suite.plugins)),
                Err(error) => {
                    tracing::warn!(file = %file.display(), %error, "skipping plugin suite file")
                }
            }
        }
        tracing::info!(
            directory = %directory.display(),
            added = added.len(),
            "plugin directory scanned"
        );
        Ok(added)
    }

    pub fn is_plugin(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    /// Registered plugin names, sorted.
    pub fn plugin_names(&self) -> Vec<String> {
        self.plugins.keys().cloned().collect()
    }

    /// Registration details, or `None` for an unknown name.
    pub fn plugin_details(&self, name: &str) -> Option<PluginDetails> {
        self.plugins.get(name).map(|registered| PluginDetails {
            name: registered.config.name.clone(),
            dependencies: registered.config.dependencies.clone(),
            module: registered.config.module.clone(),
            entry: registered.config.entry.clone(),
        })
    }

    pub fn plugin_dependencies(&self, name: &str) -> Option<&[String]> {
        self.plugins
            .get(name)
            .map(|registered| registered.config.dependencies.as_slice())
    }

    /// Applies the requested plugins to one payload.
    ///
    /// Only the declared dependency graph restricted to the requested names is
    /// considered. A plugin runs once every dependency it declares was requested
    /// and succeeded; otherwise it is skipped without being invoked. Plugins
    /// whose dependencies are settled run concurrently on a pool started for
    /// this call (only when a wave has several ready plugins), and the call returns
    /// once every requested plugin reached an outcome. Failures never escape as
    /// errors; they are reported in the summary.
    pub fn apply_plugins(&self, requested: BTreeMap<String, ApplyConfig>) -> PluginManagerSummary {
        let started = Instant::now();
        let mut summary = PluginManagerSummary::default();
        let mut pending: BTreeSet<String> = BTreeSet::new();

        for name in requested.keys() {
            if self.is_plugin(name) {
                pending.insert(name.clone());
            } else {
                self.skip(&mut summary, name, format!("plugin '{name}' is not registered"));
            }
        }

        let mut pool: Option<WorkerPool<usize>> = None;

        while !pending.is_empty() {
            self.skip_blocked(&mut summary, &mut pending, &requested);

            let ready: Vec<String> = pending
                .iter()
                .filter(|name| {
                    self.declared_dependencies(name).iter().all(|dep| {
                        summary
                            .records
                            .get(dep)
                            .is_some_and(|record| record.status == PluginStatus::Successful)
                    })
                })
                .cloned()
                .collect();
            if ready.is_empty() {
                break;
            }

            let dispatches: Vec<Dispatch> = ready
                .iter()
                .filter_map(|name| {
                    let registered = self.plugins.get(name)?;
                    let dependency_outputs = registered
                        .config
                        .dependencies
                        .iter()
                        .filter_map(|dep| summary.output(dep).map(|o| (dep.clone(), o.clone())))
                        .collect();
                    let mut input = requested.get(name)?.clone();
                    input.plugin_name = name.clone();
                    Some(Dispatch {
                        plugin: Arc::clone(&registered.plugin),
                        dependency_outputs,
                        input,
                    })
                })
                .collect();

            tracing::debug!(plugins = ?ready, "dispatching plugins");
            let runs = self.run_wave(&mut pool, dispatches, pending.len());
            for (index, name) in ready.iter().enumerate() {
                pending.remove(name);
                let record = match runs.as_ref().map(|runs| runs.get(index)) {
                    Ok(Some(Ok(run))) => match &run.output {
                        Ok(output) if run.accepted => {
                            PluginRecord::successful(output.clone(), run.runtime)
                        }
                        Ok(output) => PluginRecord::failed(
                            Some(output.clone()),
                            run.runtime,
                            "plugin reported an unsuccessful run".to_string(),
                        ),
                        Err(error) => PluginRecord::failed(None, run.runtime, error.clone()),
                    },
                    Ok(Some(Err(error))) => {
                        PluginRecord::failed(None, Runtime::ZERO, error.to_string())
                    }
                    Ok(None) => PluginRecord::failed(
                        None,
                        Runtime::ZERO,
                        "plugin was not dispatched".to_string(),
                    ),
                    Err(error) => PluginRecord::failed(None, Runtime::ZERO, error.to_string()),
                };
                if let Some(error) = &record.error {
                    self.error_reporter.report(name, error);
                }
                summary.record_outcome(name, record);
            }
        }

        // Whatever is left waits on itself through a dependency cycle.
        for name in std::mem::take(&mut pending) {
            self.skip(&mut summary, &name, format!("plugin '{name}' is part of a dependency cycle"));
        }

        summary.total_runtime = Runtime::from(started.elapsed());
        tracing::debug!(
            successful = summary.successful_plugins.len(),
            failed = summary.failed_plugins.len(),
            runtime = %summary.total_runtime,
            "plugins applied"
        );
        summary
    }

    /// Runs one wave of ready plugins.
    ///
    /// A wave with a single plugin, or a manager limited to one worker, runs
    /// on the calling thread. The pool is only started for the first wave with
    /// several ready plugins and is reused for the rest of the call, so a
    /// payload whose waves are all single plugins never spawns threads.
    fn run_wave(
        &self,
        pool: &mut Option<WorkerPool<usize>>,
        dispatches: Vec<Dispatch>,
        pending: usize,
    ) -> std::result::Result<Vec<std::result::Result<Run, TaskError>>, PoolError> {
        if dispatches.len() <= 1 || self.workers <= 1 {
            return Ok(dispatches.into_iter().map(run_guarded).collect());
        }
        let pool = pool.get_or_insert_with(|| {
            WorkerPool::new(self.workers.min(pending)).with_task_error_handler(
                |index: &usize, error| {
                    tracing::warn!(task = index, %error, "plugin task failed");
                },
            )
        });
        pool.map_slots(dispatches, run_plugin)
    }

    fn declared_dependencies(&self, name: &str) -> &[String] {
        self.plugin_dependencies(name).unwrap_or(&[])
    }

    /// Skips pending plugins whose dependencies can no longer succeed, until
    /// nothing changes.
    fn skip_blocked(
        &self,
        summary: &mut PluginManagerSummary,
        pending: &mut BTreeSet<String>,
        requested: &BTreeMap<String, ApplyConfig>,
    ) {
        loop {
            let blocked: Vec<(String, String)> = pending
                .iter()
                .filter_map(|name| {
                    self.declared_dependencies(name)
                        .iter()
                        .find_map(|dep| {
                            if !requested.contains_key(dep) {
                                Some(format!("dependency '{dep}' was not requested"))
                            } else if !self.is_plugin(dep) {
                                Some(format!("dependency '{dep}' is not registered"))
                            } else {
                                match summary.records.get(dep) {
                                    Some(record) if !record.was_successful() => {
                                        Some(format!("dependency '{dep}' did not succeed"))
                                    }
                                    _ => None,
                                }
                            }
                        })
                        .map(|reason| (name.clone(), reason))
                })
                .collect();
            if blocked.is_empty() {
                return;
            }
            for (name, reason) in blocked {
                pending.remove(&name);
                self.skip(summary, &name, reason);
            }
        }
    }

    fn skip(&self, summary: &mut PluginManagerSummary, name: &str, reason: String) {
        tracing::debug!(plugin = %name, %reason, "skipping plugin");
        summary.record_outcome(name, PluginRecord::skipped(reason));
    }
}

/// Runs a plugin on the calling thread with the same panic containment the
/// pool gives its tasks.
fn run_guarded(dispatch: Dispatch) -> std::result::Result<Run, TaskError> {
    let plugin_name = dispatch.input.plugin_name.clone();
    match panic::catch_unwind(AssertUnwindSafe(|| run_plugin(dispatch))) {
        Ok(Ok(run)) => Ok(run),
        Ok(Err(error)) => Err(TaskError::Failed(format!("{error:#}"))),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::warn!(plugin = %plugin_name, panic = %message, "plugin panicked");
            Err(TaskError::Panicked(message))
        }
    }
}

fn run_plugin(dispatch: Dispatch) -> anyhow::Result<Run> {
    let started = Instant::now();
    let output = dispatch
        .plugin
        .apply(&dispatch.dependency_outputs, &dispatch.input)
        .map_err(|e| format!("{e:#}"));
    let accepted = output
        .as_ref()
        .is_ok_and(|value| dispatch.plugin.was_successful(value));
    Ok(Run {
        output,
        accepted,
        runtime: Runtime::from(started.elapsed()),
    })
}
