//! Transcription job: `transcription -> analysis -> format`.
//!
//! The orchestrator is the explicit context a job runs in. It owns the engine,
//! the plugin registry and the pipeline logic, and builds a fresh pipeline per
//! run.

use crate::config::Config;
use crate::defaults::{ANALYSIS_COMPONENT, BASE_STREAM, FORMAT_COMPONENT, TRANSCRIPTION_COMPONENT};
use crate::error::{ConvoscribeError, Result};
use crate::pipeline::{ComponentState, ErrorReporter, LogReporter, Payloads, Pipeline, Runtime};
use crate::plugins::builtin::builtin_suite;
use crate::plugins::{PluginCatalog, PluginManager};
use crate::stages::{
    AnalysisStage, Conversation, FormatStage, Source, Stage, TranscriptionLogic,
    TranscriptionStage,
};
use crate::stt::{Engine, EngineSettings, create_engine};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Outcome of one pipeline component in a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentReport {
    pub name: String,
    pub state: ComponentState,
    pub runtime: Runtime,
    pub error: Option<String>,
}

/// What a job did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobReport {
    /// Components in addition order.
    pub components: Vec<ComponentReport>,
    /// Conversations as published by the last stage that succeeded.
    pub conversations: Vec<Conversation>,
    pub runtime: Runtime,
}

impl JobReport {
    /// Every component succeeded and no conversation failed.
    pub fn is_success(&self) -> bool {
        self.components
            .iter()
            .all(|c| c.state == ComponentState::Successful)
            && self.conversations.iter().all(|c| !c.has_failed())
    }

    pub fn component(&self, name: &str) -> Option<&ComponentReport> {
        self.components.iter().find(|c| c.name == name)
    }

    pub fn conversation(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id() == id)
    }

    pub fn failed_conversations(&self) -> Vec<&Conversation> {
        self.conversations.iter().filter(|c| c.has_failed()).collect()
    }

    /// Files written by the format stage.
    pub fn output_paths(&self) -> Vec<&Path> {
        self.conversations
            .iter()
            .filter_map(|c| c.output_path.as_deref())
            .collect()
    }
}

/// Runs transcription jobs.
pub struct Orchestrator {
    config: Config,
    engine: Arc<dyn Engine>,
    plugins: Arc<PluginManager>,
    logic: Arc<TranscriptionLogic>,
    error_reporter: Arc<dyn ErrorReporter>,
}

impl Orchestrator {
    /// Creates an orchestrator from explicit collaborators.
    pub fn new(config: Config, engine: Arc<dyn Engine>, plugins: PluginManager) -> Self {
        let error_reporter: Arc<dyn ErrorReporter> = Arc::new(LogReporter);
        let logic = TranscriptionLogic::new(config.pool_workers())
            .with_error_reporter(Arc::clone(&error_reporter));
        Self {
            config,
            engine,
            plugins: Arc::new(plugins),
            logic: Arc::new(logic),
            error_reporter,
        }
    }

    /// Creates an orchestrator with the configured engine, the built-in
    /// plugins and any plugins found in the configured plugin directory.
    pub fn from_config(config: Config) -> Result<Self> {
        let settings = EngineSettings::default().with_language(config.engine.language.clone());
        let engine = create_engine(&config.engine.name, &settings)?;
        let plugins = plugin_manager(&config)?;
        Ok(Self::new(config, engine, plugins))
    }

    /// Sets the reporter told about component and conversation failures.
    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        let logic = TranscriptionLogic::new(self.config.pool_workers())
            .with_error_reporter(Arc::clone(&reporter));
        self.logic = Arc::new(logic);
        self.error_reporter = reporter;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn plugins(&self) -> &PluginManager {
        &self.plugins
    }

    pub fn engine(&self) -> &dyn Engine {
        self.engine.as_ref()
    }

    /// Builds the three-stage pipeline with an empty base input.
    pub fn build_pipeline(&self) -> Result<Pipeline<TranscriptionLogic>> {
        let mut pipeline =
            Pipeline::new("transcription-job").with_error_reporter(Arc::clone(&self.error_reporter));
        pipeline.set_shared_logic(Arc::clone(&self.logic))?;

        let transcription = TranscriptionStage::new(Arc::clone(&self.engine));
        let mut analysis = AnalysisStage::new(Arc::clone(&self.plugins))
            .with_options(self.config.plugins.options.clone());
        if let Some(requested) = &self.config.plugins.apply {
            analysis = analysis.with_plugins(requested.clone());
        }
        let format = FormatStage::new(self.config.output.directory.clone())
            .with_pretty(self.config.output.pretty);

        pipeline.add_component(TRANSCRIPTION_COMPONENT, Stage::Transcription(transcription), &[])?;
        pipeline.add_component(
            ANALYSIS_COMPONENT,
            Stage::Analysis(analysis),
            &[TRANSCRIPTION_COMPONENT],
        )?;
        pipeline.add_component(FORMAT_COMPONENT, Stage::Format(format), &[ANALYSIS_COMPONENT])?;
        Ok(pipeline)
    }

    /// Runs every source through the job.
    ///
    /// Only setup problems are errors, such as two sources sharing an id or two
    /// ids that map to the same output file.
    /// Stage and conversation failures are part of the report.
    pub fn run(&self, sources: Vec<Source>) -> Result<JobReport> {
        let format = FormatStage::new(self.config.output.directory.clone());
        let mut seen = BTreeSet::new();
        let mut outputs: BTreeMap<PathBuf, &str> = BTreeMap::new();
        for source in &sources {
            if !seen.insert(source.id.as_str()) {
                return Err(ConvoscribeError::ConfigInvalidValue {
                    key: "sources".to_string(),
                    message: format!("duplicate source id '{}'", source.id),
                });
            }
            let path = format.output_path(&source.id);
            if let Some(other) = outputs.insert(path.clone(), &source.id) {
                return Err(ConvoscribeError::ConfigInvalidValue {
                    key: "sources".to_string(),
                    message: format!(
                        "source ids '{other}' and '{}' would both be written to '{}'",
                        source.id,
                        path.display()
                    ),
                });
            }
        }

        let started = Instant::now();
        let mut pipeline = self.build_pipeline()?;
        let base: Payloads<Conversation> = sources
            .into_iter()
            .map(|source| (source.id.clone(), Conversation::new(source)))
            .collect();
        tracing::info!(
            sources = base.len(),
            engine = %self.engine.name(),
            workers = self.logic.workers(),
            "starting transcription job"
        );
        pipeline.set_base_input(base);
        pipeline.execute();

        let report = JobReport {
            components: component_reports(&pipeline),
            conversations: latest_conversations(&pipeline),
            runtime: Runtime::from(started.elapsed()),
        };
        tracing::info!(
            conversations = report.conversations.len(),
            failed = report.failed_conversations().len(),
            runtime = %report.runtime,
            "transcription job finished"
        );
        Ok(report)
    }
}

fn plugin_manager(config: &Config) -> Result<PluginManager> {
    let mut manager =
        PluginManager::new(PluginCatalog::with_builtins()).with_workers(config.plugin_workers());
    manager.register_plugins(builtin_suite());
    if let Some(directory) = &config.plugins.directory {
        manager.register_plugins_from_directory(directory)?;
    }
    Ok(manager)
}

fn component_reports(pipeline: &Pipeline<TranscriptionLogic>) -> Vec<ComponentReport> {
    pipeline
        .component_names()
        .into_iter()
        .filter_map(|name| {
            let component = pipeline.component(&name)?;
            Some(ComponentReport {
                state: component.state(),
                runtime: component.runtime(),
                error: component.error().map(ToString::to_string),
                name,
            })
        })
        .collect()
}

fn latest_conversations(pipeline: &Pipeline<TranscriptionLogic>) -> Vec<Conversation> {
    [FORMAT_COMPONENT, ANALYSIS_COMPONENT, TRANSCRIPTION_COMPONENT, BASE_STREAM]
        .into_iter()
        .find_map(|name| pipeline.streams().get(name))
        .map(|stream| stream.payloads().values().cloned().collect())
        .unwrap_or_default()
}
