//! Dependency-ordered component scheduler.
//!
//! The pipeline walks its component graph once per `execute()` call, on the
//! calling thread. A component starts only after every dependency reached a
//! terminal state; a failure is isolated to the failing component and turns
//! every transitive dependent into `unexecuted`, while independent branches
//! keep running. Parallelism lives inside each component's `process` call.

use crate::defaults::BASE_STREAM;
use crate::error::{ConvoscribeError, Result};
use crate::pipeline::component::{Component, ComponentState, ComponentSummary, Runtime};
use crate::pipeline::error::{ComponentError, ErrorReporter, LogReporter, Phase};
use crate::pipeline::logic::Logic;
use crate::pipeline::stream::{Payloads, Stream, Streams};
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

/// Execution summary keyed by component name.
pub type ExecutionSummary<P> = BTreeMap<String, ComponentSummary<P>>;

/// A named set of components executed in dependency order.
pub struct Pipeline<L: Logic> {
    name: String,
    logic: Option<Arc<L>>,
    components: Vec<Component<L>>,
    base: Arc<Stream<L::Payload>>,
    streams: Streams<L::Payload>,
    error_reporter: Arc<dyn ErrorReporter>,
}

impl<L: Logic> Pipeline<L> {
    /// Creates an empty pipeline with no logic and an empty base input.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            logic: None,
            components: Vec::new(),
            base: Arc::new(Stream::new(BASE_STREAM, Payloads::new())),
            streams: Streams::new(),
            error_reporter: Arc::new(LogReporter),
        }
    }

    /// Sets a custom error reporter for component failures.
    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.error_reporter = reporter;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Supplies the logic. Must happen before any component is added.
    ///
    /// Components hold kinds resolved against the logic they were added under,
    /// so replacing the logic is refused while any component exists. Call
    /// [`reset_pipeline`](Self::reset_pipeline) first to swap it.
    pub fn set_logic(&mut self, logic: L) -> Result<()> {
        self.set_shared_logic(Arc::new(logic))
    }

    /// Same as [`set_logic`](Self::set_logic) for logic shared with other owners.
    pub fn set_shared_logic(&mut self, logic: Arc<L>) -> Result<()> {
        if !self.components.is_empty() {
            return Err(ConvoscribeError::LogicInUse);
        }
        self.logic = Some(logic);
        Ok(())
    }

    pub fn logic(&self) -> Option<&Arc<L>> {
        self.logic.as_ref()
    }

    /// Adds a component, or redefines an existing one with the same name.
    ///
    /// Fails when `name` is `"base"`, when no logic is set, when the logic does
    /// not support `name`, when `name` lists itself or an unknown component as a dependency, or when a
    /// redefinition would close a dependency cycle. On failure the pipeline is
    /// left unchanged.
    ///
    /// Redefining a name replaces only that component's object and dependency
    /// list, keeping its position in addition order. Components that already
    /// depend on the name keep referring to it by name and so run against the
    /// new definition.
    pub fn add_component(
        &mut self,
        name: impl Into<String>,
        object: L::Object,
        dependencies: &[&str],
    ) -> Result<()> {
        let name = name.into();
        if name == BASE_STREAM {
            return Err(ConvoscribeError::ReservedComponentName { name });
        }
        let logic = self.logic.as_ref().ok_or(ConvoscribeError::LogicNotSet)?;
        let kind = logic
            .component_kind(&name)
            .ok_or_else(|| ConvoscribeError::UnsupportedComponent { name: name.clone() })?;

        let mut deps: Vec<String> = Vec::with_capacity(dependencies.len());
        for &dependency in dependencies {
            if dependency == name {
                return Err(ConvoscribeError::SelfDependency { name });
            }
            if !self.is_component(dependency) {
                return Err(ConvoscribeError::UnknownDependency {
                    name,
                    dependency: dependency.to_string(),
                });
            }
            if !deps.iter().any(|d| d == dependency) {
                deps.push(dependency.to_string());
            }
        }

        match self.position(&name) {
            Some(index) => {
                if deps.iter().any(|d| self.depends_on(d, &name)) {
                    return Err(ConvoscribeError::DependencyCycle { name });
                }
                tracing::debug!(pipeline = %self.name, component = %name, ?deps, "redefining component");
                self.components[index] = Component::new(name, deps, kind, object);
            }
            None => {
                tracing::debug!(pipeline = %self.name, component = %name, ?deps, "adding component");
                self.components.push(Component::new(name, deps, kind, object));
            }
        }
        Ok(())
    }

    /// Stores the payloads published as the `"base"` stream.
    pub fn set_base_input(&mut self, payloads: Payloads<L::Payload>) {
        self.base = Arc::new(Stream::new(BASE_STREAM, payloads));
    }

    pub fn base_input(&self) -> &Arc<Stream<L::Payload>> {
        &self.base
    }

    /// Runs every component once, in dependency order.
    ///
    /// Component failures are recorded, never returned: inspect
    /// [`failed_components`](Self::failed_components) afterwards. Calling this
    /// again re-runs all components from `ready`.
    pub fn execute(&mut self) {
        let Some(logic) = self.logic.clone() else {
            tracing::warn!(pipeline = %self.name, "execute called without logic");
            return;
        };

        self.streams.clear();
        self.streams.publish(Arc::clone(&self.base));
        for component in &mut self.components {
            component.reset();
        }

        let started = Instant::now();
        let index_of: HashMap<String, usize> = self
            .components
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();

        for index in self.execution_order() {
            let blocked = self.components[index].dependencies.iter().find(|dep| {
                index_of
                    .get(dep.as_str())
                    .is_none_or(|&d| self.components[d].state != ComponentState::Successful)
            });
            if let Some(dependency) = blocked {
                tracing::debug!(
                    pipeline = %self.name,
                    component = %self.components[index].name,
                    %dependency,
                    "dependency did not succeed, skipping"
                );
                self.components[index].state = ComponentState::Unexecuted;
                continue;
            }

            self.components[index].state = ComponentState::Running;
            let component_started = Instant::now();
            let outcome = {
                let component = &self.components[index];
                run_component(&*logic, component.kind, &component.object, &self.streams)
            };
            let runtime = Runtime::from(component_started.elapsed());

            let component = &mut self.components[index];
            component.runtime = runtime;
            let outcome = outcome.and_then(|payloads| {
                let stream = Arc::new(Stream::new(component.name.clone(), payloads));
                if self.streams.publish(Arc::clone(&stream)) {
                    Ok(stream)
                } else {
                    Err(ComponentError::new(
                        Phase::Postprocess,
                        format!("stream '{}' was already published", component.name),
                    ))
                }
            });
            match outcome {
                Ok(stream) => {
                    component.result = Some(stream);
                    component.state = ComponentState::Successful;
                    tracing::debug!(
                        pipeline = %self.name,
                        component = %component.name,
                        %runtime,
                        "component succeeded"
                    );
                }
                Err(error) => {
                    self.error_reporter.report(&component.name, &error.to_string());
                    component.error = Some(error);
                    component.state = ComponentState::Failed;
                }
            }
        }

        tracing::info!(
            pipeline = %self.name,
            successful = self.successful_components().len(),
            failed = self.failed_components().len(),
            unexecuted = self.unexecuted_components().len(),
            runtime = %Runtime::from(started.elapsed()),
            "pipeline execution finished"
        );
    }

    /// Component indices in an order consistent with the dependency graph.
    ///
    /// Among components whose dependencies are all placed, the one added first
    /// goes first.
    fn execution_order(&self) -> Vec<usize> {
        let index_of: HashMap<&str, usize> = self
            .components
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.as_str(), i))
            .collect();

        let mut remaining: Vec<usize> = vec![0; self.components.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.components.len()];
        for (i, component) in self.components.iter().enumerate() {
            for dep in &component.dependencies {
                if let Some(&d) = index_of.get(dep.as_str()) {
                    remaining[i] += 1;
                    dependents[d].push(i);
                }
            }
        }

        let mut ready: BTreeSet<usize> = (0..self.components.len())
            .filter(|&i| remaining[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.components.len());
        while let Some(next) = ready.pop_first() {
            order.push(next);
            for &dependent in &dependents[next] {
                remaining[dependent] -= 1;
                if remaining[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        // Unreachable while add_component rejects cycles; such components end
        // up unexecuted because their dependencies never succeed first.
        if order.len() < self.components.len() {
            let placed: BTreeSet<usize> = order.iter().copied().collect();
            order.extend((0..self.components.len()).filter(|i| !placed.contains(i)));
        }
        order
    }

    /// Component names in the order they will execute.
    pub fn execution_plan(&self) -> Vec<String> {
        self.execution_order()
            .into_iter()
            .map(|i| self.components[i].name.clone())
            .collect()
    }

    /// Terminal state, result, error and runtime of every component.
    pub fn execution_summary(&self) -> ExecutionSummary<L::Payload> {
        self.components
            .iter()
            .map(|c| (c.name.clone(), c.summary()))
            .collect()
    }

    pub fn successful_components(&self) -> Vec<String> {
        self.names_where(|state| state == ComponentState::Successful)
    }

    pub fn failed_components(&self) -> Vec<String> {
        self.names_where(|state| state == ComponentState::Failed)
    }

    /// Successful and failed components.
    pub fn executed_components(&self) -> Vec<String> {
        self.names_where(ComponentState::was_executed)
    }

    pub fn unexecuted_components(&self) -> Vec<String> {
        self.names_where(|state| state == ComponentState::Unexecuted)
    }

    /// Removes all components and published streams. Logic and base input stay.
    pub fn reset_pipeline(&mut self) {
        self.components.clear();
        self.streams.clear();
    }

    pub fn is_component(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn component(&self, name: &str) -> Option<&Component<L>> {
        self.components.iter().find(|c| c.name == name)
    }

    /// Component names in addition order.
    pub fn component_names(&self) -> Vec<String> {
        self.components.iter().map(|c| c.name.clone()).collect()
    }

    pub fn dependencies(&self, name: &str) -> Option<&[String]> {
        self.component(name).map(Component::dependencies)
    }

    pub fn component_state(&self, name: &str) -> Option<ComponentState> {
        self.component(name).map(Component::state)
    }

    /// Streams published by the last execution, including `"base"`.
    pub fn streams(&self) -> &Streams<L::Payload> {
        &self.streams
    }

    fn names_where(&self, keep: impl Fn(ComponentState) -> bool) -> Vec<String> {
        self.components
            .iter()
            .filter(|c| keep(c.state))
            .map(|c| c.name.clone())
            .collect()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.components.iter().position(|c| c.name == name)
    }

    /// Whether `from` reaches `target` by following dependency edges.
    fn depends_on(&self, from: &str, target: &str) -> bool {
        let mut stack = vec![from];
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(component) = self.component(current) {
                stack.extend(component.dependencies.iter().map(String::as_str));
            }
        }
        false
    }
}

/// Runs preprocess, process and postprocess, converting errors and panics
/// into a `ComponentError` for the phase that failed.
fn run_component<L: Logic>(
    logic: &L,
    kind: L::Kind,
    object: &L::Object,
    streams: &Streams<L::Payload>,
) -> std::result::Result<Payloads<L::Payload>, ComponentError> {
    let input = guarded(Phase::Preprocess, || logic.preprocess(kind, streams))?;
    let output = guarded(Phase::Process, || logic.process(kind, object, input))?;
    guarded(Phase::Postprocess, || logic.postprocess(kind, output))
}

fn guarded<T>(
    phase: Phase,
    step: impl FnOnce() -> anyhow::Result<T>,
) -> std::result::Result<T, ComponentError> {
    match panic::catch_unwind(AssertUnwindSafe(step)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(ComponentError::new(phase, format!("{error:#}"))),
        Err(payload) => Err(ComponentError::new(
            phase,
            format!("panicked: {}", panic_message(payload.as_ref())),
        )),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
