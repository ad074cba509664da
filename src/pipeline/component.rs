//! Components: named, scheduled units of work inside a pipeline.

use crate::error::{ConvoscribeError, Result};
use crate::pipeline::error::ComponentError;
use crate::pipeline::logic::Logic;
use crate::pipeline::stream::Stream;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle of a component within one `execute()` pass.
///
/// `Ready -> Running -> {Successful, Failed}`, or `Ready -> Unexecuted` when a
/// dependency did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentState {
    Ready,
    Running,
    Successful,
    Failed,
    Unexecuted,
}

impl ComponentState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ComponentState::Successful | ComponentState::Failed | ComponentState::Unexecuted
        )
    }

    /// Successful or failed: the component's logic was actually invoked.
    pub fn was_executed(self) -> bool {
        matches!(self, ComponentState::Successful | ComponentState::Failed)
    }
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ComponentState::Ready => "ready",
            ComponentState::Running => "running",
            ComponentState::Successful => "successful",
            ComponentState::Failed => "failed",
            ComponentState::Unexecuted => "unexecuted",
        };
        f.write_str(label)
    }
}

/// Wall-clock runtime in seconds. Never negative.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize)]
pub struct Runtime(f64);

impl Runtime {
    pub const ZERO: Runtime = Runtime(0.0);

    /// Validates a runtime given in seconds.
    pub fn from_secs(secs: f64) -> Result<Self> {
        if secs.is_nan() || secs < 0.0 {
            return Err(ConvoscribeError::NegativeRuntime { value: secs });
        }
        Ok(Self(secs))
    }

    pub fn as_secs(self) -> f64 {
        self.0
    }
}

impl From<Duration> for Runtime {
    fn from(duration: Duration) -> Self {
        Self(duration.as_secs_f64())
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.0)
    }
}

/// A component registered on a pipeline.
pub struct Component<L: Logic> {
    pub(crate) name: String,
    pub(crate) dependencies: Vec<String>,
    pub(crate) kind: L::Kind,
    pub(crate) object: L::Object,
    pub(crate) state: ComponentState,
    pub(crate) result: Option<Arc<Stream<L::Payload>>>,
    pub(crate) runtime: Runtime,
    pub(crate) error: Option<ComponentError>,
}

impl<L: Logic> Component<L> {
    pub(crate) fn new(
        name: String,
        dependencies: Vec<String>,
        kind: L::Kind,
        object: L::Object,
    ) -> Self {
        Self {
            name,
            dependencies,
            kind,
            object,
            state: ComponentState::Ready,
            result: None,
            runtime: Runtime::ZERO,
            error: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn kind(&self) -> L::Kind {
        self.kind
    }

    pub fn object(&self) -> &L::Object {
        &self.object
    }

    pub fn state(&self) -> ComponentState {
        self.state
    }

    /// Stream published by this component in the last execution.
    pub fn result(&self) -> Option<&Arc<Stream<L::Payload>>> {
        self.result.as_ref()
    }

    pub fn runtime(&self) -> Runtime {
        self.runtime
    }

    pub fn error(&self) -> Option<&ComponentError> {
        self.error.as_ref()
    }

    pub(crate) fn reset(&mut self) {
        self.state = ComponentState::Ready;
        self.result = None;
        self.runtime = Runtime::ZERO;
        self.error = None;
    }

    pub(crate) fn summary(&self) -> ComponentSummary<L::Payload> {
        ComponentSummary {
            state: self.state,
            runtime: self.runtime,
            result: self.result.clone(),
            error: self.error.clone(),
        }
    }
}

/// Terminal outcome of one component, as reported after an execution.
#[derive(Debug)]
pub struct ComponentSummary<P> {
    pub state: ComponentState,
    pub runtime: Runtime,
    pub result: Option<Arc<Stream<P>>>,
    pub error: Option<ComponentError>,
}

impl<P> Clone for ComponentSummary<P> {
    fn clone(&self) -> Self {
        Self {
            state: self.state,
            runtime: self.runtime,
            result: self.result.clone(),
            error: self.error.clone(),
        }
    }
}

impl<P: PartialEq> ComponentSummary<P> {
    /// Compares everything except the runtime.
    pub fn same_outcome(&self, other: &Self) -> bool {
        self.state == other.state && self.result == other.result && self.error == other.error
    }
}
