//! Per-component pre/process/post behaviour shared by one pipeline.
//!
//! A `Logic` supports a fixed set of component names. Each name resolves once,
//! at `add_component` time, to a typed `Kind`; every later call is dispatched
//! on that kind, so an unsupported name can only fail while the pipeline is
//! being assembled.

use crate::pipeline::stream::{Payloads, Streams};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// The three phases of a component run.
pub trait Logic: Send + Sync {
    /// Resolved identity of a supported component name.
    type Kind: Copy + Eq + fmt::Debug + Send + Sync;
    /// Stage object wrapped by a component. Only ever handed back to `process`.
    type Object: Send + Sync;
    /// Value carried in streams.
    type Payload: Send + Sync;
    /// What `preprocess` shapes the published streams into.
    type Input;
    /// What `process` produces.
    type Output;

    /// Resolves a component name, or `None` if this logic does not support it.
    fn component_kind(&self, name: &str) -> Option<Self::Kind>;

    /// Reads the streams published so far (including `"base"`).
    fn preprocess(
        &self,
        kind: Self::Kind,
        streams: &Streams<Self::Payload>,
    ) -> anyhow::Result<Self::Input>;

    /// Runs the stage object against the preprocessed input.
    fn process(
        &self,
        kind: Self::Kind,
        object: &Self::Object,
        input: Self::Input,
    ) -> anyhow::Result<Self::Output>;

    /// Turns the processed value into the payloads published under the
    /// component's name.
    fn postprocess(
        &self,
        kind: Self::Kind,
        output: Self::Output,
    ) -> anyhow::Result<Payloads<Self::Payload>>;
}

type Preprocessor<P> = Arc<dyn Fn(&Streams<P>) -> anyhow::Result<Payloads<P>> + Send + Sync>;
type Processor<O, P> = Arc<dyn Fn(&O, Payloads<P>) -> anyhow::Result<Payloads<P>> + Send + Sync>;
type Postprocessor<P> = Arc<dyn Fn(Payloads<P>) -> anyhow::Result<Payloads<P>> + Send + Sync>;

struct Entry<O, P> {
    preprocessor: Preprocessor<P>,
    processor: Processor<O, P>,
    postprocessor: Postprocessor<P>,
}

/// Closure-table logic: one `(pre, process, post)` triple per component name.
///
/// Useful when stages are small enough to be written inline; the kind is the
/// registration index.
pub struct TableLogic<O, P> {
    names: BTreeMap<String, usize>,
    entries: Vec<Entry<O, P>>,
}

impl<O, P> Default for TableLogic<O, P> {
    fn default() -> Self {
        Self {
            names: BTreeMap::new(),
            entries: Vec::new(),
        }
    }
}

impl<O, P> TableLogic<O, P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the triple for `name`, replacing any earlier registration.
    pub fn register<Pre, Proc, Post>(
        mut self,
        name: impl Into<String>,
        preprocessor: Pre,
        processor: Proc,
        postprocessor: Post,
    ) -> Self
    where
        Pre: Fn(&Streams<P>) -> anyhow::Result<Payloads<P>> + Send + Sync + 'static,
        Proc: Fn(&O, Payloads<P>) -> anyhow::Result<Payloads<P>> + Send + Sync + 'static,
        Post: Fn(Payloads<P>) -> anyhow::Result<Payloads<P>> + Send + Sync + 'static,
    {
        let entry = Entry {
            preprocessor: Arc::new(preprocessor),
            processor: Arc::new(processor),
            postprocessor: Arc::new(postprocessor),
        };
        let name = name.into();
        match self.names.get(&name) {
            Some(&index) => self.entries[index] = entry,
            None => {
                self.names.insert(name, self.entries.len());
                self.entries.push(entry);
            }
        }
        self
    }

    pub fn supported_names(&self) -> impl Iterator<Item = &str> {
        self.names.keys().map(String::as_str)
    }
}

impl<O, P> Logic for TableLogic<O, P>
where
    O: Send + Sync,
    P: Send + Sync,
{
    type Kind = usize;
    type Object = O;
    type Payload = P;
    type Input = Payloads<P>;
    type Output = Payloads<P>;

    fn component_kind(&self, name: &str) -> Option<usize> {
        self.names.get(name).copied()
    }

    fn preprocess(&self, kind: usize, streams: &Streams<P>) -> anyhow::Result<Payloads<P>> {
        (self.entry(kind)?.preprocessor)(streams)
    }

    fn process(&self, kind: usize, object: &O, input: Payloads<P>) -> anyhow::Result<Payloads<P>> {
        (self.entry(kind)?.processor)(object, input)
    }

    fn postprocess(&self, kind: usize, output: Payloads<P>) -> anyhow::Result<Payloads<P>> {
        (self.entry(kind)?.postprocessor)(output)
    }
}

impl<O, P> TableLogic<O, P> {
    fn entry(&self, kind: usize) -> anyhow::Result<&Entry<O, P>> {
        self.entries
            .get(kind)
            .ok_or_else(|| anyhow::anyhow!("no logic registered for component kind {kind}"))
    }
}
