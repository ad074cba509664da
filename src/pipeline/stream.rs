//! Named payload maps published by pipeline components.

use crate::defaults::BASE_STREAM;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Payloads keyed by payload identifier (e.g. a conversation id).
pub type Payloads<P> = BTreeMap<String, P>;

/// An immutable payload map produced by exactly one component, or the
/// pipeline's base input.
#[derive(Debug, Clone, PartialEq)]
pub struct Stream<P> {
    producer: String,
    payloads: Payloads<P>,
}

impl<P> Stream<P> {
    pub fn new(producer: impl Into<String>, payloads: Payloads<P>) -> Self {
        Self {
            producer: producer.into(),
            payloads,
        }
    }

    /// Name of the component that published this stream (`"base"` for the input).
    pub fn producer(&self) -> &str {
        &self.producer
    }

    pub fn get(&self, key: &str) -> Option<&P> {
        self.payloads.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.payloads.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &P)> {
        self.payloads.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn payloads(&self) -> &Payloads<P> {
        &self.payloads
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }
}

impl<P: Clone> Stream<P> {
    /// Copies the payloads out, e.g. to hand them to the next stage.
    pub fn to_payloads(&self) -> Payloads<P> {
        self.payloads.clone()
    }
}

/// Every stream published during one execution, keyed by producer name.
///
/// Write-once per producer; readers look streams up by name.
#[derive(Debug)]
pub struct Streams<P> {
    published: BTreeMap<String, Arc<Stream<P>>>,
    order: Vec<String>,
}

impl<P> Default for Streams<P> {
    fn default() -> Self {
        Self {
            published: BTreeMap::new(),
            order: Vec::new(),
        }
    }
}

impl<P> Streams<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, producer: &str) -> Option<&Arc<Stream<P>>> {
        self.published.get(producer)
    }

    /// The pipeline's base input stream, if one was published.
    pub fn base(&self) -> Option<&Arc<Stream<P>>> {
        self.get(BASE_STREAM)
    }

    pub fn contains(&self, producer: &str) -> bool {
        self.published.contains_key(producer)
    }

    /// Producer names in publication order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Publishes a stream under its producer name. A producer publishes at most
    /// once per execution; a second publish is refused and returns `false`.
    pub(crate) fn publish(&mut self, stream: Arc<Stream<P>>) -> bool {
        if self.published.contains_key(stream.producer()) {
            return false;
        }
        self.order.push(stream.producer().to_string());
        self.published.insert(stream.producer().to_string(), stream);
        true
    }

    pub(crate) fn clear(&mut self) {
        self.published.clear();
        self.order.clear();
    }
}
