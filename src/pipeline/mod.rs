//! Pipeline execution kernel.
//!
//! A [`Pipeline`] holds named [`Component`]s wrapping stage objects, each with a
//! list of dependency names. A single [`Logic`] supplies the per-component
//! preprocess/process/postprocess behaviour. Executing the pipeline walks the
//! dependency graph once, publishing one [`Stream`] per successful component.

pub mod component;
pub mod error;
pub mod kernel;
pub mod logic;
pub mod stream;

pub use component::{Component, ComponentState, ComponentSummary, Runtime};
pub use error::{CollectingReporter, ComponentError, ErrorReporter, LogReporter, Phase};
pub use kernel::{ExecutionSummary, Pipeline};
pub use logic::{Logic, TableLogic};
pub use stream::{Payloads, Stream, Streams};
