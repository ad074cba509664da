//! Speech-to-text engine boundary.

pub mod engine;

pub use engine::{Engine, EngineSettings, MockEngine, create_engine, parse_transcript};
