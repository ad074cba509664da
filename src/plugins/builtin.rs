//! Built-in analysis plugins.
//!
//! Every built-in reads the conversation's utterances as a JSON array from
//! positional input 0.

use crate::plugins::config::{PluginCatalog, PluginConfig};
use crate::plugins::plugin::{ApplyConfig, DependencyOutputs, FnPlugin, Plugin, PluginValue};
use crate::stages::types::Utterance;
use anyhow::Context;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const WORD_COUNT: &str = "word_count";
pub const SPEAKER_TURNS: &str = "speaker_turns";
pub const SPEAKER_STATS: &str = "speaker_stats";
pub const KEYWORD_HITS: &str = "keyword_hits";

const BUILTIN_MODULE: &str = "convoscribe::plugins::builtin";

/// Registers the built-in entry points on `catalog`.
pub fn register_builtins(catalog: &mut PluginCatalog) {
    catalog.register(WORD_COUNT, |_| Ok(fn_plugin(word_count)));
    catalog.register(SPEAKER_TURNS, |_| Ok(fn_plugin(speaker_turns)));
    catalog.register(SPEAKER_STATS, |_| Ok(fn_plugin(speaker_stats)));
    catalog.register(KEYWORD_HITS, |_| Ok(fn_plugin(keyword_hits)));
}

/// Registration records for all built-ins, dependencies included.
pub fn builtin_suite() -> Vec<PluginConfig> {
    vec![
        PluginConfig::new(WORD_COUNT, WORD_COUNT).with_module(BUILTIN_MODULE),
        PluginConfig::new(SPEAKER_TURNS, SPEAKER_TURNS).with_module(BUILTIN_MODULE),
        PluginConfig::new(SPEAKER_STATS, SPEAKER_STATS)
            .with_dependencies(&[WORD_COUNT, SPEAKER_TURNS])
            .with_module(BUILTIN_MODULE),
        PluginConfig::new(KEYWORD_HITS, KEYWORD_HITS).with_module(BUILTIN_MODULE),
    ]
}

fn fn_plugin(
    apply: fn(&DependencyOutputs, &ApplyConfig) -> anyhow::Result<PluginValue>,
) -> Arc<dyn Plugin> {
    Arc::new(FnPlugin::new(apply))
}

fn utterances(input: &ApplyConfig) -> anyhow::Result<Vec<Utterance>> {
    let value = input
        .arg(0)
        .with_context(|| format!("{}: missing utterances input", input.plugin_name))?;
    serde_json::from_value(value.clone())
        .with_context(|| format!("{}: malformed utterances input", input.plugin_name))
}

/// `{"total": n, "by_speaker": {speaker: n}}`
fn word_count(_: &DependencyOutputs, input: &ApplyConfig) -> anyhow::Result<PluginValue> {
    let mut by_speaker: BTreeMap<String, usize> = BTreeMap::new();
    let mut total = 0;
    for utterance in utterances(input)? {
        let words = utterance.word_count();
        total += words;
        *by_speaker.entry(utterance.speaker).or_default() += words;
    }
    Ok(json!({ "total": total, "by_speaker": by_speaker }))
}

/// `{"total": n, "by_speaker": {speaker: n}}` where a turn is a maximal run of
/// consecutive utterances by the same speaker.
fn speaker_turns(_: &DependencyOutputs, input: &ApplyConfig) -> anyhow::Result<PluginValue> {
    let mut by_speaker: BTreeMap<String, usize> = BTreeMap::new();
    let mut total = 0;
    let mut previous: Option<String> = None;
    for utterance in utterances(input)? {
        if previous.as_deref() != Some(utterance.speaker.as_str()) {
            total += 1;
            *by_speaker.entry(utterance.speaker.clone()).or_default() += 1;
            previous = Some(utterance.speaker);
        }
    }
    Ok(json!({ "total": total, "by_speaker": by_speaker }))
}

/// Per-speaker words, turns, words per turn and share of all words.
fn speaker_stats(deps: &DependencyOutputs, _: &ApplyConfig) -> anyhow::Result<PluginValue> {
    let words = counts(deps, WORD_COUNT)?;
    let turns = counts(deps, SPEAKER_TURNS)?;
    let total_words: u64 = words.values().sum();

    let mut stats = Map::new();
    for (speaker, &speaker_words) in &words {
        let speaker_turns = turns.get(speaker).copied().unwrap_or(0);
        let words_per_turn = if speaker_turns == 0 {
            0.0
        } else {
            speaker_words as f64 / speaker_turns as f64
        };
        let share = if total_words == 0 {
            0.0
        } else {
            speaker_words as f64 / total_words as f64
        };
        stats.insert(
            speaker.clone(),
            json!({
                "words": speaker_words,
                "turns": speaker_turns,
                "words_per_turn": words_per_turn,
                "share": share,
            }),
        );
    }
    Ok(Value::Object(stats))
}

fn counts(deps: &DependencyOutputs, plugin: &str) -> anyhow::Result<BTreeMap<String, u64>> {
    let by_speaker = deps
        .get(plugin)
        .and_then(|output| output.get("by_speaker"))
        .with_context(|| format!("missing '{plugin}' output"))?;
    serde_json::from_value(by_speaker.clone())
        .with_context(|| format!("malformed '{plugin}' output"))
}

/// Case-insensitive whole-word counts for the `keywords` keyword input.
///
/// Without keywords the result is an empty object.
fn keyword_hits(_: &DependencyOutputs, input: &ApplyConfig) -> anyhow::Result<PluginValue> {
    let keywords: Vec<String> = match input.kwarg("keywords") {
        Some(value) => serde_json::from_value(value.clone())
            .context("keyword_hits: 'keywords' must be a list of strings")?,
        None => Vec::new(),
    };
    let mut hits: BTreeMap<String, usize> = keywords
        .iter()
        .map(|keyword| (keyword.to_lowercase(), 0))
        .collect();
    if hits.is_empty() {
        return Ok(json!({}));
    }
    for utterance in utterances(input)? {
        for word in utterance.text.split_whitespace() {
            let word = word
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if let Some(count) = hits.get_mut(&word) {
                *count += 1;
            }
        }
    }
    Ok(json!(hits))
}
