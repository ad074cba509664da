//! Scheduling, cascading failure and re-execution of the pipeline kernel.

use convoscribe::pipeline::{
    CollectingReporter, ComponentState, Logic, Payloads, Phase, Pipeline, Streams, TableLogic,
};
use convoscribe::{ConvoscribeError, Stream};
use std::sync::{Arc, Mutex};

/// Stage object used by the test logic.
#[derive(Clone, Copy, Debug)]
enum Behavior {
    Add(i64),
    Fail,
}

/// Reads every published stream, sums matching keys and applies the behavior.
fn table_logic(names: &[&str]) -> TableLogic<Behavior, i64> {
    let mut logic = TableLogic::new();
    for &name in names {
        logic = logic.register(
            name,
            |streams: &Streams<i64>| {
                let mut merged = Payloads::new();
                for producer in streams.names() {
                    if let Some(stream) = streams.get(producer) {
                        for (key, value) in stream.iter() {
                            *merged.entry(key.to_string()).or_insert(0) += *value;
                        }
                    }
                }
                Ok(merged)
            },
            |behavior: &Behavior, input: Payloads<i64>| match *behavior {
                Behavior::Add(n) => Ok(input.into_iter().map(|(k, v)| (k, v + n)).collect()),
                Behavior::Fail => anyhow::bail!("component always raises"),
            },
            Ok,
        );
    }
    logic
}

fn base() -> Payloads<i64> {
    [("conv-1".to_string(), 1), ("conv-2".to_string(), 10)]
        .into_iter()
        .collect()
}

#[test]
fn partial_failure_is_isolated_to_its_branch() {
    let mut pipeline = Pipeline::new("isolation");
    pipeline.set_logic(table_logic(&["c1", "c3", "c4", "c5"])).unwrap();
    pipeline.add_component("c1", Behavior::Add(1), &[]).unwrap();
    pipeline.add_component("c3", Behavior::Add(3), &[]).unwrap();
    pipeline
        .add_component("c4", Behavior::Add(4), &["c1", "c3"])
        .unwrap();
    pipeline.add_component("c5", Behavior::Fail, &[]).unwrap();
    pipeline.set_base_input(base());

    pipeline.execute();

    assert_eq!(pipeline.failed_components(), vec!["c5"]);
    assert_eq!(pipeline.successful_components(), vec!["c1", "c3", "c4"]);
    assert!(pipeline.unexecuted_components().is_empty());
    assert_eq!(
        pipeline.executed_components(),
        vec!["c1", "c3", "c4", "c5"]
    );
}

#[test]
fn failure_propagates_as_unexecuted() {
    let mut pipeline = Pipeline::new("skip");
    pipeline.set_logic(table_logic(&["c1", "c5"])).unwrap();
    pipeline.add_component("c5", Behavior::Fail, &[]).unwrap();
    pipeline.add_component("c1", Behavior::Add(1), &["c5"]).unwrap();
    pipeline.set_base_input(base());

    pipeline.execute();

    assert_eq!(pipeline.failed_components(), vec!["c5"]);
    assert_eq!(pipeline.unexecuted_components(), vec!["c1"]);
    assert!(pipeline.successful_components().is_empty());
    assert!(pipeline.streams().get("c1").is_none());
    assert!(pipeline.component("c1").unwrap().error().is_none());
}

#[test]
fn cascade_reaches_transitive_dependents_only() {
    let mut pipeline = Pipeline::new("cascade");
    pipeline.set_logic(table_logic(&["root", "bad", "mid", "leaf", "side"])).unwrap();
    pipeline.add_component("root", Behavior::Add(1), &[]).unwrap();
    pipeline.add_component("bad", Behavior::Fail, &["root"]).unwrap();
    pipeline.add_component("mid", Behavior::Add(1), &["bad"]).unwrap();
    pipeline.add_component("leaf", Behavior::Add(1), &["mid"]).unwrap();
    pipeline.add_component("side", Behavior::Add(1), &["root"]).unwrap();

    pipeline.execute();

    assert_eq!(pipeline.successful_components(), vec!["root", "side"]);
    assert_eq!(pipeline.failed_components(), vec!["bad"]);
    assert_eq!(pipeline.unexecuted_components(), vec!["mid", "leaf"]);
}

#[test]
fn every_later_component_sees_all_published_streams() {
    let mut pipeline = Pipeline::new("visibility");
    pipeline.set_logic(table_logic(&["a", "b", "c"])).unwrap();
    pipeline.add_component("a", Behavior::Add(100), &[]).unwrap();
    pipeline.add_component("b", Behavior::Add(0), &["a"]).unwrap();
    // `c` only depends on `b` but still reads base, `a` and `b`.
    pipeline.add_component("c", Behavior::Add(0), &["b"]).unwrap();
    pipeline.set_base_input(base());

    pipeline.execute();

    let a = pipeline.streams().get("a").unwrap();
    assert_eq!(a.get("conv-1"), Some(&101));
    // b = base + a = 1 + 101
    let b = pipeline.streams().get("b").unwrap();
    assert_eq!(b.get("conv-1"), Some(&102));
    // c = base + a + b = 1 + 101 + 102
    let c = pipeline.streams().get("c").unwrap();
    assert_eq!(c.get("conv-1"), Some(&204));
    assert_eq!(c.producer(), "c");
    assert_eq!(pipeline.streams().names(), ["base", "a", "b", "c"]);
}

#[test]
fn re_execution_is_idempotent() {
    let mut pipeline = Pipeline::new("idempotent");
    pipeline.set_logic(table_logic(&["c1", "c3", "c4", "c5"])).unwrap();
    pipeline.add_component("c1", Behavior::Add(1), &[]).unwrap();
    pipeline.add_component("c3", Behavior::Add(3), &[]).unwrap();
    pipeline
        .add_component("c4", Behavior::Add(4), &["c1", "c3"])
        .unwrap();
    pipeline.add_component("c5", Behavior::Fail, &[]).unwrap();
    pipeline.set_base_input(base());

    pipeline.execute();
    let first = pipeline.execution_summary();
    pipeline.execute();
    let second = pipeline.execution_summary();

    assert_eq!(first.len(), second.len());
    for (name, summary) in &first {
        assert!(
            summary.same_outcome(&second[name]),
            "component {name} changed outcome between runs"
        );
    }
    assert_eq!(first["c5"].state, ComponentState::Failed);
    assert_eq!(first["c5"].error.as_ref().unwrap().phase, Phase::Process);
}

#[test]
fn self_dependency_leaves_component_unchanged() {
    let mut pipeline = Pipeline::new("self");
    pipeline.set_logic(table_logic(&["c1"])).unwrap();
    pipeline.add_component("c1", Behavior::Add(1), &[]).unwrap();

    let result = pipeline.add_component("c1", Behavior::Add(2), &["c1"]);

    assert!(matches!(result, Err(ConvoscribeError::SelfDependency { .. })));
    assert_eq!(pipeline.dependencies("c1"), Some(&[][..]));
    assert!(result.unwrap_err().is_configuration());
}

#[test]
fn base_cannot_be_shadowed_by_a_component() {
    let mut pipeline = Pipeline::new("reserved");
    pipeline.set_logic(table_logic(&["base", "after"])).unwrap();

    let rejected = pipeline.add_component("base", Behavior::Add(100), &[]);
    assert!(matches!(
        rejected,
        Err(ConvoscribeError::ReservedComponentName { .. })
    ));
    assert!(rejected.unwrap_err().is_configuration());
    assert!(matches!(
        pipeline.add_component("after", Behavior::Add(0), &["base"]),
        Err(ConvoscribeError::UnknownDependency { .. })
    ));

    pipeline.add_component("after", Behavior::Add(0), &[]).unwrap();
    pipeline.set_base_input([("x".to_string(), 1)].into_iter().collect());
    pipeline.execute();

    assert_eq!(pipeline.successful_components(), vec!["after"]);
    assert_eq!(pipeline.streams().get("base").unwrap().get("x"), Some(&1));
    assert_eq!(pipeline.streams().get("after").unwrap().get("x"), Some(&1));
}

#[test]
fn replacing_logic_under_existing_components_is_refused() {
    let mut pipeline = Pipeline::new("swap");
    pipeline.set_logic(table_logic(&["a", "b"])).unwrap();
    pipeline.add_component("a", Behavior::Add(1), &[]).unwrap();

    let refused = pipeline.set_logic(table_logic(&["zzz", "a"]));
    assert!(matches!(refused, Err(ConvoscribeError::LogicInUse)));

    pipeline.set_base_input([("x".to_string(), 1)].into_iter().collect());
    pipeline.execute();
    assert_eq!(pipeline.streams().get("a").unwrap().get("x"), Some(&2));
}

#[test]
fn redefinition_is_seen_by_existing_dependents() {
    let mut pipeline = Pipeline::new("redefine");
    pipeline.set_logic(table_logic(&["a", "b"])).unwrap();
    pipeline.add_component("a", Behavior::Add(1), &[]).unwrap();
    pipeline.add_component("b", Behavior::Add(0), &["a"]).unwrap();
    pipeline.add_component("a", Behavior::Fail, &[]).unwrap();

    pipeline.execute();

    assert_eq!(pipeline.component_names(), vec!["a", "b"]);
    assert_eq!(pipeline.failed_components(), vec!["a"]);
    assert_eq!(pipeline.unexecuted_components(), vec!["b"]);
}

#[test]
fn reset_clears_components_but_keeps_base() {
    let mut pipeline = Pipeline::new("reset");
    pipeline.set_logic(table_logic(&["a"])).unwrap();
    pipeline.add_component("a", Behavior::Add(1), &[]).unwrap();
    pipeline.set_base_input(base());
    pipeline.execute();

    pipeline.reset_pipeline();

    assert!(pipeline.component_names().is_empty());
    assert!(pipeline.streams().is_empty());
    assert_eq!(pipeline.base_input().len(), 2);
    pipeline.add_component("a", Behavior::Add(1), &[]).unwrap();
}

#[test]
fn failures_reach_the_error_reporter() {
    let reporter = Arc::new(CollectingReporter::new());
    let mut pipeline = Pipeline::new("reported").with_error_reporter(reporter.clone());
    pipeline.set_logic(table_logic(&["ok", "broken"])).unwrap();
    pipeline.add_component("ok", Behavior::Add(1), &[]).unwrap();
    pipeline.add_component("broken", Behavior::Fail, &[]).unwrap();

    pipeline.execute();

    let reports = reporter.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].0, "broken");
    assert!(reports[0].1.contains("component always raises"));
}

/// Logic with a compile-time component kind that records the order it ran in.
struct RecordingLogic {
    order: Mutex<Vec<Kind>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Kind {
    Extract,
    Enrich,
    Publish,
}

impl Logic for RecordingLogic {
    type Kind = Kind;
    type Object = ();
    type Payload = String;
    type Input = ();
    type Output = ();

    fn component_kind(&self, name: &str) -> Option<Kind> {
        match name {
            "extract" => Some(Kind::Extract),
            "enrich" => Some(Kind::Enrich),
            "publish" => Some(Kind::Publish),
            _ => None,
        }
    }

    fn preprocess(&self, _kind: Kind, _streams: &Streams<String>) -> anyhow::Result<()> {
        Ok(())
    }

    fn process(&self, kind: Kind, _object: &(), _input: ()) -> anyhow::Result<()> {
        self.order.lock().unwrap().push(kind);
        Ok(())
    }

    fn postprocess(&self, kind: Kind, _output: ()) -> anyhow::Result<Payloads<String>> {
        Ok([("kind".to_string(), format!("{kind:?}"))].into_iter().collect())
    }
}

#[test]
fn dependencies_run_before_dependents_regardless_of_addition_order() {
    let logic = Arc::new(RecordingLogic {
        order: Mutex::new(Vec::new()),
    });
    let mut pipeline = Pipeline::new("typed");
    pipeline.set_shared_logic(Arc::clone(&logic)).unwrap();
    pipeline.add_component("publish", (), &[]).unwrap();
    pipeline.add_component("extract", (), &[]).unwrap();
    pipeline.add_component("enrich", (), &["extract"]).unwrap();
    // Redefine publish to depend on enrich; it was added first.
    pipeline.add_component("publish", (), &["enrich"]).unwrap();

    pipeline.execute();

    assert_eq!(
        *logic.order.lock().unwrap(),
        vec![Kind::Extract, Kind::Enrich, Kind::Publish]
    );
    assert_eq!(pipeline.execution_plan(), vec!["extract", "enrich", "publish"]);
    let published: &Arc<Stream<String>> = pipeline.streams().get("publish").unwrap();
    assert_eq!(published.get("kind").map(String::as_str), Some("Publish"));
    assert!(matches!(
        pipeline.add_component("archive", (), &[]),
        Err(ConvoscribeError::UnsupportedComponent { .. })
    ));
}
