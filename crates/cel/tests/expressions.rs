use tekq_cel::{compile, Mutation, Program};
use tekq_core::{PipelineRun, PipelineRunMutator, PRIORITY_LABEL};

fn plr(labels: serde_json::Value) -> PipelineRun {
    serde_json::from_value(serde_json::json!({
        "apiVersion": "tekton.dev/v1",
        "kind": "PipelineRun",
        "metadata": {
            "name": "release-42",
            "namespace": "tenant-a",
            "uid": "7c1b0f3e-0000-0000-0000-000000000001",
            "labels": labels,
        },
        "spec": {
            "pipelineRef": { "name": "release" },
            "params": [
                { "name": "revision", "value": "main" },
                { "name": "replicas", "value": 3 }
            ]
        }
    }))
    .unwrap()
}

fn eval(src: &str, obj: &PipelineRun) -> Vec<Mutation> {
    Program::compile(src).unwrap().evaluate(obj).unwrap().into_vec()
}

#[test]
fn expression_overrides_existing_label() {
    let mut obj = plr(serde_json::json!({ "env": "staging" }));
    compile(&[r#"label("env", "prod")"#]).unwrap().mutate(&mut obj).unwrap();
    assert_eq!(obj.label("env"), Some("prod"));
}

#[test]
fn second_of_two_conflicting_expressions_wins() {
    let mut obj = plr(serde_json::json!({}));
    let m = compile(&[r#"label("tier", "one")"#, r#"label("tier", "two")"#]).unwrap();
    m.mutate(&mut obj).unwrap();
    assert_eq!(obj.label("tier"), Some("two"));
}

#[test]
fn later_expressions_observe_earlier_mutations() {
    let mut obj = plr(serde_json::json!({}));
    let m = compile(&[
        r#"label("stage", "first")"#,
        r#"pipelineRun.metadata.labels["stage"] == "first" ? annotation("seen", "yes") : annotation("seen", "no")"#,
    ])
    .unwrap();
    m.mutate(&mut obj).unwrap();
    assert_eq!(obj.annotation("seen"), Some("yes"));
}

#[test]
fn missing_field_is_an_eval_error_naming_the_expression() {
    let src = r#"annotation("team", pipelineRun.doesNotExist)"#;
    let mut obj = plr(serde_json::json!({}));
    let m = compile(&[r#"label("before", "ok")"#, src, r#"label("after", "never")"#]).unwrap();
    let err = m.mutate(&mut obj).unwrap_err();
    assert_eq!(err.expression, src);
    assert!(err.cause.contains("doesNotExist"), "cause: {}", err.cause);
    assert_eq!(obj.label("before"), Some("ok"));
    assert_eq!(obj.label("after"), None);
    assert_eq!(obj.annotation("team"), None);
}

#[test]
fn absent_labels_map_is_created_by_label_mutation() {
    let mut obj: PipelineRun = serde_json::from_value(serde_json::json!({
        "spec": { "pipelineSpec": { "tasks": [] } }
    }))
    .unwrap();
    assert!(obj.metadata.labels.is_none());
    compile(&[r#"priority("batch")"#]).unwrap().mutate(&mut obj).unwrap();
    assert_eq!(obj.label(PRIORITY_LABEL), Some("batch"));
}

#[test]
fn ternary_on_namespace_prefix() {
    let src = r#"pipelineRun.metadata.namespace.startsWith("tenant-") ? priority("tenant") : priority("default")"#;
    let out = eval(src, &plr(serde_json::json!({})));
    assert_eq!(out, vec![Mutation::Priority { value: "tenant".into() }]);
}

#[test]
fn membership_and_presence() {
    let obj = plr(serde_json::json!({ "app": "web" }));
    let out = eval(r#""app" in pipelineRun.metadata.labels ? [label("has-app", "true")] : []"#, &obj);
    assert_eq!(out, vec![Mutation::Label { key: "has-app".into(), value: "true".into() }]);

    // has() is false for absent intermediate maps instead of failing
    let out = eval(r#"has(pipelineRun.metadata.annotations.owner) ? [] : [annotation("owner", "none")]"#, &obj);
    assert_eq!(out, vec![Mutation::Annotation { key: "owner".into(), value: "none".into() }]);
}

#[test]
fn params_are_reachable_by_index() {
    let obj = plr(serde_json::json!({}));
    let src = r#"pipelineRun.spec.params[1].value > 2 && size(pipelineRun.spec.params) == 2 ? priority("large") : priority("small")"#;
    assert_eq!(eval(src, &obj), vec![Mutation::Priority { value: "large".into() }]);

    let err = Program::compile(r#"annotation("x", pipelineRun.spec.params[5].name)"#)
        .unwrap()
        .evaluate(&obj)
        .unwrap_err();
    assert!(err.cause.contains("out of range"), "cause: {}", err.cause);
}

#[test]
fn regex_match_and_string_concat() {
    let obj = plr(serde_json::json!({}));
    let src = r#"pipelineRun.metadata.name.matches("^release-[0-9]+$") ? [annotation("kind", "release-" + pipelineRun.metadata.namespace)] : []"#;
    assert_eq!(eval(src, &obj), vec![Mutation::Annotation { key: "kind".into(), value: "release-tenant-a".into() }]);
}

#[test]
fn dynamic_argument_type_mismatch_is_an_eval_error() {
    let obj = plr(serde_json::json!({}));
    let err = Program::compile(r#"annotation("replicas", pipelineRun.spec.params[1].value)"#)
        .unwrap()
        .evaluate(&obj)
        .unwrap_err();
    assert!(err.cause.contains("expects string arguments"), "cause: {}", err.cause);
}

#[test]
fn compile_errors_name_expression_and_reason() {
    for (src, needle) in [
        ("not_a_function()", "undeclared reference"),
        ("label(\"a\"", "syntax error"),
        (r#"label("a")"#, "argument(s)"),
        (r#""just a string""#, "must evaluate to a mutation"),
        ("foo.bar", "undeclared reference to 'foo'"),
    ] {
        let err = compile(&[src]).unwrap_err();
        assert_eq!(err.expression, src);
        assert!(err.reason.contains(needle), "{src}: {}", err.reason);
    }
}

#[test]
fn programs_are_shareable_across_threads() {
    let m = std::sync::Arc::new(compile(&[r#"label("a", pipelineRun.metadata.name)"#]).unwrap());
    std::thread::scope(|s| {
        for _ in 0..4 {
            let m = m.clone();
            s.spawn(move || {
                let mut obj = plr(serde_json::json!({}));
                m.mutate(&mut obj).unwrap();
                assert_eq!(obj.label("a"), Some("release-42"));
            });
        }
    });
}
