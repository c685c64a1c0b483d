mod common;

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;

use common::{call_log, logged, orchestrator, request, ScriptedProvider};
use parley::mcp::translate::{invocation_requests, to_ollama_tools};
use parley::mcp::ToolOutcome;
use parley::types::ModelToolCall;

#[tokio::test]
async fn one_failing_provider_leaves_the_others_in_the_catalog() {
    let log = call_log();
    let orchestrator = orchestrator(vec![
        ("calc", ScriptedProvider::new(&log).echo("add", Duration::ZERO)),
        ("web", ScriptedProvider::unreachable(&log, "connection refused")),
        (
            "files",
            ScriptedProvider::new(&log)
                .echo("read", Duration::ZERO)
                .echo("write", Duration::ZERO),
        ),
    ]);

    let catalog = orchestrator.merged_tool_catalog(true).await;

    let names: Vec<_> = catalog.tools.iter().map(|t| t.qualified_name()).collect();
    assert_eq!(names, vec!["calc__add", "files__read", "files__write"]);
    assert_eq!(catalog.failures.len(), 1);
    assert_eq!(catalog.failures[0].provider, "web");
    assert!(catalog.failures[0].message.contains("connection refused"));
}

#[tokio::test(start_paused = true)]
async fn same_provider_calls_run_in_order_and_results_keep_request_positions() {
    let log = call_log();
    let orchestrator = orchestrator(vec![
        (
            "slow",
            ScriptedProvider::new(&log)
                .echo("first", Duration::from_millis(300))
                .echo("second", Duration::from_millis(10)),
        ),
        ("fast", ScriptedProvider::new(&log).echo("ping", Duration::from_millis(1))),
    ]);

    let results = orchestrator
        .dispatch_calls(&[
            request("a", "slow__first", json!({"n": 1})),
            request("b", "fast__ping", json!({"n": 2})),
            request("c", "slow__second", json!({"n": 3})),
        ])
        .await;

    assert_eq!(
        logged(&log),
        vec!["fast/ping", "slow/first", "slow/second"]
    );
    let ids: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(results[0].outcome, ToolOutcome::success(json!({"n": 1})));
    assert_eq!(results[1].outcome, ToolOutcome::success(json!({"n": 2})));
    assert_eq!(results[2].outcome, ToolOutcome::success(json!({"n": 3})));
}

#[tokio::test]
async fn unknown_prefix_fails_only_its_own_request() {
    let log = call_log();
    let orchestrator =
        orchestrator(vec![("calc", ScriptedProvider::new(&log).echo("add", Duration::ZERO))]);

    let results = orchestrator
        .dispatch_calls(&[
            request("call_0", "weather__today", json!({})),
            request("call_1", "calc__add", json!({"a": 1})),
        ])
        .await;

    assert_eq!(results[0].provider, None);
    assert!(matches!(
        &results[0].outcome,
        ToolOutcome::Failure { reason } if reason.contains("weather__today")
    ));
    assert!(results[1].outcome.is_success());
    assert_eq!(logged(&log), vec!["calc/add"]);
}

#[tokio::test]
async fn tool_errors_become_failures_without_stopping_later_calls() {
    let log = call_log();
    let orchestrator = orchestrator(vec![(
        "calc",
        ScriptedProvider::new(&log)
            .tool("div", Duration::ZERO, |_| Err("division by zero".into()))
            .echo("add", Duration::ZERO),
    )]);

    let results = orchestrator
        .dispatch_calls(&[
            request("x", "calc__div", json!({"a": 1, "b": 0})),
            request("y", "calc__add", json!({"a": 1, "b": 1})),
        ])
        .await;

    assert!(matches!(
        &results[0].outcome,
        ToolOutcome::Failure { reason } if reason.contains("division by zero")
    ));
    assert!(results[0].render().starts_with("Error: "));
    assert!(results[1].outcome.is_success());
}

#[tokio::test]
async fn calc_add_round_trip_from_model_call_to_result() {
    let log = call_log();
    let orchestrator = orchestrator(vec![(
        "calc",
        ScriptedProvider::new(&log).tool("add", Duration::ZERO, |args| {
            let a = args["a"].as_i64().unwrap_or_default();
            let b = args["b"].as_i64().unwrap_or_default();
            Ok(json!(a + b))
        }),
    )]);

    let catalog = orchestrator.merged_tool_catalog(false).await;
    let tools = to_ollama_tools(&catalog.tools);
    assert_eq!(tools[0].function.name, "calc__add");

    let model_calls = vec![ModelToolCall::new("calc__add", json!({"a": 2, "b": 3}))];
    let requests = invocation_requests(&model_calls);
    let results = orchestrator.dispatch_calls(&requests).await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, requests[0].id);
    assert_eq!(results[0].provider.as_deref(), Some("calc"));
    assert_eq!(results[0].tool_name, "add");
    assert_eq!(results[0].outcome, ToolOutcome::success(json!(5)));
    assert_eq!(results[0].render(), "5");
}
