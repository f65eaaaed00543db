//! Sequence execution end to end

use courier_flow::{
    CancellationSignal, EngineConfig, Flow, FlowContext, FlowError, FlowRegistry, FlowResult, FlowRuntime, FnFlow,
    HttpsSequenceFlow,
};
use courier_schema::Encoding;
use courier_test_utils::{
    bindings, context, context_with, init_tracing, json_response, status_response, ScriptedDispatcher,
};
use futures::FutureExt;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn flow(document: &str) -> Arc<HttpsSequenceFlow> {
    init_tracing();
    Arc::new(HttpsSequenceFlow::from_document("test", document, Encoding::Json).unwrap())
}

#[tokio::test]
async fn outcome_skips_steps() {
    let dispatcher = Arc::new(ScriptedDispatcher::replying([status_response(200), status_response(200)]));
    let flow = flow(">>> a\nGET /a\n\n<<< 200 c\n\n>>> b\nGET /b\n\n>>> c\nGET /c\n\n<<< 200\n");

    let result = flow.run(bindings(json!({})), context(dispatcher.clone())).await.unwrap();
    assert_eq!(result.outcome, None);
    assert_eq!(dispatcher.urls(), vec!["/a", "/c"]);
}

#[tokio::test]
async fn captures_flow_into_later_requests() {
    let dispatcher = Arc::new(ScriptedDispatcher::replying([
        json_response(201, &json!({"id": 42})),
        json_response(200, &json!({"name": "Ada"})),
    ]));
    let flow = flow(
        ">>>\nPOST /users\n\n{\"name\": \"{{name}}\"}\n\n<<< 201\n\n{\"id\": \"{{id}}\"}\n\n\
         >>>\nGET /users/{{id}}\n\n<<< 2xx\n",
    );

    let result = flow
        .run(bindings(json!({"name": "Ada"})), context(dispatcher.clone()))
        .await
        .unwrap();
    assert_eq!(result.values["id"], json!(42));
    assert_eq!(dispatcher.urls(), vec!["/users", "/users/42"]);
    assert_eq!(dispatcher.requests()[0].body.as_deref(), Some(r#"{"name":"Ada"}"#));
}

#[tokio::test]
async fn computed_response_values_must_match() {
    let document = ">>> count\nGET /count\n\n<<< 200\n\n{\"n\": \"{{n = x + 1}}\"}\n";
    let dispatcher = Arc::new(ScriptedDispatcher::replying([
        json_response(200, &json!({"n": 6})),
        json_response(200, &json!({"n": 99})),
    ]));

    let result = flow(document)
        .run(bindings(json!({"x": 5})), context(dispatcher.clone()))
        .await
        .unwrap();
    assert_eq!(result.values["n"], json!(6));

    let err = flow(document)
        .run(bindings(json!({"x": 5})), context(dispatcher))
        .await
        .unwrap_err();
    let FlowError::UnmatchedResponse { step, status, .. } = err else {
        panic!("expected an unmatched response");
    };
    assert_eq!((step.as_str(), status), ("count", 200));
}

#[tokio::test]
async fn request_without_responses_accepts_anything() {
    let dispatcher = Arc::new(ScriptedDispatcher::replying([status_response(500)]));
    let flow = flow(">>>\nDELETE /cache\n");

    let result = flow.run(bindings(json!({})), context(dispatcher.clone())).await.unwrap();
    assert_eq!(result.outcome, None);
    assert_eq!(dispatcher.requests()[0].method, "DELETE");
}

#[tokio::test]
async fn script_updates_values() {
    let dispatcher = Arc::new(ScriptedDispatcher::new());
    let flow = flow("::: bump\nx = x + 1\n");

    let result = flow.run(bindings(json!({"x": 5})), context(dispatcher)).await.unwrap();
    assert_eq!(result.values["x"], json!(6));
}

#[tokio::test]
async fn script_errors_name_the_step() {
    let flow = flow("::: bump\nx = missing + 1\n");
    let err = flow
        .run(bindings(json!({})), context(Arc::new(ScriptedDispatcher::new())))
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::Script { ref step, .. } if step == "bump"));
}

#[tokio::test]
async fn zero_budget_exhausts_on_first_failure() {
    let dispatcher = Arc::new(ScriptedDispatcher::replying([status_response(503)]));
    let flow = flow(">>> poll/0\nGET /poll\n\n<<< 200\n");

    let err = flow.run(bindings(json!({})), context(dispatcher.clone())).await.unwrap_err();
    assert!(matches!(err, FlowError::RetryExhausted { ref step, visits: 1 } if step == "poll"));
    assert_eq!(dispatcher.requests().len(), 1);
}

#[tokio::test]
async fn step_retries_until_match() {
    let dispatcher = Arc::new(ScriptedDispatcher::replying([
        status_response(503),
        status_response(503),
        status_response(200),
    ]));
    let flow = flow(">>> poll/2\nGET /poll\n\n<<< 200\n");

    flow.run(bindings(json!({})), context(dispatcher.clone())).await.unwrap();
    assert_eq!(dispatcher.requests().len(), 3);
}

#[tokio::test]
async fn polling_loop_bounded_by_budget() {
    let dispatcher = Arc::new(ScriptedDispatcher::replying((0..5).map(|_| status_response(202))));
    let flow = flow(">>> poll/2\nGET /poll\n\n<<< 202 poll\n<<< 200\n");

    let err = flow.run(bindings(json!({})), context(dispatcher.clone())).await.unwrap_err();
    assert!(matches!(err, FlowError::RetryExhausted { visits: 3, .. }));
    assert_eq!(dispatcher.requests().len(), 3);
}

#[tokio::test]
async fn unmatched_response_reports_every_candidate() {
    let dispatcher = Arc::new(ScriptedDispatcher::replying([status_response(404)]));
    let flow = flow(">>> get\nGET /thing\n\n<<< 200\n<<< 201\n");

    let err = flow.run(bindings(json!({})), context(dispatcher)).await.unwrap_err();
    let FlowError::UnmatchedResponse { step, status, mismatches } = err else {
        panic!("expected unmatched response");
    };
    assert_eq!(step, "get");
    assert_eq!(status, 404);
    assert_eq!(mismatches.iter().map(|m| m.candidate).collect::<Vec<_>>(), vec![0, 1]);
    assert!(mismatches
        .iter()
        .all(|m| m.diagnostics.iter().any(|d| d.path == "status")));
}

#[tokio::test]
async fn fail_outcome_and_sequence_attempts() {
    let dispatcher = Arc::new(ScriptedDispatcher::replying([status_response(500), status_response(200)]));
    let flow = flow("attempts: 2\n>>> call\nGET /call\n\n<<< 500 fail\n<<< 200\n");

    flow.run(bindings(json!({})), context(dispatcher.clone())).await.unwrap();
    assert_eq!(dispatcher.requests().len(), 2);

    let single = Arc::new(ScriptedDispatcher::replying([status_response(500)]));
    let once = self::flow(">>> call\nGET /call\n\n<<< 500 fail\n");
    let err = once.run(bindings(json!({})), context(single)).await.unwrap_err();
    assert!(matches!(err, FlowError::Failed { ref step } if step == "call"));
}

#[tokio::test]
async fn unknown_outcome_ends_sequence() {
    let dispatcher = Arc::new(ScriptedDispatcher::replying([status_response(200)]));
    let flow = flow(">>>\nGET /a\n\n<<< 200 done\n\n>>>\nGET /b\n");

    let result = flow.run(bindings(json!({})), context(dispatcher.clone())).await.unwrap();
    assert_eq!(result.outcome.as_deref(), Some("done"));
    assert_eq!(dispatcher.urls(), vec!["/a"]);
}

#[tokio::test]
async fn transition_limit_stops_loops() {
    let dispatcher = Arc::new(ScriptedDispatcher::replying((0..10).map(|_| status_response(200))));
    let runtime = FlowRuntime::new(dispatcher.clone()).with_config(EngineConfig::new().with_max_transitions(3));
    let flow = flow(">>> spin\nGET /spin\n\n<<< 200 spin\n");

    let err = flow
        .run(bindings(json!({})), FlowContext::new(Arc::new(runtime)))
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::TransitionLimit(3)));
    assert_eq!(dispatcher.requests().len(), 3);
}

#[tokio::test]
async fn defaults_fill_missing_inputs() {
    let dispatcher = Arc::new(ScriptedDispatcher::replying([status_response(200), status_response(200)]));
    let flow = flow("defaults:\n  page: 1\n>>>\nGET /items?page={{page}}\n");

    flow.run(bindings(json!({})), context(dispatcher.clone())).await.unwrap();
    flow.run(bindings(json!({"page": 4})), context(dispatcher.clone())).await.unwrap();
    assert_eq!(dispatcher.urls(), vec!["/items?page=1", "/items?page=4"]);
}

fn login_flow(runs: Arc<AtomicUsize>) -> Arc<FnFlow> {
    Arc::new(FnFlow::new("login", move |values, _ctx| {
        let runs = Arc::clone(&runs);
        async move {
            runs.fetch_add(1, Ordering::SeqCst);
            let user = values.get("user").cloned().unwrap_or_default();
            Ok(FlowResult::with_values(bindings(json!({"token": format!("t-{}", user.as_str().unwrap_or("anon"))}))))
        }
        .boxed()
    }))
}

#[tokio::test]
async fn uses_run_before_the_sequence() {
    let runs = Arc::new(AtomicUsize::new(0));
    let registry = FlowRegistry::new();
    registry.register(login_flow(Arc::clone(&runs)));
    let flow = flow(
        "use:\n  - flow: login\n    provides: [token]\n    values: { user: ada }\n\
         >>>\nGET /me\nAuthorization: Bearer {{token}}\n",
    );

    let dispatcher = Arc::new(ScriptedDispatcher::replying([status_response(200), status_response(200)]));
    let result = flow
        .run(bindings(json!({})), context_with(dispatcher.clone(), registry.clone()))
        .await
        .unwrap();
    assert_eq!(result.values["token"], json!("t-ada"));
    assert_eq!(dispatcher.requests()[0].header("authorization"), Some("Bearer t-ada"));
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    flow.run(bindings(json!({"token": "given"})), context_with(dispatcher.clone(), registry))
        .await
        .unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(dispatcher.requests()[1].header("authorization"), Some("Bearer given"));
}

#[tokio::test]
async fn unknown_use_is_an_error() {
    let flow = flow("use: [missing]\n>>>\nGET /\n");
    let err = flow
        .run(bindings(json!({})), context(Arc::new(ScriptedDispatcher::new())))
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::UnknownFlow(ref name) if name == "missing"));
}

#[tokio::test]
async fn registry_threads_context() {
    let registry = FlowRegistry::new();
    registry.register(login_flow(Arc::new(AtomicUsize::new(0))));
    let ctx = context_with(Arc::new(ScriptedDispatcher::new()), registry.clone());

    let (result, next) = registry.run("login", bindings(json!({"user": "bob"})), &ctx).await.unwrap();
    assert_eq!(result.values["token"], json!("t-bob"));
    assert_eq!(next.environment()["token"], json!("t-bob"));
    assert!(ctx.environment().is_empty());
    assert_eq!(registry.names(), vec!["login"]);
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_delay() {
    let dispatcher = Arc::new(ScriptedDispatcher::replying([status_response(200), status_response(200)]));
    let flow = flow(">>> a\nGET /a\n\n<<< 200 b+10s\n\n>>> b\nGET /b\n");
    let (handle, signal) = CancellationSignal::channel();
    let ctx = context(dispatcher.clone()).with_cancellation(signal);

    let running = tokio::spawn({
        let flow = Arc::clone(&flow);
        async move { flow.run(bindings(json!({})), ctx).await }
    });
    tokio::time::sleep(Duration::from_secs(1)).await;
    handle.cancel();

    let err = running.await.unwrap().unwrap_err();
    assert!(matches!(err, FlowError::Cancelled));
    assert_eq!(dispatcher.urls(), vec!["/a"]);
}

#[tokio::test(start_paused = true)]
async fn delay_elapses_before_next_step() {
    let dispatcher = Arc::new(ScriptedDispatcher::replying([status_response(200), status_response(200)]));
    let flow = flow(">>> a\nGET /a\n\n<<< 200 b+2s\n\n>>> b\nGET /b\n");

    let started = tokio::time::Instant::now();
    flow.run(bindings(json!({})), context(dispatcher.clone())).await.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert_eq!(dispatcher.urls(), vec!["/a", "/b"]);
}

#[tokio::test]
async fn dispatch_failure_without_budget_propagates() {
    let flow = flow(">>> a\nGET /a\n");
    let err = flow
        .run(bindings(json!({})), context(Arc::new(ScriptedDispatcher::new())))
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::Dispatch { ref step, .. } if step == "a"));
    assert!(err.is_retryable());
}
