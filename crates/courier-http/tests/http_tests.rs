//! End-to-end request and response template behavior

use courier_expr::Bindings;
use courier_http::{HttpError, HttpsRequestObject, HttpsResponseObject, RequestTemplate, ResponseTemplate};
use courier_schema::{ConfigurationSpace, DiagnosticKind, RenderError, Renderer};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn bindings(value: Value) -> Bindings {
    value
        .as_object()
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn form_body_from_content_type() {
    let template = RequestTemplate::parse(&json!({
        "method": "POST",
        "url": "/login",
        "headers": {"content-type": "application/x-www-form-urlencoded"},
        "body": "user={{user}}&pass={{@pass}}"
    }))
    .unwrap();
    let inputs = bindings(json!({"user": "ada lovelace", "pass": "s3cret"}));

    let rendered = template.render(&Renderer::new(), &inputs).await.unwrap();
    assert_eq!(rendered.request.body.as_deref(), Some("user=ada+lovelace&pass=s3cret"));
    assert_eq!(
        rendered.request.headers,
        vec![("content-type".to_string(), "application/x-www-form-urlencoded".to_string())]
    );

    let preview = template.preview(&Renderer::new(), &inputs).await.unwrap();
    assert_eq!(preview.body.as_deref(), Some("user=ada+lovelace&pass=***"));
}

#[tokio::test]
async fn encoding_call_body() {
    let template = RequestTemplate::parse(&json!({
        "url": "/basic",
        "body": "base64('{{user}}:{{pass}}')"
    }))
    .unwrap();
    let rendered = template
        .render(&Renderer::new(), &bindings(json!({"user": "user", "pass": "pass"})))
        .await
        .unwrap();
    assert_eq!(rendered.request.body.as_deref(), Some("dXNlcjpwYXNz"));
    assert_eq!(rendered.request.header("content-type"), Some("application/octet-stream"));
}

#[tokio::test]
async fn partials_mix_into_one_request() {
    let base = RequestTemplate::parse(&json!({
        "url": "{{base}}/users/{{id}}",
        "headers": {"accept": "application/json"}
    }))
    .unwrap();
    let mixed = base
        .mix(&json!({"method": "PUT", "body": {"name": "{{name}}"}}))
        .unwrap();

    let rendered = mixed
        .render(
            &Renderer::new(),
            &bindings(json!({"base": "https://h.io", "id": 3, "name": "Ada"})),
        )
        .await
        .unwrap();
    assert_eq!(
        rendered.request,
        HttpsRequestObject::new("PUT", "https://h.io/users/3")
            .with_header("accept", "application/json")
            .with_header("content-type", "application/json")
            .with_body(r#"{"name":"Ada"}"#)
    );
}

#[tokio::test]
async fn configuration_supplies_host() {
    let config = ConfigurationSpace::from_value(&json!({
        "env": {
            "dev": {"base": "http://localhost:8080"},
            "prod": {"base": "https://api.example.com"}
        }
    }));
    let template = RequestTemplate::parse(&json!("GET {{base}}/health"))
        .unwrap()
        .with_config(config);

    let ambiguous = template.render(&Renderer::new(), &Bindings::new()).await.unwrap_err();
    assert!(matches!(ambiguous, HttpError::Render(RenderError::Unresolved { .. })));

    let rendered = template
        .render(&Renderer::new(), &bindings(json!({"env": "prod"})))
        .await
        .unwrap();
    assert_eq!(rendered.request.url, "https://api.example.com/health");
}

#[tokio::test]
async fn every_template_reports_its_own_mismatch() {
    let candidates = [
        ResponseTemplate::parse(&json!({"status": 201})).unwrap(),
        ResponseTemplate::parse(&json!({"status": "2xx", "body": r#"{"ok": true}"#})).unwrap(),
    ];
    let response = HttpsResponseObject::new(200).with_body(r#"{"ok": false}"#);
    for template in &candidates {
        let result = template
            .match_response(&response, &Renderer::new(), &Bindings::new())
            .await;
        assert!(!result.matched);
        assert!(!result.diagnostics.is_empty());
        assert!(result.preview.is_some());
    }
}

#[tokio::test]
async fn text_body_matches_exactly() {
    let template = ResponseTemplate::parse(&json!({
        "headers": {"content-type": "text/plain"},
        "body": "hello {{who}}"
    }))
    .unwrap();
    let hit = template
        .match_response(
            &HttpsResponseObject::new(200).with_body("hello world"),
            &Renderer::new(),
            &Bindings::new(),
        )
        .await;
    assert!(hit.matched, "{:?}", hit.diagnostics);
    assert_eq!(hit.values.get("who"), Some(&json!("world")));
}

#[tokio::test]
async fn computed_expectation_rejects_other_values() {
    let template = ResponseTemplate::parse(&json!({"body": r#"{"n": "{{n = x + 1}}"}"#})).unwrap();
    let result = template
        .match_response(
            &HttpsResponseObject::new(200).with_body(r#"{"n": 99}"#),
            &Renderer::new(),
            &bindings(json!({"x": 5})),
        )
        .await;
    assert!(!result.matched, "{:?}", result.values);
    assert!(result.values.is_empty());
    assert!(result.diagnostics.iter().any(|d| d.kind == DiagnosticKind::Conflict));
}

#[tokio::test]
async fn computed_expectation_accepts_its_value() {
    let template = ResponseTemplate::parse(&json!({"body": r#"{"n": "{{n = x + 1}}", "id": "{{id}}"}"#})).unwrap();
    let result = template
        .match_response(
            &HttpsResponseObject::new(200).with_body(r#"{"n": 6, "id": "a1"}"#),
            &Renderer::new(),
            &bindings(json!({"x": 5})),
        )
        .await;
    assert!(result.matched, "{:?}", result.diagnostics);
    assert_eq!(result.values.get("n"), Some(&json!(6)));
    assert_eq!(result.values.get("id"), Some(&json!("a1")));
    assert!(!result.values.contains_key("x"));
}

#[tokio::test]
async fn computed_expectation_waits_for_its_inputs() {
    let template = ResponseTemplate::parse(&json!({"body": r#"{"n": "{{n = x + 1}}"}"#})).unwrap();
    let result = template
        .match_response(
            &HttpsResponseObject::new(200).with_body(r#"{"n": 99}"#),
            &Renderer::new(),
            &Bindings::new(),
        )
        .await;
    assert!(result.matched, "{:?}", result.diagnostics);
    assert_eq!(result.values.get("n"), Some(&json!(99)));
}
