use std::time::Duration;

use serde_json::{json, Value};
use shared::error::PipelineError;
use shared::openai_client::{GenerationClient, OpenAiClient, OpenAiConfig, PromptedRequest};
use shared::output_schema::{scale_kind, FieldKind, OutputSchema};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer, timeout: Duration) -> OpenAiClient {
    OpenAiClient::new(OpenAiConfig {
        api_key: "test-key".into(),
        api_base: server.uri(),
        model: "gpt-test".into(),
        temperature: 0.0,
        timeout,
        max_parallel: 2,
    })
    .unwrap()
}

fn schema() -> OutputSchema {
    OutputSchema::new("answer_theme_identifier", "Tag an answer")
        .list("themes", "themes of the answer")
        .field("theme", "theme name", FieldKind::TextEnum(vec!["Price".into()]))
        .field("urgency", "1-5", scale_kind())
}

fn tool_reply(name: &str, arguments: &str) -> Value {
    json!({
        "choices": [{
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": { "name": name, "arguments": arguments }
                }]
            }
        }]
    })
}

fn request() -> PromptedRequest {
    PromptedRequest::new("17", "The respondent's answer: way too expensive")
}

#[tokio::test]
async fn tool_call_arguments_become_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "gpt-test",
            "tool_choice": { "type": "function", "function": { "name": "answer_theme_identifier" } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(tool_reply(
            "answer_theme_identifier",
            r#"{"themes":[{"theme":"Price","urgency":4}]}"#,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let res = client(&server, Duration::from_secs(5))
        .invoke_one(&request(), &schema())
        .await
        .unwrap();
    assert_eq!(res.correlation_key, "17");
    assert_eq!(res.payload, json!({"themes": [{"theme": "Price", "urgency": 4}]}));
}

#[tokio::test]
async fn fenced_arguments_are_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tool_reply(
            "answer_theme_identifier",
            "```json\n{\"themes\":[]}\n```",
        )))
        .mount(&server)
        .await;

    let res = client(&server, Duration::from_secs(5))
        .invoke_one(&request(), &schema())
        .await
        .unwrap();
    assert_eq!(res.payload, json!({"themes": []}));
}

#[tokio::test]
async fn rate_limit_is_service_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let err = client(&server, Duration::from_secs(5))
        .invoke_one(&request(), &schema())
        .await
        .unwrap_err();
    assert_eq!(err, PipelineError::unavailable("HTTP 429"));
}

#[tokio::test]
async fn plain_text_reply_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": "Price, I think" } }]
        })))
        .mount(&server)
        .await;

    let err = client(&server, Duration::from_secs(5))
        .invoke_one(&request(), &schema())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::MalformedOutput(_)));
}

#[tokio::test]
async fn call_to_other_function_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tool_reply(
            "survey_theme_identifier",
            r#"{"major_themes":[]}"#,
        )))
        .mount(&server)
        .await;

    let err = client(&server, Duration::from_secs(5))
        .invoke_one(&request(), &schema())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::MalformedOutput(_)));
}

#[tokio::test]
async fn slow_reply_times_out_as_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(tool_reply("answer_theme_identifier", r#"{"themes":[]}"#))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let err = client(&server, Duration::from_millis(50))
        .invoke_one(&request(), &schema())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::ServiceUnavailable(_)));
}

#[tokio::test]
async fn batch_keeps_request_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tool_reply(
            "answer_theme_identifier",
            r#"{"themes":[]}"#,
        )))
        .expect(3)
        .mount(&server)
        .await;

    let requests = ["5", "3", "9"]
        .iter()
        .map(|k| PromptedRequest::new(*k, "prompt"))
        .collect();
    let replies = client(&server, Duration::from_secs(5))
        .invoke_batch(requests, &schema())
        .await;
    let keys: Vec<&str> = replies.iter().map(|r| r.correlation_key.as_str()).collect();
    assert_eq!(keys, ["5", "3", "9"]);
    assert!(replies.iter().all(|r| r.result.is_ok()));
}
