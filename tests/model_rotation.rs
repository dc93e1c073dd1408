mod http_stub;

use http_stub::{HttpStub, Reply, chat_completion};
use pubhub::llm::{LlmClient, Prompt};
use pubhub::openrouter::OpenRouterClient;

fn model_of(req: &http_stub::Recorded) -> String {
    req.json()["model"].as_str().unwrap_or_default().to_owned()
}

fn client(stub: &HttpStub, models: &[&str], tries: usize) -> OpenRouterClient {
    OpenRouterClient::new(
        reqwest::Client::new(),
        &format!("{}/api/v1", stub.base_url),
        "test-key",
        models.iter().map(|m| (*m).to_owned()).collect(),
        tries,
    )
    .unwrap()
}

#[tokio::test]
async fn rate_limited_model_rotates_to_the_next() -> anyhow::Result<()> {
    let stub = HttpStub::spawn(|req| match model_of(req).as_str() {
        "vendor/a" => Reply::json(
            429,
            serde_json::json!({ "error": { "message": "rate limited" } }),
        ),
        _ => Reply::json(200, chat_completion("hello from b")),
    });

    let text = client(&stub, &["vendor/a", "vendor/b", "vendor/c"], 3)
        .complete(&Prompt::new("hi"))
        .await?;
    assert_eq!(text, "hello from b");

    let requests = stub.requests();
    let models = requests.iter().map(model_of).collect::<Vec<_>>();
    assert_eq!(models, vec!["vendor/a", "vendor/b"]);
    assert_eq!(requests[0].path(), "/api/v1/chat/completions");
    assert_eq!(requests[0].header("authorization"), Some("Bearer test-key"));
    assert!(requests[0].header("x-title").is_some());
    Ok(())
}

#[tokio::test]
async fn never_sends_more_than_the_ceiling() {
    let stub = HttpStub::spawn(|_| {
        Reply::json(503, serde_json::json!({ "error": { "message": "overloaded" } }))
    });

    let err = client(&stub, &["a", "b", "c", "d"], 2)
        .complete(&Prompt::new("hi"))
        .await
        .unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("all 2 OpenRouter model tries failed"), "{message}");
    assert!(message.contains("overloaded"), "{message}");
    assert_eq!(stub.requests().len(), 2);
}

#[tokio::test]
async fn error_object_in_success_body_rotates() -> anyhow::Result<()> {
    let stub = HttpStub::spawn(|req| match model_of(req).as_str() {
        "a" => Reply::json(200, serde_json::json!({ "error": { "message": "upstream failed" } })),
        "b" => Reply::json(200, chat_completion("   ")),
        _ => Reply::json(200, chat_completion("third time lucky")),
    });

    let text = client(&stub, &["a", "b", "c"], 3)
        .complete(&Prompt::new("hi"))
        .await?;
    assert_eq!(text, "third time lucky");
    assert_eq!(stub.requests().len(), 3);
    Ok(())
}

#[tokio::test]
async fn bad_credentials_stop_immediately() {
    let stub = HttpStub::spawn(|_| {
        Reply::json(401, serde_json::json!({ "error": { "message": "invalid key" } }))
    });

    let err = client(&stub, &["a", "b"], 2)
        .complete(&Prompt::new("hi"))
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("invalid key"));
    assert_eq!(stub.requests().len(), 1);
}
