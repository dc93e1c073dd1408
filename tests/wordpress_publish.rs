mod http_stub;

use std::time::Duration;

use base64::Engine as _;
use http_stub::{HttpStub, Reply};
use pubhub::model::{PostStatus, WordPressCredentials};
use pubhub::wordpress::{NewPost, Publisher as _, WordPressClient};

fn creds(stub: &HttpStub) -> WordPressCredentials {
    WordPressCredentials {
        url: format!("{}/blog/", stub.base_url),
        username: "editor".to_owned(),
        application_password: "abcd efgh".to_owned(),
    }
}

#[tokio::test]
async fn publish_posts_with_basic_auth() -> anyhow::Result<()> {
    let stub = HttpStub::spawn(|_| {
        Reply::json(
            201,
            serde_json::json!({ "id": 42, "link": "https://blog.example/?p=42", "status": "draft" }),
        )
    });
    let client = WordPressClient::new(Duration::from_secs(5))?;

    let published = client
        .publish(
            &creds(&stub),
            &NewPost {
                title: "Feed Your Starter".to_owned(),
                content_html: "<p>Daily.</p>".to_owned(),
                excerpt: "Tips.".to_owned(),
                status: PostStatus::Draft,
            },
        )
        .await?;
    assert_eq!(published.id, 42);
    assert_eq!(published.link, "https://blog.example/?p=42");

    let requests = stub.requests();
    assert_eq!(requests.len(), 1);
    let req = &requests[0];
    assert_eq!(req.method, "POST");
    assert_eq!(req.path(), "/blog/wp-json/wp/v2/posts");

    let expected = format!(
        "Basic {}",
        base64::engine::general_purpose::STANDARD.encode("editor:abcd efgh")
    );
    assert_eq!(req.header("authorization"), Some(expected.as_str()));

    let body = req.json();
    assert_eq!(body["title"], "Feed Your Starter");
    assert_eq!(body["content"], "<p>Daily.</p>");
    assert_eq!(body["status"], "draft");
    Ok(())
}

#[tokio::test]
async fn wordpress_error_message_is_surfaced() -> anyhow::Result<()> {
    let stub = HttpStub::spawn(|_| {
        Reply::json(
            401,
            serde_json::json!({ "code": "rest_not_logged_in", "message": "You are not currently logged in." }),
        )
    });
    let client = WordPressClient::new(Duration::from_secs(5))?;

    let err = client.verify(&creds(&stub)).await.unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("401"), "{message}");
    assert!(message.contains("not currently logged in"), "{message}");
    assert_eq!(stub.requests()[0].path(), "/blog/wp-json/wp/v2/users/me");
    Ok(())
}

#[tokio::test]
async fn recent_posts_are_converted_to_markdown() -> anyhow::Result<()> {
    let stub = HttpStub::spawn(|_| {
        Reply::json(
            200,
            serde_json::json!([{
                "id": 7,
                "link": "https://blog.example/rye",
                "title": { "rendered": "Rye 101" },
                "content": { "rendered": "<h2>Why rye</h2><p>It is <strong>dense</strong>.</p>" }
            }]),
        )
    });
    let client = WordPressClient::new(Duration::from_secs(5))?;

    let posts = client.recent_posts(&creds(&stub), 5).await?;
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].title, "Rye 101");
    assert!(posts[0].content.contains("**dense**"), "{}", posts[0].content);
    assert!(stub.requests()[0].url.contains("per_page=5"));
    Ok(())
}
