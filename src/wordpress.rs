use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use serde::Deserialize;

use crate::model::{PostStatus, WordPressCredentials};

#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    pub title: String,
    pub content_html: String,
    pub excerpt: String,
    pub status: PostStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PublishedPost {
    pub id: u64,
    pub link: String,
}

/// A post fetched for blog analysis, with its body converted to Markdown.
#[derive(Debug, Clone, PartialEq)]
pub struct RemotePost {
    pub title: String,
    pub content: String,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WordPressUser {
    pub id: u64,
    pub name: String,
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        creds: &WordPressCredentials,
        post: &NewPost,
    ) -> anyhow::Result<PublishedPost>;
}

#[derive(Debug, Clone)]
pub struct WordPressClient {
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct Rendered {
    #[serde(default)]
    rendered: String,
}

#[derive(Debug, Deserialize)]
struct PostResponse {
    title: Rendered,
    content: Rendered,
    #[serde(default)]
    link: String,
}

impl WordPressClient {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build wordpress http client")?;
        Ok(Self { client })
    }

    /// Checks the Application Password by fetching the authenticated user.
    pub async fn verify(&self, creds: &WordPressCredentials) -> anyhow::Result<WordPressUser> {
        let url = api_url(&creds.url, "users/me");
        let response = self
            .client
            .get(&url)
            .basic_auth(&creds.username, Some(&creds.application_password))
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        read_json(response, "verify credentials").await
    }

    pub async fn recent_posts(
        &self,
        creds: &WordPressCredentials,
        limit: usize,
    ) -> anyhow::Result<Vec<RemotePost>> {
        let url = api_url(&creds.url, "posts");
        let per_page = limit.clamp(1, 100).to_string();
        let response = self
            .client
            .get(&url)
            .basic_auth(&creds.username, Some(&creds.application_password))
            .query(&[("per_page", per_page.as_str()), ("status", "publish")])
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let posts: Vec<PostResponse> = read_json(response, "list posts").await?;

        Ok(posts
            .into_iter()
            .map(|post| RemotePost {
                title: html2md::parse_html(&post.title.rendered).trim().to_owned(),
                content: html2md::parse_html(&post.content.rendered).trim().to_owned(),
                link: post.link,
            })
            .collect())
    }
}

#[async_trait]
impl Publisher for WordPressClient {
    async fn publish(
        &self,
        creds: &WordPressCredentials,
        post: &NewPost,
    ) -> anyhow::Result<PublishedPost> {
        let url = api_url(&creds.url, "posts");
        let body = serde_json::json!({
            "title": post.title,
            "content": post.content_html,
            "excerpt": post.excerpt,
            "status": post.status.as_wordpress(),
        });
        tracing::info!(url = %url, title = %post.title, status = post.status.as_wordpress(), "publish post");
        let response = self
            .client
            .post(&url)
            .basic_auth(&creds.username, Some(&creds.application_password))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        read_json(response, "publish post").await
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    what: &str,
) -> anyhow::Result<T> {
    let status = response.status();
    let raw = response
        .text()
        .await
        .with_context(|| format!("{what}: read response body"))?;
    if !status.is_success() {
        let message = serde_json::from_str::<serde_json::Value>(&raw)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_owned))
            .unwrap_or(raw);
        anyhow::bail!("{what}: WordPress API error ({status}): {message}");
    }
    serde_json::from_str(&raw).with_context(|| format!("{what}: parse WordPress response"))
}

pub fn api_url(site_url: &str, path: &str) -> String {
    format!(
        "{}/wp-json/wp/v2/{}",
        site_url.trim().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_url_joins_without_double_slashes() {
        assert_eq!(
            api_url("https://blog.example.com/", "/posts"),
            "https://blog.example.com/wp-json/wp/v2/posts"
        );
        assert_eq!(
            api_url("http://localhost:8080/wp", "users/me"),
            "http://localhost:8080/wp/wp-json/wp/v2/users/me"
        );
    }
}
