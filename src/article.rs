use anyhow::Context as _;
use serde::Deserialize;

use crate::llm::{LlmClient, Prompt, extract_json};
use crate::model::{ArticleTemplate, BlogAnalysis, WritingPersona};
use crate::persona::{style_instructions, truncate_chars};
use crate::wordpress::RemotePost;

/// Per-post excerpt fed into blog analysis.
const POST_EXCERPT_CHARS: usize = 1_500;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeneratedArticle {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

pub async fn generate_article(
    llm: &dyn LlmClient,
    template: &ArticleTemplate,
    analysis: Option<&BlogAnalysis>,
    persona: Option<&WritingPersona>,
) -> anyhow::Result<GeneratedArticle> {
    if template.topic_prompt.trim().is_empty() {
        anyhow::bail!("template {} has an empty topic prompt", template.id);
    }

    let mut context = String::new();
    if let Some(analysis) = analysis {
        context.push_str(&format!(
            "Blog niche: {}\nAudience: {}\nHouse tone: {}\n",
            analysis.niche, analysis.audience, analysis.tone
        ));
        if !analysis.topics.is_empty() {
            context.push_str(&format!("Typical topics: {}\n", analysis.topics.join(", ")));
        }
        if !analysis.recent_titles.is_empty() {
            context.push_str(&format!(
                "Recent titles (do not repeat them):\n- {}\n",
                analysis.recent_titles.join("\n- ")
            ));
        }
        if !analysis.style_notes.trim().is_empty() {
            context.push_str(&format!("Style notes: {}\n", analysis.style_notes.trim()));
        }
    }
    if let Some(persona) = persona {
        context.push_str(&style_instructions(persona));
    }
    let keywords = if template.keywords.is_empty() {
        String::new()
    } else {
        format!("- Work in these keywords naturally: {}.\n", template.keywords.join(", "))
    };

    let prompt = Prompt::new(format!(
        "{context}\n\
Write a blog post.\n\
Topic: {topic}\n\
Tone: {tone}\n\
\n\
Rules:\n\
- About {words} words, Markdown body with ## subheadings.\n\
- Do not include the title in the body.\n\
{keywords}\
\n\
Output ONLY a single JSON object (no commentary):\n\
{{\"title\":\"...\",\"content\":\"markdown\",\"excerpt\":\"one or two sentences\",\"tags\":[\"...\"]}}\n",
        topic = template.topic_prompt.trim(),
        tone = template.tone,
        words = template.word_count,
    ))
    .with_system("You are an experienced blog writer.")
    .with_temperature(0.7);

    tracing::info!(template = %template.id, words = template.word_count, "generate article");
    let raw = llm.complete(&prompt).await.context("call llm for article")?;
    let mut article: GeneratedArticle = extract_json(&raw).context("parse article json")?;

    article.title = article.title.trim().to_owned();
    article.content = article.content.trim().to_owned();
    if article.title.is_empty() {
        anyhow::bail!("generated article has no title");
    }
    if article.content.is_empty() {
        anyhow::bail!("generated article has no content");
    }
    article.tags.retain(|t| !t.trim().is_empty());
    Ok(article)
}

pub async fn analyze_blog(
    llm: &dyn LlmClient,
    site_name: &str,
    posts: &[RemotePost],
) -> anyhow::Result<BlogAnalysis> {
    if posts.is_empty() {
        anyhow::bail!("no posts to analyze for {site_name}");
    }

    let mut samples = String::new();
    for (idx, post) in posts.iter().enumerate() {
        samples.push_str(&format!(
            "### Post {}: {}\n{}\n\n",
            idx + 1,
            post.title,
            truncate_chars(&post.content, POST_EXCERPT_CHARS)
        ));
    }

    let prompt = Prompt::new(format!(
        "Here are recent posts from the blog \"{site_name}\".\n\
\n\
{samples}\
Describe the blog so new posts fit in.\n\
Output ONLY a single JSON object (no commentary):\n\
{{\"niche\":\"...\",\"audience\":\"...\",\"tone\":\"...\",\"topics\":[\"...\"],\"style_notes\":\"...\"}}\n"
    ))
    .with_system("You are a content strategist.")
    .with_temperature(0.2);

    tracing::info!(site = site_name, posts = posts.len(), "analyze blog");
    let raw = llm.complete(&prompt).await.context("call llm for blog analysis")?;
    let mut analysis: BlogAnalysis = extract_json(&raw).context("parse blog analysis")?;
    analysis.recent_titles = posts.iter().map(|p| p.title.clone()).collect();
    Ok(analysis)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    struct Canned {
        reply: &'static str,
        last_prompt: Mutex<String>,
    }

    #[async_trait]
    impl LlmClient for Canned {
        async fn complete(&self, prompt: &Prompt) -> anyhow::Result<String> {
            *self.last_prompt.lock().unwrap() = prompt.user.clone();
            Ok(self.reply.to_owned())
        }
    }

    fn canned(reply: &'static str) -> Canned {
        Canned {
            reply,
            last_prompt: Mutex::new(String::new()),
        }
    }

    fn template() -> ArticleTemplate {
        ArticleTemplate {
            id: "tpl".to_owned(),
            site_id: "site".to_owned(),
            name: "Weekly tips".to_owned(),
            topic_prompt: "Sourdough tips for beginners".to_owned(),
            word_count: 800,
            tone: "friendly".to_owned(),
            keywords: vec!["starter".to_owned()],
        }
    }

    #[tokio::test]
    async fn article_prompt_carries_analysis_and_keywords() -> anyhow::Result<()> {
        let llm = canned(
            "```json\n{\"title\":\"Feed Your Starter\",\"content\":\"## Why\\nBecause.\",\"excerpt\":\"Tips.\",\"tags\":[\"bread\",\"\"]}\n```",
        );
        let analysis = BlogAnalysis {
            niche: "home baking".to_owned(),
            recent_titles: vec!["Rye 101".to_owned()],
            ..BlogAnalysis::default()
        };
        let article = generate_article(&llm, &template(), Some(&analysis), None).await?;
        assert_eq!(article.title, "Feed Your Starter");
        assert_eq!(article.tags, vec!["bread".to_owned()]);

        let prompt = llm.last_prompt.lock().unwrap().clone();
        assert!(prompt.contains("home baking"));
        assert!(prompt.contains("Rye 101"));
        assert!(prompt.contains("starter"));
        Ok(())
    }

    #[tokio::test]
    async fn article_without_content_is_rejected() {
        let llm = canned("{\"title\":\"Empty\",\"content\":\"  \"}");
        assert!(generate_article(&llm, &template(), None, None).await.is_err());
    }

    #[tokio::test]
    async fn blog_analysis_records_recent_titles() -> anyhow::Result<()> {
        let llm = canned(
            "{\"niche\":\"baking\",\"audience\":\"hobbyists\",\"tone\":\"warm\",\"topics\":[\"bread\"]}",
        );
        let posts = vec![RemotePost {
            title: "Rye 101".to_owned(),
            content: "Rye is dense.".to_owned(),
            link: "https://b.example/rye".to_owned(),
        }];
        let analysis = analyze_blog(&llm, "Crumb", &posts).await?;
        assert_eq!(analysis.niche, "baking");
        assert_eq!(analysis.recent_titles, vec!["Rye 101".to_owned()]);
        Ok(())
    }
}
