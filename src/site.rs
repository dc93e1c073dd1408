use std::time::Duration;

use anyhow::Context as _;
use chrono::Utc;

use crate::article::analyze_blog;
use crate::cli::{SiteAddArgs, SiteAnalyzeArgs, SiteRefArgs, TemplateAddArgs};
use crate::config::LlmConfig;
use crate::credentials::{CredentialStore, validate_credentials};
use crate::llm::build_client;
use crate::model::{ArticleTemplate, WordPressCredentials, WordPressSite, new_id};
use crate::store::{LocalFsStore, PublishingStore};
use crate::wordpress::WordPressClient;

pub const WORDPRESS_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn add(args: SiteAddArgs) -> anyhow::Result<()> {
    let creds = WordPressCredentials {
        url: args.url.trim().trim_end_matches('/').to_owned(),
        username: args.username.trim().to_owned(),
        application_password: args.app_password,
    };
    validate_credentials(&creds)?;
    if args.name.trim().is_empty() {
        anyhow::bail!("site name is required");
    }

    let store = LocalFsStore::new(&args.store.data_dir);
    let site = WordPressSite {
        id: new_id(),
        name: args.name.trim().to_owned(),
        url: creds.url.clone(),
        username: creds.username.clone(),
        created_at: Utc::now(),
    };
    CredentialStore::new(&args.store.data_dir)
        .save(&site.id, &creds)
        .await?;
    store.put_site(&site).await.context("save site")?;

    tracing::info!(site_id = %site.id, url = %site.url, "site added");
    println!("{}", site.id);
    Ok(())
}

pub async fn remove(args: SiteRefArgs) -> anyhow::Result<()> {
    let store = LocalFsStore::new(&args.store.data_dir);
    let removed_site = store.delete_site(&args.site_id).await?;
    let removed_creds = CredentialStore::new(&args.store.data_dir)
        .delete(&args.site_id)
        .await?;
    if !removed_site && !removed_creds {
        anyhow::bail!("site not found: {}", args.site_id);
    }
    tracing::info!(site_id = %args.site_id, "site removed");
    Ok(())
}

pub async fn verify(args: SiteRefArgs) -> anyhow::Result<()> {
    let creds = load_credentials(&args.store.data_dir, &args.site_id).await?;
    let user = WordPressClient::new(WORDPRESS_TIMEOUT)?
        .verify(&creds)
        .await
        .with_context(|| format!("verify {}", creds.url))?;
    println!("ok: authenticated as {} (id {})", user.name, user.id);
    Ok(())
}

/// Analyzes recent posts and stores the result on every schedule of the site.
pub async fn analyze(args: SiteAnalyzeArgs) -> anyhow::Result<()> {
    let store = LocalFsStore::new(&args.store.data_dir);
    let site = store
        .get_site(&args.site_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("site not found: {}", args.site_id))?;
    let creds = load_credentials(&args.store.data_dir, &site.id).await?;
    let llm = build_client(args.engine, &LlmConfig::from_env()?)?;

    let posts = WordPressClient::new(WORDPRESS_TIMEOUT)?
        .recent_posts(&creds, args.posts)
        .await
        .context("fetch recent posts")?;
    let analysis = analyze_blog(llm.as_ref(), &site.name, &posts).await?;

    let mut updated = 0;
    for mut schedule in store.list_schedules().await? {
        if schedule.site_id != site.id {
            continue;
        }
        schedule.blog_analysis = Some(analysis.clone());
        store.put_schedule(&schedule).await.context("save schedule")?;
        updated += 1;
    }
    tracing::info!(site_id = %site.id, posts = posts.len(), schedules = updated, "blog analyzed");

    println!(
        "{}",
        serde_json::to_string_pretty(&analysis).context("serialize analysis")?
    );
    Ok(())
}

pub async fn add_template(args: TemplateAddArgs) -> anyhow::Result<()> {
    let store = LocalFsStore::new(&args.store.data_dir);
    if store.get_site(&args.site_id).await?.is_none() {
        anyhow::bail!("site not found: {}", args.site_id);
    }
    if args.topic.trim().is_empty() {
        anyhow::bail!("template topic is required");
    }
    if args.words == 0 {
        anyhow::bail!("--words must be > 0");
    }

    let template = ArticleTemplate {
        id: new_id(),
        site_id: args.site_id,
        name: args.name,
        topic_prompt: args.topic.trim().to_owned(),
        word_count: args.words,
        tone: args.tone,
        keywords: args
            .keywords
            .into_iter()
            .map(|k| k.trim().to_owned())
            .filter(|k| !k.is_empty())
            .collect(),
    };
    store.put_template(&template).await.context("save template")?;
    println!("{}", template.id);
    Ok(())
}

async fn load_credentials(
    data_dir: &std::path::Path,
    site_id: &str,
) -> anyhow::Result<WordPressCredentials> {
    CredentialStore::new(data_dir)
        .get(site_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no credentials stored for site {site_id}"))
}
