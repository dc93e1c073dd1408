use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::MissedTickBehavior;

use crate::article::generate_article;
use crate::cli::SchedulerRunArgs;
use crate::config::LlmConfig;
use crate::credentials::CredentialStore;
use crate::llm::{LlmClient, build_client};
use crate::markdown::to_html;
use crate::model::{ArticleStatus, PublicationSchedule, ScheduledArticle};
use crate::schedule::advance_next_run;
use crate::store::{LocalFsStore, PublishingStore};
use crate::wordpress::{NewPost, Publisher, WordPressClient};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub skipped: bool,
    pub due: usize,
    pub published: usize,
    pub failed: usize,
}

impl TickReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

pub struct AutoPublisher {
    store: Arc<dyn PublishingStore>,
    credentials: CredentialStore,
    llm: Arc<dyn LlmClient>,
    publisher: Arc<dyn Publisher>,
    processing: AtomicBool,
}

/// Clears the processing flag however the tick ends.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl AutoPublisher {
    pub fn new(
        store: Arc<dyn PublishingStore>,
        credentials: CredentialStore,
        llm: Arc<dyn LlmClient>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            store,
            credentials,
            llm,
            publisher,
            processing: AtomicBool::new(false),
        }
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    pub async fn tick(&self) -> anyhow::Result<TickReport> {
        self.tick_at(Utc::now()).await
    }

    pub async fn tick_at(&self, now: DateTime<Utc>) -> anyhow::Result<TickReport> {
        if self
            .processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("tick already in progress; skipping");
            return Ok(TickReport::skipped());
        }
        let _guard = ProcessingGuard(&self.processing);

        let due = self
            .store
            .due_schedules(now)
            .await
            .context("load due schedules")?;
        let mut report = TickReport {
            due: due.len(),
            ..TickReport::default()
        };
        if !due.is_empty() {
            tracing::info!(due = due.len(), "processing due schedules");
        }

        for mut schedule in due {
            match self.run_schedule(&schedule, now).await {
                Ok(article) if article.status == ArticleStatus::Published => report.published += 1,
                Ok(_) => report.failed += 1,
                Err(err) => {
                    tracing::error!(schedule_id = %schedule.id, ?err, "schedule run failed");
                    report.failed += 1;
                }
            }

            advance_next_run(&mut schedule, now);
            if let Err(err) = self.store.put_schedule(&schedule).await {
                tracing::error!(schedule_id = %schedule.id, ?err, "save schedule failed");
            } else {
                tracing::info!(
                    schedule_id = %schedule.id,
                    next_run_at = %schedule.next_run_at,
                    "schedule advanced"
                );
            }
        }

        Ok(report)
    }

    /// Runs one schedule and returns the article in its final state. An error
    /// here means the article row itself could not be saved.
    async fn run_schedule(
        &self,
        schedule: &PublicationSchedule,
        now: DateTime<Utc>,
    ) -> anyhow::Result<ScheduledArticle> {
        let mut article = ScheduledArticle::pending(schedule, now);
        self.store
            .put_article(&article)
            .await
            .context("save pending article")?;

        if let Err(err) = self.produce(schedule, &mut article).await {
            let message = format!("{err:#}");
            tracing::warn!(
                schedule_id = %schedule.id,
                article_id = %article.id,
                error = %message,
                "article failed"
            );
            article.fail(message);
            self.store
                .put_article(&article)
                .await
                .context("save failed article")?;
        }
        Ok(article)
    }

    async fn produce(
        &self,
        schedule: &PublicationSchedule,
        article: &mut ScheduledArticle,
    ) -> anyhow::Result<()> {
        let template = self
            .store
            .get_template(&schedule.template_id)
            .await
            .context("load template")?
            .ok_or_else(|| anyhow::anyhow!("template not found: {}", schedule.template_id))?;
        let creds = self
            .credentials
            .get(&schedule.site_id)
            .await
            .context("load credentials")?
            .ok_or_else(|| anyhow::anyhow!("no credentials for site {}", schedule.site_id))?;
        let persona = match &schedule.persona_id {
            Some(id) => Some(
                self.store
                    .get_persona(id)
                    .await
                    .context("load persona")?
                    .ok_or_else(|| anyhow::anyhow!("persona not found: {id}"))?,
            ),
            None => None,
        };
        if schedule.blog_analysis.is_none() {
            tracing::warn!(schedule_id = %schedule.id, "no blog analysis; generating without it");
        }

        self.transition(article, ArticleStatus::Generating).await?;
        let generated = generate_article(
            self.llm.as_ref(),
            &template,
            schedule.blog_analysis.as_ref(),
            persona.as_ref(),
        )
        .await
        .context("generate article")?;

        article.title = generated.title;
        article.content = generated.content;
        article.excerpt = generated.excerpt;
        article.tags = generated.tags;
        self.transition(article, ArticleStatus::Ready).await?;

        self.transition(article, ArticleStatus::Publishing).await?;
        let post = NewPost {
            title: article.title.clone(),
            content_html: to_html(&article.content),
            excerpt: article.excerpt.clone(),
            status: schedule.post_status,
        };
        let published = self
            .publisher
            .publish(&creds, &post)
            .await
            .context("publish to wordpress")?;

        article.wordpress_post_id = Some(published.id);
        article.post_url = Some(published.link);
        self.transition(article, ArticleStatus::Published).await?;
        tracing::info!(
            schedule_id = %schedule.id,
            article_id = %article.id,
            post_id = published.id,
            "article published"
        );
        Ok(())
    }

    async fn transition(
        &self,
        article: &mut ScheduledArticle,
        next: ArticleStatus,
    ) -> anyhow::Result<()> {
        article.advance(next)?;
        self.store
            .put_article(article)
            .await
            .with_context(|| format!("save article as {next:?}"))
    }

    /// Ticks every `period` until `shutdown` resolves.
    pub async fn run<F>(self: Arc<Self>, period: Duration, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        tracing::info!(period_secs = period.as_secs(), "auto-publisher started");
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    match self.tick().await {
                        Ok(report) if report.due > 0 => {
                            tracing::info!(
                                due = report.due,
                                published = report.published,
                                failed = report.failed,
                                "tick finished"
                            );
                        }
                        Ok(_) => {}
                        Err(err) => tracing::error!(?err, "tick failed"),
                    }
                }
            }
        }
        tracing::info!("auto-publisher stopped");
    }
}

/// `pubhub scheduler run`: one tick with `--once`, otherwise poll until Ctrl-C.
pub async fn run_command(args: SchedulerRunArgs) -> anyhow::Result<()> {
    if args.interval_secs == 0 {
        anyhow::bail!("--interval-secs must be > 0");
    }
    let llm = build_client(args.engine, &LlmConfig::from_env()?)
        .context("the auto-publisher needs a model engine")?;
    let publisher = Arc::new(WordPressClient::new(crate::site::WORDPRESS_TIMEOUT)?);
    let auto = Arc::new(AutoPublisher::new(
        Arc::new(LocalFsStore::new(&args.store.data_dir)),
        CredentialStore::new(&args.store.data_dir),
        llm,
        publisher,
    ));

    if args.once {
        let report = auto.tick().await?;
        println!(
            "due={} published={} failed={}",
            report.due, report.published, report.failed
        );
        return Ok(());
    }

    auto.run(Duration::from_secs(args.interval_secs), async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(?err, "listen for ctrl-c");
        }
    })
    .await;
    Ok(())
}
