use std::path::{Path, PathBuf};

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;

use crate::model::{
    ArticleTemplate, Book, PublicationSchedule, ScheduledArticle, WordPressSite, WritingPersona,
};

/// Personas are shared by book generation and the auto-publisher.
#[async_trait]
pub trait PersonaStore: Send + Sync {
    async fn get_persona(&self, id: &str) -> anyhow::Result<Option<WritingPersona>>;
    async fn put_persona(&self, persona: &WritingPersona) -> anyhow::Result<()>;
}

#[async_trait]
pub trait BookStore: PersonaStore {
    async fn get_book(&self, id: &str) -> anyhow::Result<Option<Book>>;
    async fn put_book(&self, book: &Book) -> anyhow::Result<()>;
    async fn list_books(&self) -> anyhow::Result<Vec<Book>>;
}

#[async_trait]
pub trait PublishingStore: PersonaStore {
    async fn get_site(&self, id: &str) -> anyhow::Result<Option<WordPressSite>>;
    async fn put_site(&self, site: &WordPressSite) -> anyhow::Result<()>;
    async fn delete_site(&self, id: &str) -> anyhow::Result<bool>;

    async fn get_template(&self, id: &str) -> anyhow::Result<Option<ArticleTemplate>>;
    async fn put_template(&self, template: &ArticleTemplate) -> anyhow::Result<()>;

    async fn get_schedule(&self, id: &str) -> anyhow::Result<Option<PublicationSchedule>>;
    async fn put_schedule(&self, schedule: &PublicationSchedule) -> anyhow::Result<()>;
    async fn list_schedules(&self) -> anyhow::Result<Vec<PublicationSchedule>>;

    async fn put_article(&self, article: &ScheduledArticle) -> anyhow::Result<()>;
    async fn list_articles(&self, schedule_id: &str) -> anyhow::Result<Vec<ScheduledArticle>>;

    /// Active schedules whose `next_run_at` is not after `now`, oldest first.
    async fn due_schedules(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<PublicationSchedule>> {
        let mut due = self
            .list_schedules()
            .await?
            .into_iter()
            .filter(|s| crate::schedule::is_due(s, now))
            .collect::<Vec<_>>();
        due.sort_by_key(|s| s.next_run_at);
        Ok(due)
    }
}

/// One JSON file per record under `<base_dir>/<collection>/<id>.json`.
#[derive(Debug, Clone)]
pub struct LocalFsStore {
    base_dir: PathBuf,
}

impl LocalFsStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn record_path(&self, collection: &str, id: &str) -> anyhow::Result<PathBuf> {
        validate_record_id(id)?;
        Ok(self.base_dir.join(collection).join(format!("{id}.json")))
    }

    async fn get<T: DeserializeOwned>(&self, collection: &str, id: &str) -> anyhow::Result<Option<T>> {
        let path = self.record_path(collection, id)?;
        read_json(&path)
            .await
            .with_context(|| format!("read: {}", path.display()))
    }

    async fn put<T: Serialize + Sync>(&self, collection: &str, id: &str, value: &T) -> anyhow::Result<()> {
        let path = self.record_path(collection, id)?;
        write_json_atomic(&path, value)
            .await
            .with_context(|| format!("write {collection} record {id}"))
    }

    async fn delete(&self, collection: &str, id: &str) -> anyhow::Result<bool> {
        let path = self.record_path(collection, id)?;
        remove_if_exists(&path).await
    }

    async fn list<T: DeserializeOwned>(&self, collection: &str) -> anyhow::Result<Vec<T>> {
        let dir = self.base_dir.join(collection);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("read dir: {}", dir.display()));
            }
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .with_context(|| format!("list dir: {}", dir.display()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut records = Vec::with_capacity(paths.len());
        for path in paths {
            if let Some(record) = read_json(&path)
                .await
                .with_context(|| format!("read: {}", path.display()))?
            {
                records.push(record);
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl BookStore for LocalFsStore {
    async fn get_book(&self, id: &str) -> anyhow::Result<Option<Book>> {
        self.get("books", id).await
    }

    async fn put_book(&self, book: &Book) -> anyhow::Result<()> {
        self.put("books", &book.id, book).await
    }

    async fn list_books(&self) -> anyhow::Result<Vec<Book>> {
        let mut books: Vec<Book> = self.list("books").await?;
        books.sort_by_key(|b| b.created_at);
        Ok(books)
    }
}

#[async_trait]
impl PersonaStore for LocalFsStore {
    async fn get_persona(&self, id: &str) -> anyhow::Result<Option<WritingPersona>> {
        self.get("personas", id).await
    }

    async fn put_persona(&self, persona: &WritingPersona) -> anyhow::Result<()> {
        self.put("personas", &persona.id, persona).await
    }
}

#[async_trait]
impl PublishingStore for LocalFsStore {
    async fn get_site(&self, id: &str) -> anyhow::Result<Option<WordPressSite>> {
        self.get("sites", id).await
    }

    async fn put_site(&self, site: &WordPressSite) -> anyhow::Result<()> {
        self.put("sites", &site.id, site).await
    }

    async fn delete_site(&self, id: &str) -> anyhow::Result<bool> {
        self.delete("sites", id).await
    }

    async fn get_template(&self, id: &str) -> anyhow::Result<Option<ArticleTemplate>> {
        self.get("templates", id).await
    }

    async fn put_template(&self, template: &ArticleTemplate) -> anyhow::Result<()> {
        self.put("templates", &template.id, template).await
    }

    async fn get_schedule(&self, id: &str) -> anyhow::Result<Option<PublicationSchedule>> {
        self.get("schedules", id).await
    }

    async fn put_schedule(&self, schedule: &PublicationSchedule) -> anyhow::Result<()> {
        self.put("schedules", &schedule.id, schedule).await
    }

    async fn list_schedules(&self) -> anyhow::Result<Vec<PublicationSchedule>> {
        self.list("schedules").await
    }

    async fn put_article(&self, article: &ScheduledArticle) -> anyhow::Result<()> {
        self.put("articles", &article.id, article).await
    }

    async fn list_articles(&self, schedule_id: &str) -> anyhow::Result<Vec<ScheduledArticle>> {
        let mut articles = self
            .list::<ScheduledArticle>("articles")
            .await?
            .into_iter()
            .filter(|a| a.schedule_id == schedule_id)
            .collect::<Vec<_>>();
        articles.sort_by_key(|a| a.created_at);
        Ok(articles)
    }
}

/// Record ids become file names, so only a conservative alphabet is allowed.
pub fn validate_record_id(id: &str) -> anyhow::Result<()> {
    if id.is_empty() || id.len() > 128 {
        anyhow::bail!("invalid record id (length): {id:?}");
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        anyhow::bail!("invalid record id: {id:?}");
    }
    Ok(())
}

pub(crate) async fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let value = serde_json::from_slice(&bytes).context("parse json")?;
    Ok(Some(value))
}

pub(crate) async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("create parent dir: {}", parent.display()))?;

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    let data = serde_json::to_vec_pretty(value).context("serialize json")?;
    fs::write(&tmp_path, &data)
        .await
        .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}

pub(crate) async fn remove_if_exists(path: &Path) -> anyhow::Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err).with_context(|| format!("remove: {}", path.display())),
    }
}
