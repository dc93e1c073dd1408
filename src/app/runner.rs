use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Context as _;

use crate::content::BookWriter;
use crate::model::{Book, BookStatus, GenerationStatus, WritingPersona};
use crate::store::BookStore;

pub const DEFAULT_SUB_CHAPTER_COUNT: usize = 3;
pub const DEFAULT_TARGET_WORDS: u32 = 1_200;

/// Writes a whole book chapter by chapter, saving after every step so an
/// interrupted run can be resumed.
pub struct BookRunner {
    store: Arc<dyn BookStore>,
    writer: BookWriter,
    sub_chapter_count: usize,
    target_words: u32,
    in_flight: Mutex<HashSet<String>>,
}

/// Exclusive right to generate one book in this process. Released on drop.
pub struct RunClaim {
    runner: Arc<BookRunner>,
    book_id: String,
}

impl RunClaim {
    pub fn book_id(&self) -> &str {
        &self.book_id
    }

    pub async fn run(self) {
        self.runner.run_book(&self.book_id).await;
    }
}

impl Drop for RunClaim {
    fn drop(&mut self) {
        self.runner.in_flight().remove(&self.book_id);
    }
}

impl BookRunner {
    pub fn new(store: Arc<dyn BookStore>, writer: BookWriter) -> Self {
        Self {
            store,
            writer,
            sub_chapter_count: DEFAULT_SUB_CHAPTER_COUNT,
            target_words: DEFAULT_TARGET_WORDS,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Returns `None` while another claim on `book_id` is alive.
    pub fn try_claim(self: &Arc<Self>, book_id: &str) -> Option<RunClaim> {
        if !self.in_flight().insert(book_id.to_owned()) {
            return None;
        }
        Some(RunClaim {
            runner: Arc::clone(self),
            book_id: book_id.to_owned(),
        })
    }

    fn in_flight(&self) -> MutexGuard<'_, HashSet<String>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_sub_chapter_count(mut self, count: usize) -> Self {
        self.sub_chapter_count = count.max(1);
        self
    }

    pub fn with_target_words(mut self, words: u32) -> Self {
        self.target_words = words.max(1);
        self
    }

    pub async fn run_book(&self, book_id: &str) {
        if let Err(err) = self.try_run_book(book_id, None).await {
            tracing::error!(book_id, ?err, "book generation failed");
        }
    }

    /// Generates every missing sub-chapter outline and body. With `only_chapter`
    /// set, just that chapter (0-based) is written and the book stays a draft
    /// unless it ends up fully written. On failure the book is reverted to
    /// draft with its partial work kept.
    pub async fn try_run_book(
        &self,
        book_id: &str,
        only_chapter: Option<usize>,
    ) -> anyhow::Result<Book> {
        let mut book = self
            .store
            .get_book(book_id)
            .await
            .context("load book")?
            .ok_or_else(|| anyhow::anyhow!("book not found: {book_id}"))?;
        if let Some(idx) = only_chapter
            && idx >= book.chapters.len()
        {
            anyhow::bail!(
                "chapter {} out of range (book has {})",
                idx + 1,
                book.chapters.len()
            );
        }
        if book.status == BookStatus::Completed && book.is_fully_written() {
            tracing::info!(book_id, "book already completed");
            return Ok(book);
        }

        let persona = self.load_persona(&book).await?;
        match self.write_book(&mut book, only_chapter, persona.as_ref()).await {
            Ok(()) => Ok(book),
            Err(err) => {
                if let Err(revert_err) = self.mark_draft(book_id).await {
                    tracing::error!(book_id, err = ?revert_err, "revert book to draft failed");
                }
                Err(err)
            }
        }
    }

    async fn write_book(
        &self,
        book: &mut Book,
        only_chapter: Option<usize>,
        persona: Option<&WritingPersona>,
    ) -> anyhow::Result<()> {
        book.status = BookStatus::Generating;
        self.save(book).await?;

        let indices = match only_chapter {
            Some(idx) => vec![idx],
            None => (0..book.chapters.len()).collect(),
        };
        for chapter_index in indices {
            self.write_chapter(book, chapter_index, persona)
                .await
                .with_context(|| format!("write chapter {}", chapter_index + 1))?;
        }

        book.status = if book.is_fully_written() {
            BookStatus::Completed
        } else {
            BookStatus::Draft
        };
        self.save(book).await?;
        tracing::info!(book_id = %book.id, status = ?book.status, "book generation finished");
        Ok(())
    }

    async fn write_chapter(
        &self,
        book: &mut Book,
        chapter_index: usize,
        persona: Option<&WritingPersona>,
    ) -> anyhow::Result<()> {
        if book.chapters[chapter_index].status == GenerationStatus::Completed {
            return Ok(());
        }
        book.chapters[chapter_index].set_status(GenerationStatus::Generating)?;
        self.save(book).await?;

        if book.chapters[chapter_index].sub_chapters.is_none() {
            let subs = self
                .writer
                .sub_chapters(book, chapter_index, self.sub_chapter_count)
                .await
                .context("generate sub-chapters")?;
            book.chapters[chapter_index].assign_sub_chapters(subs)?;
            self.save(book).await?;
        }

        let sub_count = book.chapters[chapter_index]
            .sub_chapters
            .as_ref()
            .map_or(0, Vec::len);
        for sub_index in 0..sub_count {
            if sub_at(book, chapter_index, sub_index)?.content.is_some() {
                continue;
            }
            let text = self
                .writer
                .sub_chapter_content(book, chapter_index, sub_index, persona, self.target_words)
                .await
                .with_context(|| format!("write section {}", sub_index + 1))?;

            let sub = sub_at_mut(book, chapter_index, sub_index)?;
            sub.content = Some(text);
            sub.status = GenerationStatus::Completed;
            self.save(book).await?;
        }

        book.chapters[chapter_index].set_status(GenerationStatus::Completed)?;
        self.save(book).await
    }

    async fn load_persona(&self, book: &Book) -> anyhow::Result<Option<WritingPersona>> {
        let Some(id) = &book.persona_id else {
            return Ok(None);
        };
        let persona = self.store.get_persona(id).await.context("load persona")?;
        if persona.is_none() {
            tracing::warn!(book_id = %book.id, persona_id = %id, "persona not found; writing without it");
        }
        Ok(persona)
    }

    async fn save(&self, book: &mut Book) -> anyhow::Result<()> {
        book.touch();
        self.store.put_book(book).await.context("save book")
    }

    async fn mark_draft(&self, book_id: &str) -> anyhow::Result<()> {
        let Some(mut book) = self.store.get_book(book_id).await? else {
            return Ok(());
        };
        book.status = BookStatus::Draft;
        for chapter in &mut book.chapters {
            if chapter.status == GenerationStatus::Generating {
                chapter.set_status(GenerationStatus::Pending)?;
            }
        }
        self.save(&mut book).await
    }
}

fn sub_at(
    book: &Book,
    chapter_index: usize,
    sub_index: usize,
) -> anyhow::Result<&crate::model::SubChapter> {
    book.chapters[chapter_index]
        .sub_chapters
        .as_ref()
        .and_then(|subs| subs.get(sub_index))
        .ok_or_else(|| anyhow::anyhow!("missing sub-chapter {sub_index}"))
}

fn sub_at_mut(
    book: &mut Book,
    chapter_index: usize,
    sub_index: usize,
) -> anyhow::Result<&mut crate::model::SubChapter> {
    book.chapters[chapter_index]
        .sub_chapters
        .as_mut()
        .and_then(|subs| subs.get_mut(sub_index))
        .ok_or_else(|| anyhow::anyhow!("missing sub-chapter {sub_index}"))
}
