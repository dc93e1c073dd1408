use std::sync::Arc;

use anyhow::Context as _;

use crate::app::runner::BookRunner;
use crate::cli::{BookEditArgs, BookOutlineArgs, BookWriteArgs};
use crate::config::LlmConfig;
use crate::content::BookWriter;
use crate::model::GenerationStatus;
use crate::outline::OutlineRequest;
use crate::store::{BookStore, LocalFsStore, PersonaStore};

/// Creates a draft book and prints its id.
pub async fn outline(args: BookOutlineArgs) -> anyhow::Result<()> {
    let store = LocalFsStore::new(&args.store.data_dir);
    let writer = BookWriter::from_engine(args.engine, &LlmConfig::from_env()?)?;

    let persona = match &args.persona_id {
        Some(id) => Some(
            store
                .get_persona(id)
                .await
                .context("load persona")?
                .ok_or_else(|| anyhow::anyhow!("persona not found: {id}"))?,
        ),
        None => None,
    };

    let request = OutlineRequest {
        title: args.title.filter(|t| !t.trim().is_empty()),
        description: args.description,
        genre: args.genre,
        sub_genre: args.sub_genre,
        tone: args.tone,
        heat_level: args.heat_level,
        perspective: args.perspective,
        chapter_count: args.chapters,
        persona,
    };
    let book = writer.outline(&request).await.context("generate outline")?;
    store.put_book(&book).await.context("save book")?;

    tracing::info!(book_id = %book.id, title = %book.title, chapters = book.chapters.len(), "outline saved");
    println!("{}", book.id);
    Ok(())
}

pub async fn write(args: BookWriteArgs) -> anyhow::Result<()> {
    let store = Arc::new(LocalFsStore::new(&args.store.data_dir));
    let writer = BookWriter::from_engine(args.engine, &LlmConfig::from_env()?)?;
    let only_chapter = match args.chapter {
        Some(0) => anyhow::bail!("--chapter is 1-based"),
        Some(n) => Some(n - 1),
        None => None,
    };

    let runner = BookRunner::new(store, writer)
        .with_sub_chapter_count(args.sub_chapters)
        .with_target_words(args.words);
    let book = runner.try_run_book(&args.book_id, only_chapter).await?;
    println!("{} {:?}", book.id, book.status);
    Ok(())
}

/// Rewrites one sub-chapter in place.
pub async fn edit(args: BookEditArgs) -> anyhow::Result<()> {
    let store = LocalFsStore::new(&args.store.data_dir);
    let writer = BookWriter::from_engine(args.engine, &LlmConfig::from_env()?)?;
    let mut book = store
        .get_book(&args.book_id)
        .await
        .context("load book")?
        .ok_or_else(|| anyhow::anyhow!("book not found: {}", args.book_id))?;

    let chapter = args
        .chapter
        .checked_sub(1)
        .and_then(|idx| book.chapters.get_mut(idx))
        .ok_or_else(|| anyhow::anyhow!("chapter {} not found", args.chapter))?;
    let sub = args
        .section
        .checked_sub(1)
        .and_then(|idx| chapter.sub_chapters.as_mut()?.get_mut(idx))
        .ok_or_else(|| anyhow::anyhow!("section {} not found", args.section))?;
    let current = sub
        .content
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("section {} has no content yet", sub.id))?;

    let edited = writer
        .edit(current, &args.instruction)
        .await
        .context("edit section")?;
    sub.content = Some(edited);
    sub.status = GenerationStatus::Completed;
    book.touch();
    store.put_book(&book).await.context("save book")?;

    tracing::info!(book_id = %book.id, chapter = args.chapter, section = args.section, "section edited");
    Ok(())
}
