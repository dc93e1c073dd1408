use std::sync::Arc;

use anyhow::Context as _;
use serde::Deserialize;

use crate::config::LlmConfig;
use crate::llm::{LlmClient, LlmEngine, Prompt, build_client, extract_json, strip_code_fences};
use crate::model::{Book, BookChapter, GenerationStatus, SubChapter, WritingPersona};
use crate::outline::{OutlineRequest, generate_outline, outline_noop};
use crate::persona::style_instructions;

/// Book generation backend: a model client, or deterministic offline text.
#[derive(Clone)]
pub enum BookWriter {
    Noop,
    Model(Arc<dyn LlmClient>),
}

impl BookWriter {
    pub fn from_engine(engine: LlmEngine, config: &LlmConfig) -> anyhow::Result<Self> {
        match engine {
            LlmEngine::Noop => Ok(BookWriter::Noop),
            other => Ok(BookWriter::Model(build_client(other, config)?)),
        }
    }

    pub async fn outline(&self, request: &OutlineRequest) -> anyhow::Result<Book> {
        match self {
            BookWriter::Noop => outline_noop(request),
            BookWriter::Model(llm) => generate_outline(llm.as_ref(), request).await,
        }
    }

    pub async fn sub_chapters(
        &self,
        book: &Book,
        chapter_index: usize,
        count: usize,
    ) -> anyhow::Result<Vec<SubChapter>> {
        match self {
            BookWriter::Noop => Ok(sub_chapters_noop(chapter_at(book, chapter_index)?, count)),
            BookWriter::Model(llm) => {
                generate_sub_chapters(llm.as_ref(), book, chapter_index, count).await
            }
        }
    }

    pub async fn sub_chapter_content(
        &self,
        book: &Book,
        chapter_index: usize,
        sub_index: usize,
        persona: Option<&WritingPersona>,
        target_words: u32,
    ) -> anyhow::Result<String> {
        match self {
            BookWriter::Noop => content_noop(book, chapter_index, sub_index),
            BookWriter::Model(llm) => {
                generate_sub_chapter_content(
                    llm.as_ref(),
                    book,
                    chapter_index,
                    sub_index,
                    persona,
                    target_words,
                )
                .await
            }
        }
    }

    pub async fn edit(&self, content: &str, instruction: &str) -> anyhow::Result<String> {
        match self {
            BookWriter::Noop => anyhow::bail!("editing needs a model engine, not `noop`"),
            BookWriter::Model(llm) => edit_content(llm.as_ref(), content, instruction).await,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SubChapterPlan {
    title: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum SubChapterPlans {
    Wrapped { sub_chapters: Vec<SubChapterPlan> },
    Bare(Vec<SubChapterPlan>),
}

impl SubChapterPlans {
    fn into_vec(self) -> Vec<SubChapterPlan> {
        match self {
            SubChapterPlans::Wrapped { sub_chapters } => sub_chapters,
            SubChapterPlans::Bare(plans) => plans,
        }
    }
}

fn book_context(book: &Book) -> String {
    let mut out = format!(
        "Book title: {}\nGenre: {}\nTone: {}\nSynopsis: {}\n",
        book.title, book.genre, book.tone, book.description
    );
    if let Some(sub_genre) = &book.sub_genre {
        out.push_str(&format!("Sub-genre: {sub_genre}\n"));
    }
    if let Some(perspective) = book.perspective {
        out.push_str(&format!("Narrative perspective: {}\n", perspective.describe()));
    }
    if let Some(heat) = book.heat_level {
        out.push_str(&format!("Content intensity: {}\n", heat.prompt_guidance()));
    }
    out.push_str("Chapters:\n");
    for (idx, chapter) in book.chapters.iter().enumerate() {
        out.push_str(&format!("{}. {} - {}\n", idx + 1, chapter.title, chapter.description));
    }
    out
}

fn chapter_at(book: &Book, chapter_index: usize) -> anyhow::Result<&BookChapter> {
    book.chapters.get(chapter_index).ok_or_else(|| {
        anyhow::anyhow!(
            "chapter index {chapter_index} out of range (book has {})",
            book.chapters.len()
        )
    })
}

pub async fn generate_sub_chapters(
    llm: &dyn LlmClient,
    book: &Book,
    chapter_index: usize,
    count: usize,
) -> anyhow::Result<Vec<SubChapter>> {
    if count == 0 {
        anyhow::bail!("sub-chapter count must be > 0");
    }
    let chapter = chapter_at(book, chapter_index)?;
    if chapter.sub_chapters.is_some() {
        anyhow::bail!("chapter {} already has sub-chapters", chapter.id);
    }

    let prompt = Prompt::new(format!(
        "{context}\n\
Break chapter {number} (\"{title}\": {description}) into exactly {count} consecutive scenes or sections.\n\
\n\
Output ONLY a JSON array (no commentary):\n\
[{{\"title\":\"...\",\"description\":\"1-2 sentences\"}}]\n",
        context = book_context(book),
        number = chapter_index + 1,
        title = chapter.title,
        description = chapter.description,
    ))
    .with_system("You are a story architect who plans chapters scene by scene.")
    .with_temperature(0.7);

    tracing::info!(chapter = %chapter.id, count, "generate sub-chapters");
    let raw = llm.complete(&prompt).await.context("call llm for sub-chapters")?;
    let plans = extract_json::<SubChapterPlans>(&raw)
        .context("parse sub-chapter json")?
        .into_vec();

    let sub_chapters = plans
        .into_iter()
        .filter(|p| !p.title.trim().is_empty())
        .enumerate()
        .map(|(idx, p)| SubChapter {
            id: format!("{}-{:02}", chapter.id, idx + 1),
            title: p.title.trim().to_owned(),
            description: p.description.trim().to_owned(),
            content: None,
            status: GenerationStatus::Pending,
        })
        .collect::<Vec<_>>();
    if sub_chapters.is_empty() {
        anyhow::bail!("llm returned no sub-chapters for {}", chapter.id);
    }
    Ok(sub_chapters)
}

pub fn sub_chapters_noop(chapter: &BookChapter, count: usize) -> Vec<SubChapter> {
    (1..=count.max(1))
        .map(|n| SubChapter {
            id: format!("{}-{:02}", chapter.id, n),
            title: format!("{} ({n})", chapter.title),
            description: chapter.description.clone(),
            content: None,
            status: GenerationStatus::Pending,
        })
        .collect()
}

pub async fn generate_sub_chapter_content(
    llm: &dyn LlmClient,
    book: &Book,
    chapter_index: usize,
    sub_index: usize,
    persona: Option<&WritingPersona>,
    target_words: u32,
) -> anyhow::Result<String> {
    let chapter = chapter_at(book, chapter_index)?;
    let subs = chapter
        .sub_chapters
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("chapter {} has no sub-chapters yet", chapter.id))?;
    let sub = subs.get(sub_index).ok_or_else(|| {
        anyhow::anyhow!(
            "sub-chapter index {sub_index} out of range for {} ({} sub-chapters)",
            chapter.id,
            subs.len()
        )
    })?;

    let previous = sub_index
        .checked_sub(1)
        .and_then(|i| subs.get(i))
        .map(|prev| format!("Previous section: {} - {}\n", prev.title, prev.description))
        .unwrap_or_default();
    let style = persona.map(style_instructions).unwrap_or_default();

    let prompt = Prompt::new(format!(
        "{context}\n\
Current chapter: {chapter_title} - {chapter_description}\n\
{previous}\
Write the section \"{title}\": {description}\n\
\n\
{style}\
Rules:\n\
- About {target_words} words of finished prose in Markdown paragraphs.\n\
- Do not repeat the section title as a heading.\n\
- Output ONLY the prose.\n",
        context = book_context(book),
        chapter_title = chapter.title,
        chapter_description = chapter.description,
        title = sub.title,
        description = sub.description,
    ))
    .with_system("You are a skilled novelist.")
    .with_temperature(0.85);

    tracing::info!(sub_chapter = %sub.id, target_words, "generate sub-chapter content");
    let raw = llm.complete(&prompt).await.context("call llm for content")?;
    let text = clean_prose(&raw, &sub.title);
    if text.is_empty() {
        anyhow::bail!("llm returned empty content for {}", sub.id);
    }
    Ok(text)
}

pub fn content_noop(book: &Book, chapter_index: usize, sub_index: usize) -> anyhow::Result<String> {
    let chapter = chapter_at(book, chapter_index)?;
    let sub = chapter
        .sub_chapters
        .as_ref()
        .and_then(|subs| subs.get(sub_index))
        .ok_or_else(|| anyhow::anyhow!("sub-chapter {sub_index} not found in {}", chapter.id))?;
    Ok(format!(
        "{}\n\nThis section of *{}* is a placeholder written without a model.",
        if sub.description.is_empty() { &sub.title } else { &sub.description },
        book.title
    ))
}

pub async fn edit_content(
    llm: &dyn LlmClient,
    content: &str,
    instruction: &str,
) -> anyhow::Result<String> {
    if content.trim().is_empty() {
        anyhow::bail!("nothing to edit: content is empty");
    }
    if instruction.trim().is_empty() {
        anyhow::bail!("edit instruction is empty");
    }

    let prompt = Prompt::new(format!(
        "Revise the text below according to the instruction.\n\
\n\
Instruction: {instruction}\n\
\n\
BEGIN_TEXT\n\
{content}\n\
END_TEXT\n\
\n\
Output ONLY the revised text, keeping Markdown formatting.\n",
        instruction = instruction.trim(),
        content = content.trim_end(),
    ))
    .with_system("You are a careful line editor.")
    .with_temperature(0.4);

    let raw = llm.complete(&prompt).await.context("call llm for edit")?;
    let edited = strip_code_fences(&raw);
    if edited.is_empty() {
        anyhow::bail!("llm returned empty edit");
    }
    Ok(edited)
}

/// Unwraps fences and drops a leading heading that just repeats the title.
fn clean_prose(raw: &str, title: &str) -> String {
    let text = strip_code_fences(raw);
    let mut lines = text.lines();
    let Some(first) = lines.next() else {
        return String::new();
    };
    let heading = first.trim().trim_start_matches('#').trim();
    if first.trim_start().starts_with('#') && heading.eq_ignore_ascii_case(title.trim()) {
        return lines.collect::<Vec<_>>().join("\n").trim().to_owned();
    }
    text
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::model::BookStatus;

    struct Recording {
        reply: &'static str,
        prompts: Mutex<Vec<String>>,
    }

    impl Recording {
        fn new(reply: &'static str) -> Self {
            Self {
                reply,
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmClient for Recording {
        async fn complete(&self, prompt: &Prompt) -> anyhow::Result<String> {
            self.prompts.lock().unwrap().push(prompt.user.clone());
            Ok(self.reply.to_owned())
        }
    }

    fn book() -> Book {
        Book {
            id: "b1".to_owned(),
            title: "Tides".to_owned(),
            description: "A coastal mystery.".to_owned(),
            genre: "Mystery".to_owned(),
            sub_genre: None,
            tone: "moody".to_owned(),
            heat_level: None,
            perspective: None,
            persona_id: None,
            status: BookStatus::Draft,
            chapters: vec![BookChapter {
                id: "ch01".to_owned(),
                title: "Low Water".to_owned(),
                description: "A body on the sand.".to_owned(),
                status: GenerationStatus::Pending,
                sub_chapters: None,
            }],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn sub_chapters_accept_wrapped_json() -> anyhow::Result<()> {
        let llm = Recording::new(
            "{\"sub_chapters\":[{\"title\":\"Dawn\",\"description\":\"Found.\"},{\"title\":\"Noon\"}]}",
        );
        let subs = generate_sub_chapters(&llm, &book(), 0, 2).await?;
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].id, "ch01-01");
        assert_eq!(subs[1].title, "Noon");
        assert!(llm.prompts.lock().unwrap()[0].contains("exactly 2"));
        Ok(())
    }

    #[tokio::test]
    async fn sub_chapters_are_not_regenerated() {
        let mut book = book();
        let planned = sub_chapters_noop(&book.chapters[0], 1);
        book.chapters[0].assign_sub_chapters(planned).unwrap();
        let llm = Recording::new("[]");
        let err = generate_sub_chapters(&llm, &book, 0, 2).await.unwrap_err();
        assert!(err.to_string().contains("already has sub-chapters"));
        assert!(llm.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn content_strips_repeated_heading() -> anyhow::Result<()> {
        let mut book = book();
        book.chapters[0]
            .assign_sub_chapters(vec![SubChapter {
                id: "ch01-01".to_owned(),
                title: "Dawn".to_owned(),
                description: "Found.".to_owned(),
                content: None,
                status: GenerationStatus::Pending,
            }])
            .unwrap();
        let llm = Recording::new("## Dawn\n\nThe gulls screamed.");
        let text = generate_sub_chapter_content(&llm, &book, 0, 0, None, 500).await?;
        assert_eq!(text, "The gulls screamed.");
        Ok(())
    }

    #[tokio::test]
    async fn content_requires_sub_chapters() {
        let llm = Recording::new("text");
        assert!(
            generate_sub_chapter_content(&llm, &book(), 0, 0, None, 500)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn edit_content_unwraps_fenced_reply() -> anyhow::Result<()> {
        let llm = Recording::new("```markdown\nShorter text.\n```");
        let edited = edit_content(&llm, "Long text that rambles.", "tighten").await?;
        assert_eq!(edited, "Shorter text.");
        Ok(())
    }
}
