use anyhow::Context as _;
use chrono::Utc;
use serde::Deserialize;

use crate::llm::{LlmClient, Prompt, extract_json};
use crate::model::{
    Book, BookChapter, BookStatus, GenerationStatus, HeatLevel, Perspective, WritingPersona,
    new_id,
};
use crate::persona::style_instructions;

pub const MAX_CHAPTERS: usize = 99;

#[derive(Debug, Clone)]
pub struct OutlineRequest {
    pub title: Option<String>,
    pub description: String,
    pub genre: String,
    pub sub_genre: Option<String>,
    pub tone: String,
    pub heat_level: Option<HeatLevel>,
    pub perspective: Option<Perspective>,
    pub chapter_count: usize,
    pub persona: Option<WritingPersona>,
}

#[derive(Debug, Clone, Deserialize)]
struct OutlinePlan {
    title: String,
    #[serde(default)]
    description: String,
    chapters: Vec<OutlinePlanChapter>,
}

#[derive(Debug, Clone, Deserialize)]
struct OutlinePlanChapter {
    title: String,
    #[serde(default)]
    description: String,
}

pub async fn generate_outline(
    llm: &dyn LlmClient,
    request: &OutlineRequest,
) -> anyhow::Result<Book> {
    validate_request(request)?;

    let mut brief = format!(
        "Genre: {genre}\nTone: {tone}\nPremise: {premise}\nChapters: exactly {count}\n",
        genre = request.genre,
        tone = request.tone,
        premise = request.description.trim(),
        count = request.chapter_count,
    );
    if let Some(sub_genre) = &request.sub_genre {
        brief.push_str(&format!("Sub-genre: {sub_genre}\n"));
    }
    if let Some(title) = &request.title {
        brief.push_str(&format!("Working title: {title}\n"));
    }
    if let Some(perspective) = request.perspective {
        brief.push_str(&format!("Narrative perspective: {}\n", perspective.describe()));
    }
    if let Some(heat) = request.heat_level {
        brief.push_str(&format!("Content intensity: {}\n", heat.prompt_guidance()));
    }
    if let Some(persona) = &request.persona {
        brief.push_str(&style_instructions(persona));
    }

    let prompt = Prompt::new(format!(
        "Plan a book outline.\n\
\n\
BEGIN_BRIEF\n\
{brief}\
END_BRIEF\n\
\n\
Hard rules:\n\
- Produce exactly the requested number of chapters, in reading order.\n\
- Each chapter needs a short title and a 1-3 sentence description of what happens.\n\
\n\
Output ONLY a single JSON object (no markdown fences, no commentary):\n\
{{\"title\":\"...\",\"description\":\"...\",\"chapters\":[{{\"title\":\"...\",\"description\":\"...\"}}]}}\n"
    ))
    .with_system("You are an experienced book editor and story architect.")
    .with_temperature(0.8);

    tracing::info!(
        genre = %request.genre,
        chapters = request.chapter_count,
        "generate outline"
    );
    let raw = llm.complete(&prompt).await.context("call llm for outline")?;
    let plan: OutlinePlan = extract_json(&raw).context("parse outline json")?;
    if plan.chapters.len() != request.chapter_count {
        tracing::warn!(
            requested = request.chapter_count,
            returned = plan.chapters.len(),
            "outline chapter count differs from request"
        );
    }
    book_from_plan(request, plan)
}

/// Deterministic outline for dry runs.
pub fn outline_noop(request: &OutlineRequest) -> anyhow::Result<Book> {
    validate_request(request)?;
    let title = request
        .title
        .clone()
        .unwrap_or_else(|| format!("Untitled {} Book", request.genre));
    let plan = OutlinePlan {
        title,
        description: request.description.clone(),
        chapters: (1..=request.chapter_count)
            .map(|n| OutlinePlanChapter {
                title: format!("Chapter {n}"),
                description: format!("Part {n} of the story: {}", request.description.trim()),
            })
            .collect(),
    };
    book_from_plan(request, plan)
}

fn validate_request(request: &OutlineRequest) -> anyhow::Result<()> {
    if request.description.trim().is_empty() {
        anyhow::bail!("book description is empty");
    }
    if request.genre.trim().is_empty() {
        anyhow::bail!("book genre is empty");
    }
    if request.chapter_count == 0 || request.chapter_count > MAX_CHAPTERS {
        anyhow::bail!(
            "chapter count must be between 1 and {MAX_CHAPTERS} (got {})",
            request.chapter_count
        );
    }
    Ok(())
}

fn book_from_plan(request: &OutlineRequest, plan: OutlinePlan) -> anyhow::Result<Book> {
    let title = request
        .title
        .clone()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| plan.title.trim().to_owned());
    if title.is_empty() {
        anyhow::bail!("outline title is empty");
    }

    let chapters = plan
        .chapters
        .into_iter()
        .filter(|ch| {
            let keep = !ch.title.trim().is_empty();
            if !keep {
                tracing::info!("outline chapter without title; dropping");
            }
            keep
        })
        .take(MAX_CHAPTERS)
        .enumerate()
        .map(|(idx, ch)| BookChapter {
            id: format!("ch{:02}", idx + 1),
            title: ch.title.trim().to_owned(),
            description: ch.description.trim().to_owned(),
            status: GenerationStatus::Pending,
            sub_chapters: None,
        })
        .collect::<Vec<_>>();
    if chapters.is_empty() {
        anyhow::bail!("outline has no chapters");
    }

    let description = if plan.description.trim().is_empty() {
        request.description.trim().to_owned()
    } else {
        plan.description.trim().to_owned()
    };

    let now = Utc::now();
    Ok(Book {
        id: new_id(),
        title,
        description,
        genre: request.genre.clone(),
        sub_genre: request.sub_genre.clone(),
        tone: request.tone.clone(),
        heat_level: request.heat_level,
        perspective: request.perspective,
        persona_id: request.persona.as_ref().map(|p| p.id.clone()),
        status: BookStatus::Draft,
        chapters,
        created_at: now,
        updated_at: now,
    })
}
