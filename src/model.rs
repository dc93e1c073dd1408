use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BookStatus {
    #[default]
    Draft,
    Generating,
    Completed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    #[default]
    Pending,
    Generating,
    Completed,
}

impl GenerationStatus {
    pub fn can_transition_to(self, next: GenerationStatus) -> bool {
        use GenerationStatus::*;
        matches!(
            (self, next),
            (Pending, Generating) | (Generating, Completed) | (Generating, Pending)
        )
    }
}

/// Romance-genre content-intensity tier, mildest first.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum HeatLevel {
    Clean,
    Mild,
    Moderate,
    Steamy,
    Explicit,
}

impl HeatLevel {
    pub fn prompt_guidance(self) -> &'static str {
        match self {
            HeatLevel::Clean => {
                "Keep romance completely clean: no sexual content, affection limited to hand-holding and chaste kisses."
            }
            HeatLevel::Mild => {
                "Keep romance mild: kissing and tension are fine, intimate scenes fade to black before anything explicit."
            }
            HeatLevel::Moderate => {
                "Romance may be sensual: describe attraction and intimacy with emotion, but avoid graphic detail."
            }
            HeatLevel::Steamy => {
                "Romance may be steamy: intimate scenes can be on the page with tasteful, sensual description."
            }
            HeatLevel::Explicit => {
                "Romance may be explicit between consenting adults, written with care for character and emotion."
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Perspective {
    FirstPerson,
    SecondPerson,
    ThirdPersonLimited,
    ThirdPersonOmniscient,
}

impl Perspective {
    pub fn describe(self) -> &'static str {
        match self {
            Perspective::FirstPerson => "first person (\"I\")",
            Perspective::SecondPerson => "second person (\"you\")",
            Perspective::ThirdPersonLimited => "third person limited",
            Perspective::ThirdPersonOmniscient => "third person omniscient",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Book {
    pub id: String,
    pub title: String,
    pub description: String,
    pub genre: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_genre: Option<String>,
    pub tone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heat_level: Option<HeatLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perspective: Option<Perspective>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona_id: Option<String>,
    pub status: BookStatus,
    pub chapters: Vec<BookChapter>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn is_fully_written(&self) -> bool {
        !self.chapters.is_empty()
            && self.chapters.iter().all(|chapter| {
                chapter.sub_chapters.as_ref().is_some_and(|subs| {
                    !subs.is_empty() && subs.iter().all(|sub| sub.content.is_some())
                })
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookChapter {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: GenerationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_chapters: Option<Vec<SubChapter>>,
}

impl BookChapter {
    /// Sub-chapters are generated once per chapter; a second assignment is rejected.
    pub fn assign_sub_chapters(&mut self, sub_chapters: Vec<SubChapter>) -> anyhow::Result<()> {
        if self.sub_chapters.is_some() {
            anyhow::bail!("chapter {} already has sub-chapters", self.id);
        }
        if sub_chapters.is_empty() {
            anyhow::bail!("chapter {} needs at least one sub-chapter", self.id);
        }
        self.sub_chapters = Some(sub_chapters);
        Ok(())
    }

    pub fn set_status(&mut self, next: GenerationStatus) -> anyhow::Result<()> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            anyhow::bail!(
                "invalid chapter status transition for {}: {:?} -> {:?}",
                self.id,
                self.status,
                next
            );
        }
        self.status = next;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubChapter {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub status: GenerationStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WritingPersona {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<PersonaAnalysis>,
    #[serde(default)]
    pub preferences: PersonaPreferences,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PersonaAnalysis {
    pub tone: String,
    pub vocabulary_level: String,
    pub sentence_structure: String,
    pub pacing: String,
    pub voice: String,
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default)]
    pub signature_phrases: Vec<String>,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PersonaPreferences {
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub avoided_topics: Vec<String>,
    #[serde(default)]
    pub instructions: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WordPressSite {
    pub id: String,
    pub name: String,
    pub url: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WordPressCredentials {
    pub url: String,
    pub username: String,
    pub application_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArticleTemplate {
    pub id: String,
    pub site_id: String,
    pub name: String,
    pub topic_prompt: String,
    pub word_count: u32,
    pub tone: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleFrequency {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    #[default]
    Draft,
    Publish,
}

impl PostStatus {
    pub fn as_wordpress(self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Publish => "publish",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BlogAnalysis {
    pub niche: String,
    pub audience: String,
    pub tone: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub recent_titles: Vec<String>,
    #[serde(default)]
    pub style_notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublicationSchedule {
    pub id: String,
    pub site_id: String,
    pub template_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona_id: Option<String>,
    pub frequency: ScheduleFrequency,
    pub is_active: bool,
    pub next_run_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blog_analysis: Option<BlogAnalysis>,
    #[serde(default)]
    pub post_status: PostStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ArticleStatus {
    Pending,
    Generating,
    Ready,
    Publishing,
    Published,
    Failed,
}

impl ArticleStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ArticleStatus::Published | ArticleStatus::Failed)
    }

    pub fn can_transition_to(self, next: ArticleStatus) -> bool {
        use ArticleStatus::*;
        if next == Failed {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Pending, Generating) | (Generating, Ready) | (Ready, Publishing) | (Publishing, Published)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledArticle {
    pub id: String,
    pub schedule_id: String,
    pub site_id: String,
    pub status: ArticleStatus,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wordpress_post_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduledArticle {
    pub fn pending(schedule: &PublicationSchedule, now: DateTime<Utc>) -> Self {
        Self {
            id: new_id(),
            schedule_id: schedule.id.clone(),
            site_id: schedule.site_id.clone(),
            status: ArticleStatus::Pending,
            title: String::new(),
            content: String::new(),
            excerpt: String::new(),
            tags: Vec::new(),
            wordpress_post_id: None,
            post_url: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn advance(&mut self, next: ArticleStatus) -> anyhow::Result<()> {
        if !self.status.can_transition_to(next) {
            anyhow::bail!(
                "invalid article status transition for {}: {:?} -> {:?}",
                self.id,
                self.status,
                next
            );
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn fail(&mut self, error: String) {
        if self.status.is_terminal() {
            return;
        }
        self.status = ArticleStatus::Failed;
        self.error = Some(error);
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter() -> BookChapter {
        BookChapter {
            id: "ch01".to_owned(),
            title: "Arrival".to_owned(),
            description: "The heroine arrives.".to_owned(),
            status: GenerationStatus::Pending,
            sub_chapters: None,
        }
    }

    fn sub(id: &str) -> SubChapter {
        SubChapter {
            id: id.to_owned(),
            title: id.to_owned(),
            description: String::new(),
            content: None,
            status: GenerationStatus::Pending,
        }
    }

    #[test]
    fn sub_chapters_are_assigned_only_once() {
        let mut chapter = chapter();
        chapter.assign_sub_chapters(vec![sub("ch01-01")]).unwrap();

        let err = chapter
            .assign_sub_chapters(vec![sub("ch01-02")])
            .unwrap_err()
            .to_string();
        assert!(err.contains("already has sub-chapters"));
        assert_eq!(chapter.sub_chapters.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn empty_sub_chapter_list_is_rejected() {
        let mut chapter = chapter();
        assert!(chapter.assign_sub_chapters(Vec::new()).is_err());
        assert!(chapter.sub_chapters.is_none());
    }

    #[test]
    fn chapter_status_follows_pending_generating_completed() {
        let mut chapter = chapter();
        assert!(chapter.set_status(GenerationStatus::Completed).is_err());
        chapter.set_status(GenerationStatus::Generating).unwrap();
        chapter.set_status(GenerationStatus::Completed).unwrap();
        assert!(chapter.set_status(GenerationStatus::Generating).is_err());
    }

    #[test]
    fn article_status_walks_the_publishing_pipeline() {
        use ArticleStatus::*;
        let path = [Pending, Generating, Ready, Publishing, Published];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{pair:?}");
        }
        assert!(!Pending.can_transition_to(Ready));
        assert!(!Ready.can_transition_to(Published));
        assert!(!Published.can_transition_to(Pending));
    }

    #[test]
    fn only_non_terminal_articles_can_fail() {
        use ArticleStatus::*;
        for status in [Pending, Generating, Ready, Publishing] {
            assert!(status.can_transition_to(Failed));
        }
        assert!(!Published.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Failed));
    }

    #[test]
    fn heat_levels_are_ordered_from_clean_to_explicit() {
        assert!(HeatLevel::Clean < HeatLevel::Mild);
        assert!(HeatLevel::Steamy < HeatLevel::Explicit);
    }
}
