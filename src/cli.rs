use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::llm::LlmEngine;
use crate::model::{HeatLevel, Perspective, PostStatus, ScheduleFrequency};

pub const DEFAULT_DATA_DIR: &str = "pubhub-data";

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Book {
        #[command(subcommand)]
        command: BookCommand,
    },
    Export(ExportArgs),
    Persona {
        #[command(subcommand)]
        command: PersonaCommand,
    },
    Site {
        #[command(subcommand)]
        command: SiteCommand,
    },
    Template {
        #[command(subcommand)]
        command: TemplateCommand,
    },
    Schedule {
        #[command(subcommand)]
        command: ScheduleCommand,
    },
    Scheduler {
        #[command(subcommand)]
        command: SchedulerCommand,
    },
}

/// Shared by every command that reads or writes the local store.
#[derive(Debug, Clone, Args)]
pub struct StoreArgs {
    /// Data directory holding books, sites, schedules and credentials.
    #[arg(long, default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,
}

#[derive(Debug, Subcommand)]
pub enum BookCommand {
    Outline(BookOutlineArgs),
    Write(BookWriteArgs),
    Edit(BookEditArgs),
}

#[derive(Debug, Args)]
pub struct BookOutlineArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Premise of the book.
    #[arg(long)]
    pub description: String,

    #[arg(long)]
    pub genre: String,

    #[arg(long)]
    pub sub_genre: Option<String>,

    /// Working title (default: chosen by the model).
    #[arg(long)]
    pub title: Option<String>,

    #[arg(long, default_value = "engaging")]
    pub tone: String,

    #[arg(long, value_enum)]
    pub heat_level: Option<HeatLevel>,

    #[arg(long, value_enum)]
    pub perspective: Option<Perspective>,

    #[arg(long, default_value_t = 10)]
    pub chapters: usize,

    /// Persona to write in (id from `persona analyze`).
    #[arg(long)]
    pub persona_id: Option<String>,

    #[arg(long, value_enum, default_value_t = LlmEngine::Openrouter)]
    pub engine: LlmEngine,
}

#[derive(Debug, Args)]
pub struct BookWriteArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long)]
    pub book_id: String,

    /// Only write this chapter (1-based).
    #[arg(long)]
    pub chapter: Option<usize>,

    /// Sub-chapters planned per chapter.
    #[arg(long, default_value_t = crate::app::runner::DEFAULT_SUB_CHAPTER_COUNT)]
    pub sub_chapters: usize,

    /// Target words per sub-chapter.
    #[arg(long, default_value_t = crate::app::runner::DEFAULT_TARGET_WORDS)]
    pub words: u32,

    #[arg(long, value_enum, default_value_t = LlmEngine::Openrouter)]
    pub engine: LlmEngine,
}

#[derive(Debug, Args)]
pub struct BookEditArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long)]
    pub book_id: String,

    /// Chapter number (1-based).
    #[arg(long)]
    pub chapter: usize,

    /// Sub-chapter number within the chapter (1-based).
    #[arg(long)]
    pub section: usize,

    /// What to change, e.g. "tighten the dialogue".
    #[arg(long)]
    pub instruction: String,

    #[arg(long, value_enum, default_value_t = LlmEngine::Openrouter)]
    pub engine: LlmEngine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Md,
    Html,
    Epub,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    #[arg(long, default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    #[arg(long)]
    pub book_id: String,

    #[arg(long, value_enum, default_value_t = ExportFormat::Epub)]
    pub format: ExportFormat,

    /// Output file path.
    #[arg(long)]
    pub out: String,

    /// Language tag written into the document.
    #[arg(long, default_value = "en")]
    pub lang: String,

    /// Cover image file: PNG, JPEG, GIF or WebP (EPUB only).
    #[arg(long, conflicts_with = "generate_cover")]
    pub cover: Option<String>,

    /// Ask Gemini for a cover image (EPUB only; needs GEMINI_API_KEY).
    #[arg(long)]
    pub generate_cover: bool,

    /// Overwrite the output if it exists.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Subcommand)]
pub enum PersonaCommand {
    Analyze(PersonaAnalyzeArgs),
}

#[derive(Debug, Args)]
pub struct PersonaAnalyzeArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long)]
    pub name: String,

    /// Text file with a writing sample.
    #[arg(long)]
    pub sample: PathBuf,

    #[arg(long, value_enum, default_value_t = LlmEngine::Openrouter)]
    pub engine: LlmEngine,
}

#[derive(Debug, Subcommand)]
pub enum SiteCommand {
    Add(SiteAddArgs),
    Remove(SiteRefArgs),
    /// Check stored credentials against the WordPress REST API.
    Verify(SiteRefArgs),
    /// Summarize recent posts and attach the result to the site's schedules.
    Analyze(SiteAnalyzeArgs),
}

#[derive(Debug, Args)]
pub struct SiteAddArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long)]
    pub name: String,

    /// Site root, e.g. https://blog.example.com
    #[arg(long)]
    pub url: String,

    #[arg(long)]
    pub username: String,

    /// WordPress Application Password.
    #[arg(long)]
    pub app_password: String,
}

#[derive(Debug, Args)]
pub struct SiteRefArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long)]
    pub site_id: String,
}

#[derive(Debug, Args)]
pub struct SiteAnalyzeArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long)]
    pub site_id: String,

    /// Recent posts to read.
    #[arg(long, default_value_t = 10)]
    pub posts: usize,

    #[arg(long, value_enum, default_value_t = LlmEngine::Openrouter)]
    pub engine: LlmEngine,
}

#[derive(Debug, Subcommand)]
pub enum TemplateCommand {
    Add(TemplateAddArgs),
}

#[derive(Debug, Args)]
pub struct TemplateAddArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long)]
    pub site_id: String,

    #[arg(long)]
    pub name: String,

    /// What each article should be about.
    #[arg(long)]
    pub topic: String,

    #[arg(long, default_value_t = 800)]
    pub words: u32,

    #[arg(long, default_value = "informative")]
    pub tone: String,

    /// Comma-separated SEO keywords.
    #[arg(long, value_delimiter = ',')]
    pub keywords: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum ScheduleCommand {
    Add(ScheduleAddArgs),
    List(StoreArgs),
}

#[derive(Debug, Args)]
pub struct ScheduleAddArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long)]
    pub site_id: String,

    #[arg(long)]
    pub template_id: String,

    #[arg(long)]
    pub persona_id: Option<String>,

    #[arg(long, value_enum, default_value_t = ScheduleFrequency::Weekly)]
    pub frequency: ScheduleFrequency,

    /// Post status on WordPress.
    #[arg(long, value_enum, default_value_t = PostStatus::Draft)]
    pub post_status: PostStatus,

    /// First run (RFC 3339, default: now).
    #[arg(long)]
    pub start_at: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum SchedulerCommand {
    Run(SchedulerRunArgs),
}

#[derive(Debug, Args)]
pub struct SchedulerRunArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Run a single tick and exit.
    #[arg(long)]
    pub once: bool,

    #[arg(long, default_value_t = 60)]
    pub interval_secs: u64,

    #[arg(long, value_enum, default_value_t = LlmEngine::Openrouter)]
    pub engine: LlmEngine,
}
