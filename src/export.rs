use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::Path;

use anyhow::Context as _;

use crate::cli::{ExportArgs, ExportFormat};
use crate::config::LlmConfig;
use crate::epub::{self, CoverImage, EpubOptions};
use crate::gemini::GeminiClient;
use crate::markdown::{book_markdown, to_html, xml_escape};
use crate::model::Book;
use crate::store::{BookStore, LocalFsStore};

pub async fn run(args: ExportArgs) -> anyhow::Result<()> {
    let store = LocalFsStore::new(&args.data_dir);
    let book = store
        .get_book(&args.book_id)
        .await
        .context("load book")?
        .ok_or_else(|| anyhow::anyhow!("book not found: {}", args.book_id))?;

    let out = Path::new(&args.out);
    if out.exists() && !args.force {
        anyhow::bail!("export output already exists: {}", args.out);
    }

    tracing::info!(book_id = %book.id, format = ?args.format, out = %args.out, "export");
    match args.format {
        ExportFormat::Md => write_output(out, &book_markdown(&book), args.force)?,
        ExportFormat::Html => write_output(out, &render_html(&book, &args.lang), args.force)?,
        ExportFormat::Epub => {
            let cover = match &args.cover {
                Some(path) => Some(CoverImage::from_file(Path::new(path))?),
                None if args.generate_cover => Some(generate_cover(&book).await?),
                None => None,
            };
            let options = EpubOptions {
                force: args.force,
                lang: args.lang.clone(),
                cover,
            };
            epub::export_to_file(&book, out, &options)?;
        }
    }

    Ok(())
}

async fn generate_cover(book: &Book) -> anyhow::Result<CoverImage> {
    let client = GeminiClient::from_config(&LlmConfig::from_env()?)?;
    let prompt = format!(
        "A book cover illustration for a {genre} novel titled \"{title}\". {description} \
Portrait orientation, no text other than the title.",
        genre = book.genre,
        title = book.title,
        description = book.description.trim(),
    );
    let image = client
        .generate_image(&prompt)
        .await
        .context("generate cover image")?;
    CoverImage::new(image.bytes, image.mime_type.as_deref()).context("generated cover image")
}

pub fn render_html(book: &Book, lang: &str) -> String {
    let body = to_html(&book_markdown(book));
    format!(
        "<!doctype html>\n<html lang=\"{lang}\">\n<head>\n  <meta charset=\"utf-8\">\n  <title>{title}</title>\n  <style>body {{ max-width: 40em; margin: 2em auto; font-family: serif; line-height: 1.6; }}</style>\n</head>\n<body>\n{body}</body>\n</html>\n",
        lang = xml_escape(lang),
        title = xml_escape(&book.title),
    )
}

pub fn write_output(path: &Path, contents: &str, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("output already exists: {}", path.display());
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir: {}", parent.display()))?;
    }

    let mut options = OpenOptions::new();
    options.write(true);
    if force {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }

    let mut file = options
        .open(path)
        .with_context(|| format!("open output: {}", path.display()))?;
    file.write_all(contents.as_bytes())
        .with_context(|| format!("write output: {}", path.display()))?;
    file.flush()
        .with_context(|| format!("flush output: {}", path.display()))?;
    Ok(())
}
