use pulldown_cmark::{Options, Parser};

use crate::model::Book;

pub fn to_html(md: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);

    let parser = Parser::new_ext(md, options);
    let mut html = String::new();
    pulldown_cmark::html::push_html(&mut html, parser);
    html
}

/// Markdown for one chapter: heading, description, then each sub-chapter.
pub fn chapter_markdown(book: &Book, chapter_index: usize) -> Option<String> {
    let chapter = book.chapters.get(chapter_index)?;
    let mut out = format!("# {}\n\n", chapter.title);
    if !chapter.description.trim().is_empty() {
        out.push_str(&format!("*{}*\n\n", chapter.description.trim()));
    }

    for sub in chapter.sub_chapters.as_deref().unwrap_or_default() {
        out.push_str(&format!("## {}\n\n", sub.title));
        let body = sub
            .content
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(&sub.description);
        if !body.trim().is_empty() {
            out.push_str(body.trim());
            out.push_str("\n\n");
        }
    }
    Some(out)
}

pub fn book_markdown(book: &Book) -> String {
    let mut out = format!("# {}\n\n", book.title);
    if !book.description.trim().is_empty() {
        out.push_str(&format!("> {}\n\n", book.description.trim()));
    }
    for idx in 0..book.chapters.len() {
        if let Some(chapter) = chapter_markdown(book, idx) {
            // Chapter headings drop one level under the book title.
            demote_headings(&chapter, &mut out);
        }
    }
    out
}

/// Copies `md` into `out` with every ATX heading one level deeper. Fenced
/// code blocks and `#`-prefixed text that is not a heading are kept as is.
fn demote_headings(md: &str, out: &mut String) {
    let mut open_fence: Option<(char, usize)> = None;
    for line in md.lines() {
        let trimmed = line.trim_start_matches(' ');
        let indented_code = line.len() - trimmed.len() >= 4;

        if let Some((marker, len)) = open_fence {
            let (run_marker, run_len) = fence_run(trimmed);
            if run_marker == Some(marker)
                && run_len >= len
                && trimmed[run_len..].trim().is_empty()
            {
                open_fence = None;
            }
        } else if !indented_code {
            if let (Some(marker), run_len) = fence_run(trimmed)
                && run_len >= 3
            {
                open_fence = Some((marker, run_len));
            } else if heading_level(trimmed).is_some_and(|level| level < 6) {
                out.push('#');
            }
        }
        out.push_str(line);
        out.push('\n');
    }
}

fn fence_run(line: &str) -> (Option<char>, usize) {
    let Some(marker) = line.chars().next().filter(|c| *c == '`' || *c == '~') else {
        return (None, 0);
    };
    (Some(marker), line.chars().take_while(|c| *c == marker).count())
}

fn heading_level(line: &str) -> Option<usize> {
    let level = line.bytes().take_while(|b| *b == b'#').count();
    let rest = &line[level..];
    ((1..=6).contains(&level) && (rest.is_empty() || rest.starts_with([' ', '\t'])))
        .then_some(level)
}

pub fn xml_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Rewrites void tags like `<br>` as `<br />` so the markup is well-formed XHTML.
pub fn ensure_xhtml_void_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len() + 16);
    let mut rest = html;
    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        let tag = &rest[start..];
        let Some(end) = tag_end(tag) else {
            out.push_str(tag);
            return out;
        };

        let inner = &tag[1..end];
        let name = inner
            .chars()
            .take_while(char::is_ascii_alphabetic)
            .collect::<String>()
            .to_ascii_lowercase();
        if VOID_TAGS.contains(&name.as_str()) && !inner.trim_end().ends_with('/') {
            out.push('<');
            out.push_str(inner);
            out.push_str(" />");
        } else {
            out.push_str(&tag[..=end]);
        }
        rest = &tag[end + 1..];
    }
    out.push_str(rest);
    out
}

/// Offset of the `>` that closes the tag opening `tag`. Quoted attribute
/// values may contain `>`.
fn tag_end(tag: &str) -> Option<usize> {
    let mut quote = None;
    for (idx, b) in tag.bytes().enumerate().skip(1) {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => return Some(idx),
            None => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::model::{BookChapter, BookStatus, GenerationStatus, SubChapter};

    fn book() -> Book {
        Book {
            id: "b".to_owned(),
            title: "Ember".to_owned(),
            description: "Fire and ash.".to_owned(),
            genre: "Fantasy".to_owned(),
            sub_genre: None,
            tone: "epic".to_owned(),
            heat_level: None,
            perspective: None,
            persona_id: None,
            status: BookStatus::Draft,
            chapters: vec![BookChapter {
                id: "ch01".to_owned(),
                title: "Spark".to_owned(),
                description: "It begins.".to_owned(),
                status: GenerationStatus::Completed,
                sub_chapters: Some(vec![
                    SubChapter {
                        id: "ch01-01".to_owned(),
                        title: "Kindling".to_owned(),
                        description: "Gathering wood.".to_owned(),
                        content: Some("She struck the flint.".to_owned()),
                        status: GenerationStatus::Completed,
                    },
                    SubChapter {
                        id: "ch01-02".to_owned(),
                        title: "Smoke".to_owned(),
                        description: "Signals rise.".to_owned(),
                        content: None,
                        status: GenerationStatus::Pending,
                    },
                ]),
            }],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn chapter_markdown_falls_back_to_description() {
        let md = chapter_markdown(&book(), 0).unwrap();
        assert!(md.starts_with("# Spark\n\n*It begins.*\n"));
        assert!(md.contains("## Kindling\n\nShe struck the flint."));
        assert!(md.contains("## Smoke\n\nSignals rise."));
    }

    #[test]
    fn book_markdown_demotes_chapter_headings() {
        let md = book_markdown(&book());
        assert!(md.starts_with("# Ember\n"));
        assert!(md.contains("\n## Spark\n"));
        assert!(md.contains("\n### Kindling\n"));
    }

    #[test]
    fn book_markdown_leaves_code_fences_and_hashtags_alone() {
        let mut book = book();
        book.chapters[0].sub_chapters.as_mut().unwrap()[0].content = Some(
            "Run this first:\n\n```sh\n# install deps\n```\n\n#hashtag life\n\n### Aftermath\n\n~~~~\n## not a heading\n~~~\n~~~~"
                .to_owned(),
        );
        let md = book_markdown(&book);
        assert!(md.contains("```sh\n# install deps\n```"));
        assert!(md.contains("\n#hashtag life\n"));
        assert!(md.contains("\n#### Aftermath\n"));
        assert!(md.contains("~~~~\n## not a heading\n~~~\n~~~~"));
        assert!(md.contains("\n### Kindling\n"));
    }

    #[test]
    fn chapter_html_is_well_formed_xhtml() {
        let mut book = book();
        book.chapters[0].sub_chapters.as_mut().unwrap()[0].content =
            Some("She struck the flint.  \nSparks caught.\n\n---\n\nSmoke rose.".to_owned());
        let md = chapter_markdown(&book, 0).unwrap();
        let html = ensure_xhtml_void_tags(&to_html(&md));
        assert!(html.contains("flint.<br />"));
        assert!(html.contains("<hr />"));
        assert!(!html.contains("<br>"));
        assert!(html.contains("<h2>Kindling</h2>"));
    }

    #[test]
    fn void_tag_rewrite_keeps_attributes_and_closed_tags() {
        let out = ensure_xhtml_void_tags(
            "<p>Café</p><img alt=\"a > b\" src=\"cover.png\"><br/><input disabled>",
        );
        assert!(out.contains("<p>Café</p>"));
        assert!(out.contains("<br/>"));
        assert!(out.contains("<input disabled />"));
        assert!(out.contains("src=\"cover.png\" />"));
    }
}
