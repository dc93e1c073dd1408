use std::fs::{self, OpenOptions};
use std::io::{Seek, Write};
use std::path::Path;

use anyhow::Context as _;
use chrono::Utc;
use zip::write::SimpleFileOptions;

use crate::markdown::{chapter_markdown, ensure_xhtml_void_tags, to_html, xml_escape};
use crate::model::Book;

#[derive(Debug, Clone)]
pub struct EpubOptions {
    pub force: bool,
    /// BCP-47 language tag used for EPUB metadata and XHTML documents.
    pub lang: String,
    /// Image for an optional cover page.
    pub cover: Option<CoverImage>,
}

/// Media types accepted for covers, with the file extension used in the package.
const COVER_TYPES: &[(&str, &str)] = &[
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
];

/// Cover image bytes with their media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverImage {
    pub bytes: Vec<u8>,
    pub media_type: &'static str,
}

impl CoverImage {
    /// Detects the format from the file signature, falling back to the
    /// `declared` media type when the signature is unknown.
    pub fn new(bytes: Vec<u8>, declared: Option<&str>) -> anyhow::Result<Self> {
        let media_type = match sniff_media_type(&bytes) {
            Some(media_type) => media_type,
            None => {
                let declared = declared.unwrap_or_default().trim();
                COVER_TYPES
                    .iter()
                    .map(|(media_type, _)| *media_type)
                    .find(|media_type| media_type.eq_ignore_ascii_case(declared))
                    .ok_or_else(|| {
                        anyhow::anyhow!(
                            "unsupported cover image type {declared:?} (expected PNG, JPEG, GIF or WebP)"
                        )
                    })?
            }
        };
        Ok(Self { bytes, media_type })
    }

    /// Reads a cover from disk, using the file extension as the declared type.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let bytes =
            fs::read(path).with_context(|| format!("read cover image: {}", path.display()))?;
        let declared = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .and_then(|ext| match ext.as_str() {
                "jpeg" | "jpg" => Some("image/jpeg"),
                ext => COVER_TYPES
                    .iter()
                    .find(|(_, known)| *known == ext)
                    .map(|(media_type, _)| *media_type),
            });
        Self::new(bytes, declared).with_context(|| format!("cover image: {}", path.display()))
    }

    pub fn file_name(&self) -> String {
        let ext = COVER_TYPES
            .iter()
            .find(|(media_type, _)| *media_type == self.media_type)
            .map_or("img", |(_, ext)| *ext);
        format!("cover.{ext}")
    }
}

fn sniff_media_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"\x89PNG") {
        Some("image/png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(b"GIF8") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

impl Default for EpubOptions {
    fn default() -> Self {
        Self {
            force: false,
            lang: "en".to_string(),
            cover: None,
        }
    }
}

pub fn export_to_file(book: &Book, out_path: &Path, options: &EpubOptions) -> anyhow::Result<()> {
    if out_path.exists() && !options.force {
        anyhow::bail!("epub output already exists: {}", out_path.display());
    }
    if let Some(parent) = out_path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create epub parent dir: {}", parent.display()))?;
    }

    let mut out_options = OpenOptions::new();
    out_options.write(true);
    if options.force {
        out_options.create(true).truncate(true);
    } else {
        out_options.create_new(true);
    }
    let out_file = out_options
        .open(out_path)
        .with_context(|| format!("open epub output: {}", out_path.display()))?;

    write_epub(book, out_file, options)?;
    Ok(())
}

pub fn export_to_bytes(book: &Book, options: &EpubOptions) -> anyhow::Result<Vec<u8>> {
    let cursor = write_epub(book, std::io::Cursor::new(Vec::new()), options)?;
    Ok(cursor.into_inner())
}

/// A chapter document packaged as `OEBPS/<id>.xhtml`.
#[derive(Debug)]
struct ChapterDoc {
    id: String,
    title: String,
    body_html: String,
}

/// Everything the package documents need, rendered once per export.
struct Package<'a> {
    book: &'a Book,
    title: &'a str,
    lang: &'a str,
    uid: String,
    modified: String,
    chapters: Vec<ChapterDoc>,
    cover: Option<&'a CoverImage>,
}

pub fn write_epub<W: Write + Seek>(
    book: &Book,
    writer: W,
    options: &EpubOptions,
) -> anyhow::Result<W> {
    if book.chapters.is_empty() {
        anyhow::bail!("book has no chapters: {}", book.id);
    }
    let lang = match options.lang.trim() {
        "" => "und",
        lang => lang,
    };
    let package = Package {
        book,
        title: match book.title.trim() {
            "" => "Book",
            title => title,
        },
        lang,
        uid: format!("urn:uuid:{}", uuid::Uuid::new_v4()),
        modified: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        chapters: (0..book.chapters.len())
            .filter_map(|idx| {
                let md = chapter_markdown(book, idx)?;
                Some(ChapterDoc {
                    id: format!("chapter{}", idx + 1),
                    title: book.chapters[idx].title.clone(),
                    body_html: ensure_xhtml_void_tags(&to_html(&md)),
                })
            })
            .collect(),
        cover: options.cover.as_ref(),
    };

    let mut zip = zip::ZipWriter::new(writer);

    // `mimetype` must be the first entry and must be stored uncompressed.
    zip.start_file(
        "mimetype",
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored),
    )
    .context("epub start mimetype")?;
    zip.write_all(b"application/epub+zip")
        .context("epub write mimetype")?;

    let mut entries: Vec<(String, Vec<u8>)> = vec![
        ("META-INF/container.xml".to_owned(), CONTAINER_XML.into()),
        ("OEBPS/content.opf".to_owned(), package.opf().into_bytes()),
        ("OEBPS/nav.xhtml".to_owned(), package.nav().into_bytes()),
        ("OEBPS/toc.ncx".to_owned(), package.ncx().into_bytes()),
        ("OEBPS/style.css".to_owned(), STYLE_CSS.into()),
    ];
    if let Some(cover) = package.cover {
        let file_name = cover.file_name();
        let body = format!(
            "<div class=\"cover\"><img src=\"{file_name}\" alt=\"{}\" /></div>",
            xml_escape(package.title)
        );
        entries.push((format!("OEBPS/{file_name}"), cover.bytes.clone()));
        entries.push((
            "OEBPS/cover.xhtml".to_owned(),
            package.xhtml(package.title, &body).into_bytes(),
        ));
    }
    for chapter in &package.chapters {
        entries.push((
            format!("OEBPS/{}.xhtml", chapter.id),
            package.xhtml(&chapter.title, &chapter.body_html).into_bytes(),
        ));
    }

    let deflated =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, contents) in &entries {
        zip.start_file(name.as_str(), deflated)
            .with_context(|| format!("epub start {name}"))?;
        zip.write_all(contents)
            .with_context(|| format!("epub write {name}"))?;
    }

    let writer = zip.finish().context("epub finish zip")?;
    tracing::info!(
        book_id = %book.id,
        chapters = package.chapters.len(),
        cover = ?package.cover.map(|c| c.media_type),
        "epub written"
    );
    Ok(writer)
}

const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#;

const STYLE_CSS: &str = r#"@charset "utf-8";
body { margin: 0 5%; font-family: serif; line-height: 1.5; }
h1 { margin: 2em 0 0.5em; page-break-before: always; }
h2 { margin: 1.5em 0 0.5em; }
h1 + p em { color: #555; }
.cover { text-align: center; }
.cover img { max-width: 100%; height: auto; }
"#;

const XHTML_MEDIA_TYPE: &str = "application/xhtml+xml";

impl Package<'_> {
    fn opf(&self) -> String {
        let esc_title = xml_escape(self.title);
        let esc_lang = xml_escape(self.lang);

        let mut metadata = String::new();
        let description = self.book.description.trim();
        if !description.is_empty() {
            metadata += &format!(
                "    <dc:description>{}</dc:description>\n",
                xml_escape(description)
            );
        }
        if !self.book.genre.trim().is_empty() {
            metadata += &format!(
                "    <dc:subject>{}</dc:subject>\n",
                xml_escape(self.book.genre.trim())
            );
        }
        if self.cover.is_some() {
            metadata += "    <meta name=\"cover\" content=\"cover-image\" />\n";
        }

        let mut manifest = vec![
            item("nav", "nav.xhtml", XHTML_MEDIA_TYPE, Some("nav")),
            item("ncx", "toc.ncx", "application/x-dtbncx+xml", None),
            item("css", "style.css", "text/css", None),
        ];
        let mut spine = Vec::new();
        if let Some(cover) = self.cover {
            manifest.push(item(
                "cover-image",
                &cover.file_name(),
                cover.media_type,
                Some("cover-image"),
            ));
            manifest.push(item("cover", "cover.xhtml", XHTML_MEDIA_TYPE, None));
            spine.push("    <itemref idref=\"cover\" linear=\"no\" />\n".to_owned());
        }
        for chapter in &self.chapters {
            let href = format!("{}.xhtml", chapter.id);
            manifest.push(item(&chapter.id, &href, XHTML_MEDIA_TYPE, None));
            spine.push(format!("    <itemref idref=\"{}\" />\n", chapter.id));
        }

        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://www.idpf.org/2007/opf" unique-identifier="bookid" version="3.0" xml:lang="{esc_lang}">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="bookid">{uid}</dc:identifier>
    <dc:title>{esc_title}</dc:title>
    <dc:language>{esc_lang}</dc:language>
{metadata}    <meta property="dcterms:modified">{modified}</meta>
  </metadata>
  <manifest>
{manifest}  </manifest>
  <spine toc="ncx">
{spine}  </spine>
</package>
"#,
            uid = self.uid,
            modified = self.modified,
            manifest = manifest.concat(),
            spine = spine.concat(),
        )
    }

    fn nav(&self) -> String {
        let entries: String = self
            .chapters
            .iter()
            .map(|ch| {
                format!(
                    "    <li><a href=\"{}.xhtml\">{}</a></li>\n",
                    ch.id,
                    xml_escape(&ch.title)
                )
            })
            .collect();
        let body = format!(
            "<h1>{}</h1>\n<nav epub:type=\"toc\" id=\"toc\">\n  <ol>\n{entries}  </ol>\n</nav>",
            xml_escape(self.title)
        );
        self.document(self.title, &body, " xmlns:epub=\"http://www.idpf.org/2007/ops\"")
    }

    /// EPUB 2 table of contents, for readers without nav support.
    fn ncx(&self) -> String {
        let nav_points: String = self
            .chapters
            .iter()
            .enumerate()
            .map(|(idx, ch)| {
                format!(
                    "    <navPoint id=\"np{order}\" playOrder=\"{order}\">\n      <navLabel><text>{label}</text></navLabel>\n      <content src=\"{id}.xhtml\" />\n    </navPoint>\n",
                    order = idx + 1,
                    label = xml_escape(&ch.title),
                    id = ch.id,
                )
            })
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head>
    <meta name="dtb:uid" content="{uid}" />
    <meta name="dtb:depth" content="1" />
  </head>
  <docTitle><text>{title}</text></docTitle>
  <navMap>
{nav_points}  </navMap>
</ncx>
"#,
            uid = self.uid,
            title = xml_escape(self.title),
        )
    }

    fn xhtml(&self, title: &str, body_html: &str) -> String {
        self.document(title, body_html, "")
    }

    fn document(&self, title: &str, body_html: &str, extra_ns: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml"{extra_ns} lang="{lang}" xml:lang="{lang}">
<head>
  <title>{title}</title>
  <meta charset="utf-8" />
  <link rel="stylesheet" type="text/css" href="style.css" />
</head>
<body>
{body}
</body>
</html>
"#,
            lang = xml_escape(self.lang),
            title = xml_escape(title),
            body = body_html.trim_end(),
        )
    }
}

fn item(id: &str, href: &str, media_type: &str, properties: Option<&str>) -> String {
    let properties = properties
        .map(|p| format!(" properties=\"{p}\""))
        .unwrap_or_default();
    format!("    <item id=\"{id}\" href=\"{href}\" media-type=\"{media_type}\"{properties} />\n")
}
