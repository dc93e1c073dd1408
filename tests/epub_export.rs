use std::io::{Cursor, Read as _};

use chrono::Utc;
use pubhub::epub::{CoverImage, EpubOptions, export_to_bytes, export_to_file};
use pubhub::model::{Book, BookChapter, BookStatus, GenerationStatus, SubChapter};

fn sub(id: &str, title: &str, content: Option<&str>) -> SubChapter {
    SubChapter {
        id: id.to_owned(),
        title: title.to_owned(),
        description: format!("About {title}."),
        content: content.map(str::to_owned),
        status: if content.is_some() {
            GenerationStatus::Completed
        } else {
            GenerationStatus::Pending
        },
    }
}

fn book() -> Book {
    Book {
        id: "book1".to_owned(),
        title: "Salt & Ember".to_owned(),
        description: "A coastal fantasy.".to_owned(),
        genre: "Fantasy".to_owned(),
        sub_genre: None,
        tone: "lyrical".to_owned(),
        heat_level: None,
        perspective: None,
        persona_id: None,
        status: BookStatus::Completed,
        chapters: vec![
            BookChapter {
                id: "ch01".to_owned(),
                title: "The Tide".to_owned(),
                description: "Waters rise.".to_owned(),
                status: GenerationStatus::Completed,
                sub_chapters: Some(vec![sub(
                    "ch01-01",
                    "Low Water",
                    Some("The harbor emptied.<br>Gulls wheeled."),
                )]),
            },
            BookChapter {
                id: "ch02".to_owned(),
                title: "The Fire".to_owned(),
                description: "Embers fall.".to_owned(),
                status: GenerationStatus::Pending,
                sub_chapters: Some(vec![sub("ch02-01", "Sparks", None)]),
            },
        ],
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn read_entry(archive: &mut zip::ZipArchive<Cursor<Vec<u8>>>, name: &str) -> String {
    let mut file = archive.by_name(name).unwrap();
    let mut out = String::new();
    file.read_to_string(&mut out).unwrap();
    out
}

#[test]
fn epub_contains_mimetype_container_and_one_file_per_chapter() -> anyhow::Result<()> {
    let bytes = export_to_bytes(&book(), &EpubOptions::default())?;
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;

    {
        let first = archive.by_index(0)?;
        assert_eq!(first.name(), "mimetype");
        assert_eq!(first.compression(), zip::CompressionMethod::Stored);
    }
    assert_eq!(read_entry(&mut archive, "mimetype"), "application/epub+zip");
    assert!(read_entry(&mut archive, "META-INF/container.xml").contains("OEBPS/content.opf"));

    let names = archive.file_names().map(str::to_owned).collect::<Vec<_>>();
    let chapters = names
        .iter()
        .filter(|n| n.starts_with("OEBPS/chapter") && n.ends_with(".xhtml"))
        .count();
    assert_eq!(chapters, 2);
    assert!(names.iter().any(|n| n == "OEBPS/toc.ncx"));
    assert!(names.iter().any(|n| n == "OEBPS/nav.xhtml"));
    assert!(!names.iter().any(|n| n == "OEBPS/cover.png"));

    let ch1 = read_entry(&mut archive, "OEBPS/chapter1.xhtml");
    assert!(ch1.contains("The harbor emptied."));
    assert!(ch1.contains("<br />"));
    let ch2 = read_entry(&mut archive, "OEBPS/chapter2.xhtml");
    assert!(ch2.contains("About Sparks."), "unwritten sections show their description");

    let opf = read_entry(&mut archive, "OEBPS/content.opf");
    assert!(opf.contains("Salt &amp; Ember"));
    Ok(())
}

#[test]
fn cover_is_packaged_when_given() -> anyhow::Result<()> {
    let options = EpubOptions {
        cover: Some(CoverImage::new(b"\x89PNG\r\n".to_vec(), None)?),
        ..EpubOptions::default()
    };
    let bytes = export_to_bytes(&book(), &options)?;
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let names = archive.file_names().map(str::to_owned).collect::<Vec<_>>();
    assert!(names.iter().any(|n| n == "OEBPS/cover.png"));
    assert!(names.iter().any(|n| n == "OEBPS/cover.xhtml"));
    let opf = read_entry(&mut archive, "OEBPS/content.opf");
    assert!(opf.contains("href=\"cover.png\" media-type=\"image/png\""));
    Ok(())
}

#[test]
fn jpeg_cover_keeps_its_media_type() -> anyhow::Result<()> {
    // Declared type is wrong on purpose; the JPEG signature wins.
    let cover = CoverImage::new(b"\xFF\xD8\xFF\xE0jfif".to_vec(), Some("image/png"))?;
    assert_eq!(cover.media_type, "image/jpeg");

    let options = EpubOptions {
        cover: Some(cover),
        ..EpubOptions::default()
    };
    let mut archive = zip::ZipArchive::new(Cursor::new(export_to_bytes(&book(), &options)?))?;
    assert!(archive.by_name("OEBPS/cover.jpg").is_ok());
    assert!(archive.by_name("OEBPS/cover.png").is_err());
    let opf = read_entry(&mut archive, "OEBPS/content.opf");
    assert!(opf.contains("href=\"cover.jpg\" media-type=\"image/jpeg\""));
    assert!(read_entry(&mut archive, "OEBPS/cover.xhtml").contains("src=\"cover.jpg\""));
    Ok(())
}

#[test]
fn cover_type_falls_back_to_declared_then_rejects_unknown() -> anyhow::Result<()> {
    let webp = CoverImage::new(b"unknown-bytes".to_vec(), Some("image/webp"))?;
    assert_eq!(webp.file_name(), "cover.webp");

    let err = CoverImage::new(b"unknown-bytes".to_vec(), Some("image/tiff")).unwrap_err();
    assert!(err.to_string().contains("unsupported cover image type"));
    Ok(())
}

#[test]
fn cover_file_extension_is_used_when_signature_is_unknown() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let path = temp.path().join("front.JPEG");
    std::fs::write(&path, b"not-really-a-jpeg")?;
    assert_eq!(CoverImage::from_file(&path)?.media_type, "image/jpeg");
    Ok(())
}

#[test]
fn export_refuses_to_overwrite_without_force() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let out = temp.path().join("book.epub");
    std::fs::write(&out, "existing")?;

    assert!(export_to_file(&book(), &out, &EpubOptions::default()).is_err());
    assert_eq!(std::fs::read_to_string(&out)?, "existing");

    let forced = EpubOptions {
        force: true,
        ..EpubOptions::default()
    };
    export_to_file(&book(), &out, &forced)?;
    assert!(std::fs::metadata(&out)?.len() > 100);
    Ok(())
}

#[test]
fn empty_book_is_rejected() {
    let mut empty = book();
    empty.chapters.clear();
    assert!(export_to_bytes(&empty, &EpubOptions::default()).is_err());
}
