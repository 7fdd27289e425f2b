//! EPUB writer. Consumes the assembled book and builds the archive in memory
//! (mimetype, container, OPF, NCX, stylesheet, title/toc/chapter pages).

use std::io::{Cursor, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use super::markdown::to_xhtml;
use super::{validate_book, write_atomically, xml_escape, ConversionError};
use crate::model::GeneratedBook;

const MIMETYPE: &[u8] = b"application/epub+zip";
const OEBPS_PREFIX: &str = "OEBPS/";

const CONTAINER_XML: &[u8] = b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<container version=\"1.0\" xmlns=\"urn:oasis:names:tc:opendocument:xmlns:container\">\n  <rootfiles>\n    <rootfile full-path=\"OEBPS/content.opf\" media-type=\"application/oebps-package+xml\"/>\n  </rootfiles>\n</container>";

const STYLESHEET: &str = "body { font-family: serif; line-height: 1.5; margin: 1em; }\n\
h1, h2, h3 { font-family: sans-serif; }\n\
h1 { font-size: 1.6em; }\n\
h2 { font-size: 1.3em; }\n\
h3 { font-size: 1.1em; }\n\
.titlepage { text-align: center; margin-top: 4em; }\n\
.author { margin-top: 2em; font-style: italic; }\n\
blockquote { margin-left: 1.5em; font-style: italic; }\n";

/// Content pages in spine order: title page, toc page, then one per chapter.
fn content_pages(book: &GeneratedBook) -> Vec<(String, String)> {
    let mut pages = vec![
        ("title".to_string(), "title.xhtml".to_string()),
        ("toc-page".to_string(), "toc.xhtml".to_string()),
    ];
    for i in 1..=book.chapters.len() {
        pages.push((format!("chapter-{}", i), format!("chapter-{}.xhtml", i)));
    }
    pages
}

/// Produce the complete EPUB archive in memory.
pub fn write_epub(book: &GeneratedBook) -> Result<Vec<u8>, ConversionError> {
    validate_book(book)?;

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options_stored = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .unix_permissions(0o644);
    let options_deflate = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    // Mimetype first, uncompressed (required by the EPUB spec).
    zip.start_file("mimetype", options_stored)?;
    zip.write_all(MIMETYPE)?;

    zip.start_file("META-INF/container.xml", options_deflate)?;
    zip.write_all(CONTAINER_XML)?;

    zip.start_file(format!("{}style.css", OEBPS_PREFIX), options_deflate)?;
    zip.write_all(STYLESHEET.as_bytes())?;

    write_opf(book, &mut zip, options_deflate)?;
    write_ncx(book, &mut zip, options_deflate)?;
    write_title_page(book, &mut zip, options_deflate)?;
    write_toc_page(book, &mut zip, options_deflate)?;
    write_chapters(book, &mut zip, options_deflate)?;

    if let Some(cover) = &book.cover {
        zip.start_file(
            format!("{}images/cover.{}", OEBPS_PREFIX, cover.extension()),
            options_deflate,
        )?;
        zip.write_all(&cover.data)?;
        write_cover_page(book, &mut zip, options_deflate)?;
    }

    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

/// Write the EPUB to a file. The archive is fully built before the file is
/// touched.
pub fn write_epub_file(book: &GeneratedBook, path: &Path) -> Result<(), ConversionError> {
    let bytes = write_epub(book)?;
    write_atomically(path, &bytes)
}

fn identifier(book: &GeneratedBook) -> String {
    format!(
        "urn:bookwright:{}",
        book.outline.title.to_lowercase().replace(' ', "-")
    )
}

fn write_opf(
    book: &GeneratedBook,
    zip: &mut ZipWriter<impl Write + std::io::Seek>,
    options: SimpleFileOptions,
) -> Result<(), ConversionError> {
    let id = xml_escape(&identifier(book));
    let title = xml_escape(&book.outline.title);
    let creator = xml_escape(&book.author);
    let description = xml_escape(&book.outline.description);

    let mut manifest = String::from(
        r#"<item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
  <item id="css" href="style.css" media-type="text/css"/>
"#,
    );
    if let Some(cover) = &book.cover {
        manifest.push_str(&format!(
            r#"  <item id="cover-img" href="images/cover.{}" media-type="{}"/>
  <item id="cover" href="cover.xhtml" media-type="application/xhtml+xml"/>
"#,
            cover.extension(),
            cover.media_type
        ));
    }
    for (page_id, href) in content_pages(book) {
        manifest.push_str(&format!(
            r#"  <item id="{}" href="{}" media-type="application/xhtml+xml"/>
"#,
            page_id, href
        ));
    }

    // Spine references every content page in manifest order.
    let mut spine = String::new();
    if book.cover.is_some() {
        spine.push_str("  <itemref idref=\"cover\"/>\n");
    }
    for (page_id, _) in content_pages(book) {
        spine.push_str(&format!("  <itemref idref=\"{}\"/>\n", page_id));
    }

    let opf = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" unique-identifier="book-id" version="2.0"
  xmlns:dc="http://purl.org/dc/elements/1.1/">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="book-id">{id}</dc:identifier>
    <dc:title>{title}</dc:title>
    <dc:creator>{creator}</dc:creator>
    <dc:language>en</dc:language>
    {description_el}
  </metadata>
  <manifest>
  {manifest}</manifest>
  <spine toc="ncx">
{spine}  </spine>
</package>
"#,
        id = id,
        title = title,
        creator = creator,
        description_el = if description.is_empty() {
            String::new()
        } else {
            format!("<dc:description>{}</dc:description>", description)
        },
        manifest = manifest,
        spine = spine,
    );

    zip.start_file(format!("{}content.opf", OEBPS_PREFIX), options)?;
    zip.write_all(opf.as_bytes())?;
    Ok(())
}

fn write_ncx(
    book: &GeneratedBook,
    zip: &mut ZipWriter<impl Write + std::io::Seek>,
    options: SimpleFileOptions,
) -> Result<(), ConversionError> {
    let mut nav_points = String::new();
    let mut play_order = 0u32;
    let mut nav_point = |label: &str, src: &str| {
        play_order += 1;
        nav_points.push_str(&format!(
            r#"    <navPoint id="navpoint-{order}" playOrder="{order}">
      <navLabel><text>{label}</text></navLabel>
      <content src="{src}"/>
    </navPoint>
"#,
            order = play_order,
            label = xml_escape(label),
            src = src,
        ));
    };
    nav_point("Title Page", "title.xhtml");
    nav_point("Table of Contents", "toc.xhtml");
    for (i, chapter) in book.chapters.iter().enumerate() {
        nav_point(&chapter.title, &format!("chapter-{}.xhtml", i + 1));
    }

    let ncx = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head>
    <meta name="dtb:uid" content="{}"/>
  </head>
  <docTitle>
    <text>{}</text>
  </docTitle>
  <navMap>
{}  </navMap>
</ncx>
"#,
        xml_escape(&identifier(book)),
        xml_escape(&book.outline.title),
        nav_points
    );
    zip.start_file(format!("{}toc.ncx", OEBPS_PREFIX), options)?;
    zip.write_all(ncx.as_bytes())?;
    Ok(())
}

/// Shared page skeleton. `css_href` is relative to the page's own location;
/// all pages live flat in OEBPS/ next to the stylesheet.
fn page(title: &str, css_href: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.1//EN" "http://www.w3.org/TR/xhtml11/DTD/xhtml11.dtd">
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
  <meta http-equiv="Content-Type" content="application/xhtml+xml; charset=utf-8"/>
  <title>{}</title>
  <link rel="stylesheet" type="text/css" href="{}"/>
</head>
<body>
{}
</body>
</html>
"#,
        xml_escape(title),
        css_href,
        body
    )
}

fn write_title_page(
    book: &GeneratedBook,
    zip: &mut ZipWriter<impl Write + std::io::Seek>,
    options: SimpleFileOptions,
) -> Result<(), ConversionError> {
    let mut body = format!(
        "  <div class=\"titlepage\">\n    <h1>{}</h1>\n",
        xml_escape(&book.outline.title)
    );
    if !book.outline.subtitle.is_empty() {
        body.push_str(&format!(
            "    <h2>{}</h2>\n",
            xml_escape(&book.outline.subtitle)
        ));
    }
    body.push_str(&format!(
        "    <p class=\"author\">By {}</p>\n",
        xml_escape(&book.author)
    ));
    if !book.outline.description.is_empty() {
        body.push_str(&format!(
            "    <p>{}</p>\n",
            xml_escape(&book.outline.description)
        ));
    }
    body.push_str("  </div>");

    let xhtml = page(&book.outline.title, "style.css", &body);
    zip.start_file(format!("{}title.xhtml", OEBPS_PREFIX), options)?;
    zip.write_all(xhtml.as_bytes())?;
    Ok(())
}

fn write_toc_page(
    book: &GeneratedBook,
    zip: &mut ZipWriter<impl Write + std::io::Seek>,
    options: SimpleFileOptions,
) -> Result<(), ConversionError> {
    let mut items = String::new();
    for (i, chapter) in book.chapters.iter().enumerate() {
        items.push_str(&format!(
            "    <li><a href=\"chapter-{}.xhtml\">{}</a></li>\n",
            i + 1,
            xml_escape(&chapter.title)
        ));
    }
    let body = format!(
        "  <h1>Table of Contents</h1>\n  <ol>\n{}  </ol>",
        items
    );
    let xhtml = page("Table of Contents", "style.css", &body);
    zip.start_file(format!("{}toc.xhtml", OEBPS_PREFIX), options)?;
    zip.write_all(xhtml.as_bytes())?;
    Ok(())
}

fn write_chapters(
    book: &GeneratedBook,
    zip: &mut ZipWriter<impl Write + std::io::Seek>,
    options: SimpleFileOptions,
) -> Result<(), ConversionError> {
    for (i, chapter) in book.chapters.iter().enumerate() {
        // Full Markdown pass for rendered chapter bodies.
        let rendered = to_xhtml(&chapter.body);
        let body = format!(
            "  <h1>{}</h1>\n{}",
            xml_escape(&chapter.title),
            rendered
        );
        let xhtml = page(&chapter.title, "style.css", &body);
        zip.start_file(
            format!("{}chapter-{}.xhtml", OEBPS_PREFIX, i + 1),
            options,
        )?;
        zip.write_all(xhtml.as_bytes())?;
    }
    Ok(())
}

fn write_cover_page(
    book: &GeneratedBook,
    zip: &mut ZipWriter<impl Write + std::io::Seek>,
    options: SimpleFileOptions,
) -> Result<(), ConversionError> {
    let ext = match &book.cover {
        Some(cover) => cover.extension(),
        None => return Ok(()),
    };
    let body = format!(
        "  <div style=\"text-align: center;\">\n    <img src=\"images/cover.{}\" alt=\"Cover\" style=\"max-width: 100%; height: auto;\"/>\n  </div>",
        ext
    );
    let xhtml = page("Cover", "style.css", &body);
    zip.start_file(format!("{}cover.xhtml", OEBPS_PREFIX), options)?;
    zip.write_all(xhtml.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::tests::sample_book;
    use super::*;
    use crate::model::CoverImage;
    use std::io::Read;
    use zip::read::ZipArchive;

    fn read_entry(zip: &mut ZipArchive<Cursor<Vec<u8>>>, name: &str) -> String {
        let mut content = String::new();
        zip.by_name(name).unwrap().read_to_string(&mut content).unwrap();
        content
    }

    fn manifest_content_ids(opf: &str) -> Vec<String> {
        opf.lines()
            .filter(|l| l.contains("<item ") && l.contains("application/xhtml+xml"))
            .filter_map(|l| {
                let start = l.find("id=\"")? + 4;
                let end = l[start..].find('"')? + start;
                Some(l[start..end].to_string())
            })
            .collect()
    }

    fn spine_ids(opf: &str) -> Vec<String> {
        opf.lines()
            .filter(|l| l.contains("<itemref "))
            .filter_map(|l| {
                let start = l.find("idref=\"")? + 7;
                let end = l[start..].find('"')? + start;
                Some(l[start..end].to_string())
            })
            .collect()
    }

    #[test]
    fn three_chapters_give_five_content_entries_and_matching_spine() {
        let book = sample_book(3);
        let bytes = write_epub(&book).unwrap();
        let mut zip = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let opf = read_entry(&mut zip, "OEBPS/content.opf");

        let manifest = manifest_content_ids(&opf);
        assert_eq!(
            manifest,
            vec!["title", "toc-page", "chapter-1", "chapter-2", "chapter-3"]
        );
        let spine = spine_ids(&opf);
        assert_eq!(spine, manifest);
    }

    #[test]
    fn mimetype_is_first_and_uncompressed() {
        let book = sample_book(1);
        let bytes = write_epub(&book).unwrap();
        let mut zip = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let first = zip.by_index(0).unwrap();
        assert_eq!(first.name(), "mimetype");
        assert_eq!(first.compression(), zip::CompressionMethod::Stored);
    }

    #[test]
    fn ncx_play_order_starts_at_one_and_lists_all_pages() {
        let book = sample_book(2);
        let bytes = write_epub(&book).unwrap();
        let mut zip = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let ncx = read_entry(&mut zip, "OEBPS/toc.ncx");
        assert!(ncx.contains("playOrder=\"1\""));
        assert!(ncx.contains("Title Page"));
        assert!(ncx.contains("Table of Contents"));
        assert!(ncx.contains("playOrder=\"4\""));
        assert!(ncx.contains("chapter-2.xhtml"));
        assert!(!ncx.contains("playOrder=\"0\""));
    }

    #[test]
    fn chapter_pages_link_stylesheet_relatively_and_render_markdown() {
        let book = sample_book(1);
        let bytes = write_epub(&book).unwrap();
        let mut zip = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let chapter = read_entry(&mut zip, "OEBPS/chapter-1.xhtml");
        assert!(chapter.contains(r#"href="style.css""#));
        assert!(chapter.contains("<h2>A Section</h2>"));
        assert!(chapter.contains("<strong>bold</strong>"));
        assert!(chapter.contains("<li>first point</li>"));
        assert!(!chapter.contains("##"));
    }

    #[test]
    fn toc_page_lists_every_chapter_in_order() {
        let book = sample_book(3);
        let bytes = write_epub(&book).unwrap();
        let mut zip = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let toc = read_entry(&mut zip, "OEBPS/toc.xhtml");
        let first = toc.find("chapter-1.xhtml").unwrap();
        let second = toc.find("chapter-2.xhtml").unwrap();
        let third = toc.find("chapter-3.xhtml").unwrap();
        assert!(first < second && second < third);
    }

    #[test]
    fn cover_adds_image_page_and_leads_the_spine() {
        let mut book = sample_book(1);
        book.cover = Some(CoverImage {
            data: vec![0x89, 0x50, 0x4e, 0x47],
            media_type: "image/png".to_string(),
        });
        let bytes = write_epub(&book).unwrap();
        let mut zip = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let names: Vec<String> = zip.file_names().map(String::from).collect();
        assert!(names.contains(&"OEBPS/images/cover.png".to_string()));
        assert!(names.contains(&"OEBPS/cover.xhtml".to_string()));
        let opf = read_entry(&mut zip, "OEBPS/content.opf");
        let spine = spine_ids(&opf);
        assert_eq!(spine[0], "cover");
    }

    #[test]
    fn incomplete_book_produces_no_bytes() {
        let mut book = sample_book(2);
        book.chapters.pop();
        assert!(matches!(
            write_epub(&book),
            Err(ConversionError::Incomplete { .. })
        ));
    }
}
