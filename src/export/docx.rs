//! DOCX writer. Lowers the book into a linear block sequence, then serializes
//! it as an OOXML package (zip archive with hand-built XML parts).

use std::io::{Cursor, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use super::markdown::{parse_blocks, Block, Span};
use super::{validate_book, write_atomically, xml_escape, ConversionError};
use crate::model::GeneratedBook;

const DISCLAIMER: &str = "This book was drafted with the assistance of generative AI and \
reviewed before publication. All rights reserved. No part of this publication may be \
reproduced without permission.";

/// One entry in the flattened document. The serializer maps each block to a
/// `<w:p>` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocBlock {
    Title(String),
    Subtitle(String),
    AuthorLine(String),
    PageBreak,
    Disclaimer(String),
    TocHeading,
    TocEntry(String),
    /// "Chapter N" marker above the chapter title.
    ChapterMarker(usize),
    Heading { level: u8, text: String },
    Paragraph { spans: Vec<Span> },
    ListItem { spans: Vec<Span> },
}

/// Lower the book to its block sequence: front matter, ToC, then each chapter
/// with a page break after it (omitted after the last).
pub fn docx_blocks(book: &GeneratedBook) -> Result<Vec<DocBlock>, ConversionError> {
    validate_book(book)?;

    let mut blocks = vec![
        DocBlock::Title(book.outline.title.clone()),
        DocBlock::Subtitle(book.outline.subtitle.clone()),
        DocBlock::AuthorLine(format!("By {}", book.author)),
        DocBlock::PageBreak,
        DocBlock::Disclaimer(DISCLAIMER.to_string()),
        DocBlock::PageBreak,
        DocBlock::TocHeading,
    ];
    for chapter in &book.chapters {
        blocks.push(DocBlock::TocEntry(chapter.title.clone()));
    }
    blocks.push(DocBlock::PageBreak);

    let last = book.chapters.len() - 1;
    for (i, chapter) in book.chapters.iter().enumerate() {
        blocks.push(DocBlock::ChapterMarker(i + 1));
        blocks.push(DocBlock::Heading {
            level: 1,
            text: chapter.title.clone(),
        });
        for block in parse_blocks(&chapter.body) {
            blocks.push(match block {
                Block::Heading { level, text } => DocBlock::Heading { level, text },
                Block::Paragraph { spans } => DocBlock::Paragraph { spans },
                Block::ListItem { spans } => DocBlock::ListItem { spans },
            });
        }
        if i != last {
            blocks.push(DocBlock::PageBreak);
        }
    }
    Ok(blocks)
}

/// Produce the complete DOCX archive in memory.
pub fn write_docx(book: &GeneratedBook) -> Result<Vec<u8>, ConversionError> {
    let blocks = docx_blocks(book)?;

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    zip.start_file("[Content_Types].xml", options)?;
    zip.write_all(CONTENT_TYPES.as_bytes())?;
    zip.start_file("_rels/.rels", options)?;
    zip.write_all(ROOT_RELS.as_bytes())?;
    zip.start_file("word/_rels/document.xml.rels", options)?;
    zip.write_all(DOCUMENT_RELS.as_bytes())?;
    zip.start_file("word/styles.xml", options)?;
    zip.write_all(STYLES.as_bytes())?;
    zip.start_file("word/numbering.xml", options)?;
    zip.write_all(NUMBERING.as_bytes())?;
    zip.start_file("word/document.xml", options)?;
    zip.write_all(document_xml(&blocks).as_bytes())?;

    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

/// Write the DOCX to a file. The archive is fully built before the file is
/// touched.
pub fn write_docx_file(book: &GeneratedBook, path: &Path) -> Result<(), ConversionError> {
    let bytes = write_docx(book)?;
    write_atomically(path, &bytes)
}

fn styled_paragraph(style: &str, text: &str) -> String {
    format!(
        "<w:p><w:pPr><w:pStyle w:val=\"{}\"/></w:pPr>{}</w:p>",
        style,
        run(text, false, false)
    )
}

fn run(text: &str, bold: bool, italic: bool) -> String {
    let mut props = String::new();
    if bold {
        props.push_str("<w:b/>");
    }
    if italic {
        props.push_str("<w:i/>");
    }
    let rpr = if props.is_empty() {
        String::new()
    } else {
        format!("<w:rPr>{}</w:rPr>", props)
    };
    format!(
        "<w:r>{}<w:t xml:space=\"preserve\">{}</w:t></w:r>",
        rpr,
        xml_escape(text)
    )
}

fn runs(spans: &[Span]) -> String {
    spans
        .iter()
        .map(|s| run(&s.text, s.bold, s.italic))
        .collect()
}

fn document_xml(blocks: &[DocBlock]) -> String {
    let mut body = String::new();
    for block in blocks {
        match block {
            DocBlock::Title(text) => body.push_str(&styled_paragraph("Title", text)),
            DocBlock::Subtitle(text) => body.push_str(&styled_paragraph("Subtitle", text)),
            DocBlock::AuthorLine(text) => body.push_str(&styled_paragraph("Author", text)),
            DocBlock::PageBreak => {
                body.push_str("<w:p><w:r><w:br w:type=\"page\"/></w:r></w:p>")
            }
            DocBlock::Disclaimer(text) => body.push_str(&format!("<w:p>{}</w:p>", run(text, false, false))),
            DocBlock::TocHeading => body.push_str(&styled_paragraph("Heading1", "Contents")),
            DocBlock::TocEntry(text) => body.push_str(&format!("<w:p>{}</w:p>", run(text, false, false))),
            DocBlock::ChapterMarker(n) => {
                body.push_str(&styled_paragraph("ChapterMarker", &format!("Chapter {}", n)))
            }
            DocBlock::Heading { level, text } => {
                body.push_str(&styled_paragraph(&format!("Heading{}", level), text))
            }
            DocBlock::Paragraph { spans } => {
                body.push_str(&format!("<w:p>{}</w:p>", runs(spans)))
            }
            DocBlock::ListItem { spans } => body.push_str(&format!(
                "<w:p><w:pPr><w:pStyle w:val=\"ListParagraph\"/>\
                 <w:numPr><w:ilvl w:val=\"0\"/><w:numId w:val=\"1\"/></w:numPr></w:pPr>{}</w:p>",
                runs(spans)
            )),
        }
    }
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
         <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
         <w:body>{}</w:body></w:document>",
        body
    )
}

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
  <Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/>
  <Override PartName="/word/numbering.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.numbering+xml"/>
</Types>
"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
</Relationships>
"#;

const DOCUMENT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/numbering" Target="numbering.xml"/>
</Relationships>
"#;

const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:style w:type="paragraph" w:styleId="Title">
    <w:name w:val="Title"/>
    <w:pPr><w:jc w:val="center"/><w:spacing w:before="2400" w:after="240"/></w:pPr>
    <w:rPr><w:b/><w:sz w:val="56"/></w:rPr>
  </w:style>
  <w:style w:type="paragraph" w:styleId="Subtitle">
    <w:name w:val="Subtitle"/>
    <w:pPr><w:jc w:val="center"/><w:spacing w:after="240"/></w:pPr>
    <w:rPr><w:i/><w:sz w:val="32"/></w:rPr>
  </w:style>
  <w:style w:type="paragraph" w:styleId="Author">
    <w:name w:val="Author"/>
    <w:pPr><w:jc w:val="center"/></w:pPr>
    <w:rPr><w:sz w:val="28"/></w:rPr>
  </w:style>
  <w:style w:type="paragraph" w:styleId="ChapterMarker">
    <w:name w:val="Chapter Marker"/>
    <w:pPr><w:spacing w:before="1200" w:after="120"/></w:pPr>
    <w:rPr><w:caps/><w:sz w:val="22"/></w:rPr>
  </w:style>
  <w:style w:type="paragraph" w:styleId="Heading1">
    <w:name w:val="heading 1"/>
    <w:pPr><w:spacing w:before="360" w:after="240"/><w:outlineLvl w:val="0"/></w:pPr>
    <w:rPr><w:b/><w:sz w:val="40"/></w:rPr>
  </w:style>
  <w:style w:type="paragraph" w:styleId="Heading2">
    <w:name w:val="heading 2"/>
    <w:pPr><w:spacing w:before="280" w:after="160"/><w:outlineLvl w:val="1"/></w:pPr>
    <w:rPr><w:b/><w:sz w:val="32"/></w:rPr>
  </w:style>
  <w:style w:type="paragraph" w:styleId="Heading3">
    <w:name w:val="heading 3"/>
    <w:pPr><w:spacing w:before="240" w:after="120"/><w:outlineLvl w:val="2"/></w:pPr>
    <w:rPr><w:b/><w:sz w:val="26"/></w:rPr>
  </w:style>
  <w:style w:type="paragraph" w:styleId="ListParagraph">
    <w:name w:val="List Paragraph"/>
    <w:pPr><w:ind w:left="720"/></w:pPr>
  </w:style>
</w:styles>
"#;

const NUMBERING: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:numbering xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:abstractNum w:abstractNumId="0">
    <w:lvl w:ilvl="0">
      <w:numFmt w:val="bullet"/>
      <w:lvlText w:val="&#8226;"/>
      <w:pPr><w:ind w:left="720" w:hanging="360"/></w:pPr>
    </w:lvl>
  </w:abstractNum>
  <w:num w:numId="1">
    <w:abstractNumId w:val="0"/>
  </w:num>
</w:numbering>
"#;
