//! In-process engine: re-flows a document's paragraph text onto PDF pages.
//!
//! Only text survives. Paragraphs styled `Heading*` or `Title` are set in
//! bold at a larger size; everything else is body text. Layout is US letter
//! with one-inch margins and greedy word wrap.

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use tracing::{debug, info};

use super::{ConversionAdapter, expected_output};
use crate::error::{ConvertError, Result};

const DOCUMENT_PART: &str = "word/document.xml";
/// Largest decompressed `word/document.xml` we are willing to parse.
const MAX_DOCUMENT_XML_BYTES: u64 = 64 * 1024 * 1024;

const PAGE_WIDTH: f32 = 612.0;
const PAGE_HEIGHT: f32 = 792.0;
const MARGIN: f32 = 72.0;
const PARAGRAPH_GAP: f32 = 7.2;
const LINE_SPACING: f32 = 1.2;

const BODY_FONT: &str = "F1";
const BODY_SIZE: f32 = 11.0;
const HEADING_FONT: &str = "F2";
const HEADING_SIZE: f32 = 16.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paragraph {
    pub text: String,
    pub heading: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ReflowAdapter;

impl ReflowAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConversionAdapter for ReflowAdapter {
    fn name(&self) -> &str {
        "reflow"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn convert(&self, input: &Path, output_dir: &Path, timeout: Duration) -> Result<PathBuf> {
        let expected = expected_output(input, output_dir);
        let source = tokio::fs::read(input).await?;

        // The renderer owns no files; only this side writes, and only if the
        // render finished in time.
        let render = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
            let paragraphs = extract_paragraphs(&source)?;
            debug!(paragraphs = paragraphs.len(), "document text extracted");
            render_pdf(&paragraphs)
        });

        let pdf = match tokio::time::timeout(timeout, render).await {
            Ok(Ok(rendered)) => rendered?,
            Ok(Err(join)) => return Err(ConvertError::failed(format!("renderer aborted: {join}"))),
            Err(_) => return Err(ConvertError::Timeout(timeout)),
        };

        tokio::fs::write(&expected, &pdf).await?;
        if !tokio::fs::try_exists(&expected).await? {
            return Err(ConvertError::OutputMissing(
                expected.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
            ));
        }
        info!(output = %expected.display(), bytes = pdf.len(), "reflow conversion finished");
        Ok(expected)
    }
}

/// Pull non-blank paragraphs out of a `.docx` archive.
pub fn extract_paragraphs(docx: &[u8]) -> Result<Vec<Paragraph>> {
    extract_paragraphs_within(docx, MAX_DOCUMENT_XML_BYTES)
}

fn extract_paragraphs_within(docx: &[u8], limit: u64) -> Result<Vec<Paragraph>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(docx))
        .map_err(|e| ConvertError::failed(format!("not a valid docx archive: {e}")))?;
    let part = archive
        .by_name(DOCUMENT_PART)
        .map_err(|e| ConvertError::failed(format!("missing {DOCUMENT_PART}: {e}")))?;
    let too_large = || ConvertError::failed(format!("{DOCUMENT_PART} expands beyond {limit} bytes"));
    if part.size() > limit {
        return Err(too_large());
    }
    // The header size is untrusted; cap what is actually inflated too.
    let mut xml = String::new();
    part.take(limit + 1)
        .read_to_string(&mut xml)
        .map_err(|e| ConvertError::failed(format!("unreadable {DOCUMENT_PART}: {e}")))?;
    if xml.len() as u64 > limit {
        return Err(too_large());
    }
    parse_document_xml(&xml)
}

fn parse_document_xml(xml: &str) -> Result<Vec<Paragraph>> {
    let mut reader = Reader::from_str(xml);
    let mut out = Vec::new();
    // Text boxes nest paragraphs inside paragraphs.
    let mut open: Vec<Paragraph> = Vec::new();
    let mut in_text = false;

    let malformed =
        |pos: u64, e: quick_xml::Error| ConvertError::failed(format!("malformed {DOCUMENT_PART} at byte {pos}: {e}"));

    loop {
        let event = reader
            .read_event()
            .map_err(|e| malformed(reader.error_position(), e))?;
        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"p" => open.push(Paragraph { text: String::new(), heading: false }),
                b"t" => in_text = true,
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"pStyle" => {
                    if let (Some(p), Some(style)) = (open.last_mut(), style_value(&e)?) {
                        p.heading = is_heading_style(&style);
                    }
                }
                b"tab" | b"br" | b"cr" => {
                    if let Some(p) = open.last_mut() {
                        p.text.push(' ');
                    }
                }
                _ => {}
            },
            Event::Text(t) if in_text => {
                let text = t
                    .unescape()
                    .map_err(|e| malformed(reader.buffer_position(), e))?;
                if let Some(p) = open.last_mut() {
                    p.text.push_str(&text);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if let Some(p) = open.pop() {
                        if !p.text.trim().is_empty() {
                            out.push(p);
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}

fn style_value(e: &BytesStart<'_>) -> Result<Option<String>> {
    for attr in e.attributes().flatten() {
        if attr.key.local_name().as_ref() == b"val" {
            let value = attr
                .unescape_value()
                .map_err(|e| ConvertError::failed(format!("bad style attribute: {e}")))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn is_heading_style(style: &str) -> bool {
    style.to_ascii_lowercase().starts_with("heading") || style.eq_ignore_ascii_case("title")
}

/// Lay `paragraphs` out on letter pages and serialize the PDF.
pub fn render_pdf(paragraphs: &[Paragraph]) -> Result<Vec<u8>> {
    let pages = layout(paragraphs);

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let body_font = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let heading_font = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            BODY_FONT => body_font,
            HEADING_FONT => heading_font,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for operations in pages {
        let content = Content { operations }
            .encode()
            .map_err(|e| ConvertError::failed(format!("encoding page content: {e}")))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Producer" => Object::string_literal("docpress"),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);
    doc.compress();

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| ConvertError::failed(format!("writing pdf: {e}")))?;
    Ok(out)
}

/// Content-stream operations for each page. Always at least one page.
fn layout(paragraphs: &[Paragraph]) -> Vec<Vec<Operation>> {
    let usable_width = PAGE_WIDTH - 2.0 * MARGIN;
    let top = PAGE_HEIGHT - MARGIN;

    let mut pages = Vec::new();
    let mut current: Vec<Operation> = Vec::new();
    let mut y = top;

    for paragraph in paragraphs {
        let (font, size, bold) = if paragraph.heading {
            (HEADING_FONT, HEADING_SIZE, true)
        } else {
            (BODY_FONT, BODY_SIZE, false)
        };
        let leading = size * LINE_SPACING;

        for line in wrap(&paragraph.text, size, bold, usable_width) {
            if y - leading < MARGIN && !current.is_empty() {
                pages.push(std::mem::take(&mut current));
                y = top;
            }
            let baseline = y - size;
            current.extend([
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![font.into(), size.into()]),
                Operation::new("Td", vec![MARGIN.into(), baseline.into()]),
                Operation::new("Tj", vec![Object::string_literal(encode_win_ansi(&line))]),
                Operation::new("ET", vec![]),
            ]);
            y -= leading;
        }
        y -= PARAGRAPH_GAP;
    }

    pages.push(current);
    pages
}

fn wrap(text: &str, size: f32, bold: bool, max_width: f32) -> Vec<String> {
    let space = text_width(" ", size, bold);
    let mut lines = Vec::new();
    let mut line = String::new();
    let mut width = 0.0;

    for word in text.split_whitespace() {
        let word_width = text_width(word, size, bold);
        if !line.is_empty() && width + space + word_width <= max_width {
            line.push(' ');
            line.push_str(word);
            width += space + word_width;
            continue;
        }
        if !line.is_empty() {
            lines.push(std::mem::take(&mut line));
        }
        if word_width <= max_width {
            line.push_str(word);
            width = word_width;
        } else {
            // Hard-break words wider than the page.
            width = 0.0;
            for c in word.chars() {
                let w = char_width(c, size, bold);
                if width + w > max_width && !line.is_empty() {
                    lines.push(std::mem::take(&mut line));
                    width = 0.0;
                }
                line.push(c);
                width += w;
            }
        }
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

fn text_width(s: &str, size: f32, bold: bool) -> f32 {
    s.chars().map(|c| char_width(c, size, bold)).sum()
}

/// Approximate Helvetica advance widths, in points.
fn char_width(c: char, size: f32, bold: bool) -> f32 {
    let em = match c {
        'i' | 'j' | 'l' | '.' | ',' | ';' | ':' | '\'' | '!' | '|' => 0.24,
        ' ' | 'f' | 't' | 'r' | 'I' | '(' | ')' | '-' => 0.30,
        'm' | 'w' | 'M' | 'W' | '@' => 0.85,
        'A'..='Z' => 0.68,
        '0'..='9' => 0.56,
        _ => 0.52,
    };
    let em = if bold { em * 1.06 } else { em };
    em * size
}

/// Map text onto WinAnsiEncoding; anything unrepresentable becomes `?`.
fn encode_win_ansi(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| match c {
            ' '..='~' => c as u8,
            '\u{a0}'..='\u{ff}' => c as u32 as u8,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201c}' => 0x93,
            '\u{201d}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{2026}' => 0x85,
            '\u{20ac}' => 0x80,
            _ => b'?',
        })
        .collect()
}
