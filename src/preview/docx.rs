//! Word-document excerpts: `word/document.xml` → short HTML.
//!
//! The body is streamed straight out of the zip entry and parsing stops as
//! soon as more text than the excerpt budget has been collected, so a
//! 300-page document costs the same as a one-page one. Paragraph styles map
//! to headings, numbered/bulleted paragraphs to list items, tables to HTML
//! tables with one cell per `w:tc`.

use super::package::{self, attr};
use super::{HtmlExcerpt, PreviewArtifact, PreviewOptions};
use crate::error::PreviewError;
use once_cell::sync::Lazy;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use std::io::{BufReader, Read};
use tracing::debug;
use zip::result::ZipError;

/// Appended where the excerpt was cut.
pub const ELLIPSIS: &str = "...";

const DOCUMENT_PART: &str = "word/document.xml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParagraphKind {
    Body,
    Heading(u8),
    ListItem,
}

#[derive(Debug, Default)]
struct Run {
    text: String,
    bold: bool,
    italic: bool,
}

#[derive(Debug)]
struct Paragraph {
    kind: ParagraphKind,
    runs: Vec<Run>,
}

#[derive(Debug)]
enum Block {
    Paragraph(Paragraph),
    Table(Vec<Vec<String>>),
}

/// Build the excerpt artifact for a `.docx` upload.
pub fn render_excerpt(bytes: &[u8], options: &PreviewOptions) -> Result<PreviewArtifact, PreviewError> {
    let mut archive = package::open(bytes)?;
    let entry = archive.by_name(DOCUMENT_PART).map_err(|e| match e {
        ZipError::FileNotFound => PreviewError::corrupt(format!("missing part '{DOCUMENT_PART}'")),
        other => PreviewError::corrupt(format!("cannot open '{DOCUMENT_PART}': {other}")),
    })?;
    let reader = BufReader::new(entry.take(options.max_part_bytes));

    let blocks = extract_blocks(reader, options.excerpt_chars)?;
    let excerpt = write_html(&blocks, options.excerpt_chars);
    debug!(
        "Word excerpt: {} blocks, {} bytes HTML, truncated={}",
        blocks.len(),
        excerpt.html.len(),
        excerpt.truncated
    );
    Ok(PreviewArtifact::Excerpt(excerpt))
}

static RE_HEADING_STYLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^heading\s*([1-6])$").unwrap());

fn style_kind(style: &str) -> Option<ParagraphKind> {
    if let Some(caps) = RE_HEADING_STYLE.captures(style) {
        return caps[1].parse().ok().map(ParagraphKind::Heading);
    }
    let lower = style.to_ascii_lowercase();
    if lower == "title" {
        Some(ParagraphKind::Heading(1))
    } else if lower == "subtitle" {
        Some(ParagraphKind::Heading(2))
    } else if lower.starts_with("list") {
        Some(ParagraphKind::ListItem)
    } else {
        None
    }
}

/// `<w:b/>` is on; `<w:b w:val="0"/>` and `w:val="false"` are off.
fn toggle_on(e: &BytesStart<'_>) -> bool {
    !matches!(attr(e, b"w:val").as_deref(), Some("0") | Some("false") | Some("off"))
}

/// Walk the document body collecting at most `budget + 1` visible characters.
fn extract_blocks<R: std::io::BufRead>(source: R, budget: usize) -> Result<Vec<Block>, PreviewError> {
    let mut reader = Reader::from_reader(source);
    let mut buf = Vec::new();

    let mut blocks = Vec::new();
    let mut paragraph: Option<Paragraph> = None;
    // Text boxes (`w:txbxContent`) nest paragraphs and runs inside a run;
    // their content is flattened into the enclosing paragraph.
    let mut nested_paragraphs = 0usize;
    let mut runs: Vec<Run> = Vec::new();
    let mut pending_space = false;
    let mut in_run_props = false;
    let mut in_text = false;

    let mut table_depth = 0usize;
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell = String::new();

    let mut collected = 0usize;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| PreviewError::decode(format!("malformed document.xml: {e}")))?;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                match e.local_name().as_ref() {
                    b"p" if !is_empty => {
                        if table_depth == 0 {
                            if paragraph.is_some() {
                                nested_paragraphs += 1;
                                pending_space = true;
                            } else {
                                paragraph = Some(Paragraph {
                                    kind: ParagraphKind::Body,
                                    runs: Vec::new(),
                                });
                            }
                        } else if !cell.is_empty() {
                            cell.push(' ');
                        }
                    }
                    b"pStyle" if nested_paragraphs == 0 => {
                        if let (Some(p), Some(style)) = (paragraph.as_mut(), attr(e, b"w:val")) {
                            if let Some(kind) = style_kind(&style) {
                                p.kind = kind;
                            }
                        }
                    }
                    b"numPr" if nested_paragraphs == 0 => {
                        if let Some(p) = paragraph.as_mut() {
                            if p.kind == ParagraphKind::Body {
                                p.kind = ParagraphKind::ListItem;
                            }
                        }
                    }
                    b"r" if !is_empty => runs.push(Run::default()),
                    b"rPr" if !is_empty => in_run_props = true,
                    b"b" if in_run_props => {
                        if let Some(r) = runs.last_mut() {
                            r.bold = toggle_on(e);
                        }
                    }
                    b"i" if in_run_props => {
                        if let Some(r) = runs.last_mut() {
                            r.italic = toggle_on(e);
                        }
                    }
                    b"t" if !is_empty => in_text = true,
                    b"tab" | b"br" | b"cr" if !runs.is_empty() && !in_run_props => {
                        append(&mut runs, &mut cell, table_depth, " ");
                    }
                    b"tbl" if !is_empty => {
                        table_depth += 1;
                        if table_depth == 1 {
                            rows.clear();
                        }
                    }
                    b"tr" if !is_empty && table_depth == 1 => row = Vec::new(),
                    b"tc" if !is_empty && table_depth == 1 => cell = String::new(),
                    _ => {}
                }
            }
            Event::Text(ref t) if in_text => {
                let text = t
                    .unescape()
                    .map_err(|e| PreviewError::decode(format!("bad text in document.xml: {e}")))?;
                collected += text.chars().count();
                append(&mut runs, &mut cell, table_depth, &text);
                if collected > budget {
                    break;
                }
            }
            Event::End(ref e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"rPr" => in_run_props = false,
                b"r" => {
                    if let (Some(r), Some(p)) = (runs.pop(), paragraph.as_mut()) {
                        if table_depth == 0 && push_run(p, r, &mut pending_space) {
                            collected += 1;
                        }
                    }
                }
                b"p" if table_depth == 0 && nested_paragraphs > 0 => {
                    nested_paragraphs -= 1;
                    pending_space = true;
                }
                b"p" if table_depth == 0 => {
                    pending_space = false;
                    if let Some(p) = paragraph.take() {
                        if !p.runs.is_empty() {
                            blocks.push(Block::Paragraph(p));
                        }
                    }
                }
                b"tc" if table_depth == 1 => row.push(std::mem::take(&mut cell).trim().to_string()),
                b"tr" if table_depth == 1 => rows.push(std::mem::take(&mut row)),
                b"tbl" => {
                    table_depth = table_depth.saturating_sub(1);
                    if table_depth == 0 && !rows.is_empty() {
                        blocks.push(Block::Table(std::mem::take(&mut rows)));
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    // Flush whatever was open when the budget ran out, outermost run first.
    if let Some(p) = paragraph.as_mut() {
        for r in runs.drain(..) {
            push_run(p, r, &mut pending_space);
        }
    }
    if let Some(p) = paragraph.take() {
        if !p.runs.is_empty() {
            blocks.push(Block::Paragraph(p));
        }
    }
    if table_depth > 0 {
        if !cell.is_empty() {
            row.push(cell.trim().to_string());
        }
        if !row.is_empty() {
            rows.push(row);
        }
        if !rows.is_empty() {
            blocks.push(Block::Table(rows));
        }
    }

    Ok(blocks)
}

fn append(runs: &mut [Run], cell: &mut String, table_depth: usize, text: &str) {
    if table_depth > 0 {
        cell.push_str(text);
    } else if let Some(r) = runs.last_mut() {
        r.text.push_str(text);
    }
}

/// Add a finished run to `p`. Where a text-box boundary was crossed and
/// neither side has whitespace, a separating space goes in first; returns
/// whether it did.
fn push_run(p: &mut Paragraph, r: Run, pending_space: &mut bool) -> bool {
    if r.text.is_empty() {
        return false;
    }
    let mut spaced = false;
    if std::mem::take(pending_space) {
        let after_space = p.runs.last().is_none_or(|last| last.text.ends_with(char::is_whitespace));
        if !after_space && !r.text.starts_with(char::is_whitespace) {
            p.runs.push(Run {
                text: " ".to_string(),
                ..Run::default()
            });
            spaced = true;
        }
    }
    p.runs.push(r);
    spaced
}

/// HTML writer that spends a visible-character budget and, once it is gone,
/// appends [`ELLIPSIS`] and closes every open element.
struct ExcerptWriter {
    html: String,
    open: Vec<&'static str>,
    remaining: usize,
    exhausted: bool,
}

const HEADINGS: [&str; 6] = ["h1", "h2", "h3", "h4", "h5", "h6"];

impl ExcerptWriter {
    fn new(budget: usize) -> Self {
        Self {
            html: String::new(),
            open: Vec::new(),
            remaining: budget,
            exhausted: false,
        }
    }

    fn open(&mut self, tag: &'static str) {
        self.html.push('<');
        self.html.push_str(tag);
        self.html.push('>');
        self.open.push(tag);
    }

    fn close(&mut self) {
        if let Some(tag) = self.open.pop() {
            self.html.push_str("</");
            self.html.push_str(tag);
            self.html.push('>');
        }
    }

    /// Write escaped text; returns false once the budget is exhausted.
    fn text(&mut self, s: &str) -> bool {
        let len = s.chars().count();
        if len <= self.remaining {
            escape_into(&mut self.html, s);
            self.remaining -= len;
            return true;
        }
        let cut: String = s.chars().take(self.remaining).collect();
        escape_into(&mut self.html, &cut);
        self.remaining = 0;
        self.html.push_str(ELLIPSIS);
        while !self.open.is_empty() {
            self.close();
        }
        self.exhausted = true;
        false
    }

    fn finish(mut self) -> HtmlExcerpt {
        while !self.open.is_empty() {
            self.close();
        }
        HtmlExcerpt {
            html: self.html,
            truncated: self.exhausted,
        }
    }
}

fn escape_into(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
}

fn write_html(blocks: &[Block], budget: usize) -> HtmlExcerpt {
    let mut w = ExcerptWriter::new(budget);
    let mut in_list = false;

    for block in blocks {
        let is_list = matches!(block, Block::Paragraph(p) if p.kind == ParagraphKind::ListItem);
        if in_list && !is_list {
            w.close();
            in_list = false;
        }
        let ok = match block {
            Block::Paragraph(p) => {
                match p.kind {
                    ParagraphKind::Body => w.open("p"),
                    ParagraphKind::Heading(n) => w.open(HEADINGS[usize::from(n.clamp(1, 6)) - 1]),
                    ParagraphKind::ListItem => {
                        if !in_list {
                            w.open("ul");
                            in_list = true;
                        }
                        w.open("li");
                    }
                }
                let ok = write_runs(&mut w, &p.runs);
                if ok {
                    w.close();
                }
                ok
            }
            Block::Table(rows) => write_table(&mut w, rows),
        };
        if !ok {
            break;
        }
    }
    w.finish()
}

fn write_runs(w: &mut ExcerptWriter, runs: &[Run]) -> bool {
    for run in runs {
        if run.bold {
            w.open("strong");
        }
        if run.italic {
            w.open("em");
        }
        if !w.text(&run.text) {
            return false;
        }
        if run.italic {
            w.close();
        }
        if run.bold {
            w.close();
        }
    }
    true
}

fn write_table(w: &mut ExcerptWriter, rows: &[Vec<String>]) -> bool {
    w.open("table");
    for row in rows {
        w.open("tr");
        for cell in row {
            w.open("td");
            if !w.text(cell) {
                return false;
            }
            w.close();
        }
        w.close();
    }
    w.close();
    true
}
