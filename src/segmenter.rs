//! Structural segmenter.
//!
//! Translates only free text. Inline tags (`<b>`, `</font>`) and bracket
//! placeholders (`[ICON]`) pass through verbatim, whitespace around each free
//! text run is kept as-is, and a single-line segment may never come back as
//! several lines. Batch payloads are split into items on runs of three or
//! more newlines and recomposed with the exact original separators.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::backend::{TranslateCall, TranslationBackend};
use crate::error::BackendError;
use crate::metrics::EngineMetrics;

static TAG_REGEX: OnceLock<Regex> = OnceLock::new();
static BRACKET_REGEX: OnceLock<Regex> = OnceLock::new();
static ITEM_SEPARATOR_REGEX: OnceLock<Regex> = OnceLock::new();

/// Literal line-break marker used inside batch items.
pub const LINE_MARKER: &str = "<L_F>";

fn tag_regex() -> &'static Regex {
    TAG_REGEX.get_or_init(|| Regex::new(r"<[^>]+>").unwrap())
}

fn bracket_regex() -> &'static Regex {
    BRACKET_REGEX.get_or_init(|| Regex::new(r"\[[^\]]+\]").unwrap())
}

/// A piece of one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Tag or bracket placeholder, never translated
    Markup(&'a str),
    Text(&'a str),
}

impl<'a> Segment<'a> {
    pub fn as_str(&self) -> &'a str {
        match self {
            Segment::Markup(s) | Segment::Text(s) => s,
        }
    }
}

/// Split `text` on every match of `re`, keeping matches as markup.
fn split_keeping<'a>(text: &'a str, re: &Regex, out: &mut Vec<Segment<'a>>, inner: Option<&Regex>) {
    let mut last = 0;
    for m in re.find_iter(text) {
        push_text(&text[last..m.start()], out, inner);
        out.push(Segment::Markup(m.as_str()));
        last = m.end();
    }
    push_text(&text[last..], out, inner);
}

fn push_text<'a>(text: &'a str, out: &mut Vec<Segment<'a>>, inner: Option<&Regex>) {
    if text.is_empty() {
        return;
    }
    match inner {
        Some(re) => split_keeping(text, re, out, None),
        None => out.push(Segment::Text(text)),
    }
}

/// Split one line on tags first, then on bracket placeholders. Concatenating
/// the segments gives the line back.
pub fn split_markup(line: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    split_keeping(line, tag_regex(), &mut out, Some(bracket_regex()));
    out
}

/// Split a segment into (leading whitespace, core, trailing whitespace).
fn separate_whitespace(segment: &str) -> (&str, &str, &str) {
    let core_start = segment.len() - segment.trim_start().len();
    let core_end = segment.trim_end().len().max(core_start);
    (
        &segment[..core_start],
        &segment[core_start..core_end],
        &segment[core_end..],
    )
}

/// Per-request memo of translated lines and segments.
#[derive(Debug, Default, Clone)]
pub struct SegmentMemo {
    lines: HashMap<String, String>,
    segments: HashMap<String, String>,
}

impl SegmentMemo {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Translate a single free-text core. Multi-line or empty output is an error.
async fn translate_core(
    core: &str,
    template: &TranslateCall,
    backend: &dyn TranslationBackend,
) -> Result<String, BackendError> {
    let raw = backend.translate(&template.with_text(core)).await?;
    let out = raw.replace("\r\n", "\n");
    let out = out.trim();
    if out.contains('\n') {
        return Err(BackendError::MultiLine(out.lines().count()));
    }
    if out.is_empty() {
        return Err(BackendError::Empty("segment"));
    }
    Ok(out.to_string())
}

async fn translate_text_segment(
    segment: &str,
    template: &TranslateCall,
    backend: &dyn TranslationBackend,
    memo: &mut SegmentMemo,
) -> String {
    if let Some(hit) = memo.segments.get(segment) {
        return hit.clone();
    }

    let (leading, core, trailing) = separate_whitespace(segment);
    let rebuilt = if core.is_empty() {
        segment.to_string()
    } else {
        match translate_core(core, template, backend).await {
            Ok(translated) => format!("{}{}{}", leading, translated, trailing),
            Err(e) => {
                if matches!(e, BackendError::MultiLine(_) | BackendError::Empty(_)) {
                    EngineMetrics::global().record_rejected_segment();
                    debug!(error = %e, "Segment output rejected, keeping original");
                } else {
                    warn!(error = %e, "Segment translation failed, keeping original");
                }
                segment.to_string()
            }
        }
    };

    memo.segments.insert(segment.to_string(), rebuilt.clone());
    rebuilt
}

/// Translate every free-text segment of one line.
pub async fn translate_line_preserving_markers(
    line: &str,
    template: &TranslateCall,
    backend: &dyn TranslationBackend,
    memo: &mut SegmentMemo,
) -> String {
    let mut out = String::with_capacity(line.len());
    for segment in split_markup(line) {
        match segment {
            Segment::Markup(markup) => out.push_str(markup),
            Segment::Text(text) => {
                out.push_str(&translate_text_segment(text, template, backend, memo).await)
            }
        }
    }
    out
}

/// Translate `text` line by line, keeping every line break, blank line and
/// markup run. Calls are sequential and share `memo`.
pub async fn translate_text_preserving_structure(
    text: &str,
    template: &TranslateCall,
    backend: &dyn TranslationBackend,
    memo: &mut SegmentMemo,
) -> String {
    let normalized = text.replace("\r\n", "\n");
    let mut outputs: Vec<String> = Vec::new();

    for line in normalized.split('\n') {
        if let Some(hit) = memo.lines.get(line) {
            outputs.push(hit.clone());
            continue;
        }
        let translated = if line.trim().is_empty() {
            line.to_string()
        } else {
            translate_line_preserving_markers(line, template, backend, memo).await
        };
        memo.lines.insert(line.to_string(), translated.clone());
        outputs.push(translated);
    }

    outputs.join("\n")
}

// ==================== Batch items ====================

/// A batch payload split into items and the separator runs between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchLayout {
    pub items: Vec<String>,
    /// `separators[i]` sits between `items[i]` and `items[i + 1]`.
    pub separators: Vec<String>,
}

impl BatchLayout {
    /// Split on runs of three or more newlines.
    pub fn split(payload: &str) -> Self {
        let separator = ITEM_SEPARATOR_REGEX.get_or_init(|| Regex::new(r"\n{3,}").unwrap());
        let mut items = Vec::new();
        let mut separators = Vec::new();
        let mut last = 0;
        for m in separator.find_iter(payload) {
            items.push(payload[last..m.start()].to_string());
            separators.push(m.as_str().to_string());
            last = m.end();
        }
        items.push(payload[last..].to_string());
        Self { items, separators }
    }

    /// Interleave `items` with the original separators. Missing items are
    /// taken from the layout; extra items are ignored.
    pub fn compose(&self, items: &[String]) -> String {
        let mut out = String::new();
        for (idx, original) in self.items.iter().enumerate() {
            out.push_str(items.get(idx).unwrap_or(original));
            if let Some(sep) = self.separators.get(idx) {
                out.push_str(sep);
            }
        }
        out
    }
}

/// A batch item with its line-break markers decoded.
///
/// Each break remembers whether it arrived as `<L_F>` or as a real newline,
/// so an item mixing both comes back byte for byte when its line count is
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkedLines {
    pub text: String,
    /// `true` where the break was a marker, in order of appearance.
    breaks: Vec<bool>,
}

impl MarkedLines {
    pub fn decode(item: &str) -> Self {
        let mut text = String::with_capacity(item.len());
        let mut breaks = Vec::new();
        let mut rest = item;
        loop {
            let (idx, len, marker) = match (rest.find('\n'), rest.find(LINE_MARKER)) {
                (Some(nl), Some(mk)) if mk < nl => (mk, LINE_MARKER.len(), true),
                (Some(nl), _) => (nl, 1, false),
                (None, Some(mk)) => (mk, LINE_MARKER.len(), true),
                (None, None) => break,
            };
            text.push_str(&rest[..idx]);
            text.push('\n');
            breaks.push(marker);
            rest = &rest[idx + len..];
        }
        text.push_str(rest);
        Self { text, breaks }
    }

    pub fn uses_markers(&self) -> bool {
        self.breaks.iter().any(|&marker| marker)
    }

    /// Re-encode the breaks of `translated`. With the original break count
    /// each break keeps its original form; otherwise every break becomes a
    /// marker when the item used any.
    pub fn encode(&self, translated: &str) -> String {
        if !self.uses_markers() {
            return translated.to_string();
        }
        if translated.matches('\n').count() != self.breaks.len() {
            return translated.replace('\n', LINE_MARKER);
        }

        let mut out = String::with_capacity(translated.len() + self.breaks.len() * LINE_MARKER.len());
        let mut kinds = self.breaks.iter();
        for (idx, line) in translated.split('\n').enumerate() {
            if idx > 0 {
                let marker = kinds.next().copied().unwrap_or(true);
                out.push_str(if marker { LINE_MARKER } else { "\n" });
            }
            out.push_str(line);
        }
        out
    }
}

/// Line count and blank-line mask of a text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineShape {
    pub blank: Vec<bool>,
}

impl LineShape {
    pub fn of(text: &str) -> Self {
        Self {
            blank: text
                .replace("\r\n", "\n")
                .split('\n')
                .map(|l| l.trim().is_empty())
                .collect(),
        }
    }

    pub fn line_count(&self) -> usize {
        self.blank.len()
    }
}

/// True when both texts have the same number of lines and the same blank
/// lines.
pub fn same_structure(a: &str, b: &str) -> bool {
    LineShape::of(a) == LineShape::of(b)
}
