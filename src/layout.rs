//! Page layout: header block, body text, attachment manifest.
//!
//! Pure function of (message, style, fonts) to a page sequence. All
//! positions are PDF points with the origin at the bottom-left corner of
//! an A4 page.

use std::collections::BTreeSet;

use humansize::{format_size, DECIMAL};

use crate::fonts::{FontRole, FontSet};
use crate::model::message::Message;
use crate::style::StyleConfig;

pub const A4_WIDTH_PT: f32 = 595.276;
pub const A4_HEIGHT_PT: f32 = 841.89;
pub const MM_TO_PT: f32 = 72.0 / 25.4;

/// Vertical advance per line, as a multiple of the font size.
const LINE_FACTOR: f32 = 1.4;
/// Gap between the header label column and the values.
const LABEL_GAP_PT: f32 = 8.0;

/// A positioned text fragment.
#[derive(Debug, Clone)]
pub struct PageRun {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub role: FontRole,
    pub size: f32,
}

/// A horizontal rule.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub x1: f32,
    pub x2: f32,
    pub y: f32,
}

#[derive(Debug, Default)]
pub struct Page {
    pub runs: Vec<PageRun>,
    pub rules: Vec<Rule>,
}

/// Every character the document will draw. Computed before layout so the
/// fonts can be subset and validated first.
pub fn used_characters(message: &Message) -> BTreeSet<char> {
    let mut chars = BTreeSet::new();
    for (name, value) in &message.headers {
        chars.extend(name.chars());
        chars.extend(value.chars());
    }
    chars.insert(':');
    chars.insert(' ');
    chars.extend(message.body_text.chars());
    chars.extend(manifest_title(message).chars());
    for line in manifest_entries(message) {
        chars.extend(line.chars());
    }
    chars
}

/// Lay the message out as a sequence of pages: header block with a rule
/// under it, body text, then the attachment manifest on its own page.
pub fn layout(message: &Message, style: &StyleConfig, fonts: &FontSet) -> Vec<Page> {
    let mut sheet = Sheet::new(style, fonts);

    // Header block: bold labels in a fixed column, wrapped values.
    let label_col = message
        .headers
        .iter()
        .map(|(name, _)| sheet.width_of(&format!("{name}:"), FontRole::Bold))
        .fold(0.0f32, f32::max)
        + LABEL_GAP_PT;
    for (name, value) in &message.headers {
        sheet.header_row(&format!("{name}:"), value, label_col);
    }
    if !message.headers.is_empty() {
        sheet.rule();
    }

    for line in message.body_text.lines() {
        if line.trim().is_empty() {
            sheet.blank_line();
        } else {
            sheet.paragraph(line, FontRole::Regular, sheet.margin);
        }
    }

    sheet.new_page();
    sheet.paragraph(&manifest_title(message), FontRole::Bold, sheet.margin);
    sheet.blank_line();
    for entry in manifest_entries(message) {
        sheet.paragraph(&entry, FontRole::Regular, sheet.margin);
    }

    sheet.finish()
}

fn manifest_title(message: &Message) -> String {
    format!("Attachments ({})", message.attachments.len())
}

/// Manifest lines, one per attachment. Lists every part of the message,
/// inline ones marked, whether or not it is embedded as a file.
fn manifest_entries(message: &Message) -> Vec<String> {
    if message.attachments.is_empty() {
        return vec!["(none)".to_string()];
    }
    message
        .attachments
        .iter()
        .map(|att| {
            let size = format_size(att.size(), DECIMAL);
            if att.is_inline {
                format!("{} ({}, {}, inline)", att.filename, size, att.mime_type)
            } else {
                format!("{} ({}, {})", att.filename, size, att.mime_type)
            }
        })
        .collect()
}

/// Accumulates runs page by page, breaking on vertical overflow.
struct Sheet<'a> {
    fonts: &'a FontSet,
    size: f32,
    margin: f32,
    line_height: f32,
    pages: Vec<Page>,
    current: Page,
    /// Baseline of the next line.
    y: f32,
}

impl<'a> Sheet<'a> {
    fn new(style: &StyleConfig, fonts: &'a FontSet) -> Self {
        let margin = style.margins_mm * MM_TO_PT;
        let size = style.font_size_pt;
        Self {
            fonts,
            size,
            margin,
            line_height: size * LINE_FACTOR,
            pages: Vec::new(),
            current: Page::default(),
            y: A4_HEIGHT_PT - margin - size,
        }
    }

    fn printable_width(&self) -> f32 {
        A4_WIDTH_PT - 2.0 * self.margin
    }

    fn width_of(&self, text: &str, role: FontRole) -> f32 {
        self.fonts.for_role(role).text_width(text, self.size)
    }

    fn new_page(&mut self) {
        let done = std::mem::take(&mut self.current);
        if !done.runs.is_empty() || !done.rules.is_empty() {
            self.pages.push(done);
        }
        self.y = A4_HEIGHT_PT - self.margin - self.size;
    }

    /// Move to the next line, breaking the page if the baseline would
    /// fall below the bottom margin.
    fn advance_line(&mut self) {
        self.y -= self.line_height;
        if self.y < self.margin {
            self.new_page();
        }
    }

    fn push_run(&mut self, text: &str, x: f32, role: FontRole) {
        self.current.runs.push(PageRun {
            text: text.to_string(),
            x,
            y: self.y,
            role,
            size: self.size,
        });
    }

    fn blank_line(&mut self) {
        self.advance_line();
    }

    fn rule(&mut self) {
        let y = self.y + self.size * 0.35;
        self.current.rules.push(Rule {
            x1: self.margin,
            x2: A4_WIDTH_PT - self.margin,
            y,
        });
        self.advance_line();
    }

    /// One header row: bold label at the margin, wrapped value in the
    /// value column.
    fn header_row(&mut self, label: &str, value: &str, label_col: f32) {
        self.push_run(label, self.margin, FontRole::Bold);
        let x = self.margin + label_col;
        let max = self.printable_width() - label_col;
        let font = self.fonts.for_role(FontRole::Regular);
        let size = self.size;
        for line in wrap(value, |t| font.text_width(t, size), max) {
            self.push_run(&line, x, FontRole::Regular);
            self.advance_line();
        }
    }

    /// Wrapped text starting at `x`, continuation lines at the same x.
    fn paragraph(&mut self, text: &str, role: FontRole, x: f32) {
        let max = self.printable_width() - (x - self.margin);
        let font = self.fonts.for_role(role);
        let size = self.size;
        for line in wrap(text, |t| font.text_width(t, size), max) {
            self.push_run(&line, x, role);
            self.advance_line();
        }
    }

    fn finish(mut self) -> Vec<Page> {
        if !self.current.runs.is_empty() || !self.current.rules.is_empty() {
            self.pages.push(self.current);
        }
        self.pages
    }
}

/// Greedy word wrap against a width function. A single token wider than
/// `max` is hard-split at the last character boundary that fits; nothing
/// is ever dropped.
fn wrap(text: &str, width: impl Fn(&str) -> f32, max: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();

    for word in text.split_whitespace() {
        let candidate = if line.is_empty() {
            word.to_string()
        } else {
            format!("{line} {word}")
        };
        if width(&candidate) <= max {
            line = candidate;
            continue;
        }
        if !line.is_empty() {
            lines.push(std::mem::take(&mut line));
        }
        // Word alone may still be too wide
        let mut rest = word;
        while width(rest) > max && rest.chars().count() > 1 {
            let split = fitting_prefix(rest, &width, max);
            lines.push(rest[..split].to_string());
            rest = &rest[split..];
        }
        line = rest.to_string();
    }
    if !line.is_empty() || text.trim().is_empty() {
        lines.push(line);
    }
    lines
}

/// Byte length of the longest prefix of `word` not exceeding `max`.
/// Always at least one character, so splitting makes progress.
fn fitting_prefix(word: &str, width: &impl Fn(&str) -> f32, max: f32) -> usize {
    let mut end = 0;
    for (idx, c) in word.char_indices() {
        let next = idx + c.len_utf8();
        if end > 0 && width(&word[..next]) > max {
            break;
        }
        end = next;
    }
    end
}
