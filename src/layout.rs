//! Layout engine: converts blocks into wrapped line sets and vertical
//! extents without touching pixels. The draw pass consumes the exact
//! structures produced here, so measured heights and drawn heights agree
//! by construction.

use crate::font::{FontQuery, FontRegistry};
use crate::markdown::Block;
use crate::style::StyleDescriptor;
use crate::types::Px;

pub(crate) const TITLE_SCALE: f32 = 1.5;
// One canonical title spacing, applied identically by the measurement
// pass and the draw pass.
pub(crate) const TITLE_SPACING_FACTOR: f32 = 1.0;
pub(crate) const BLOCK_SPACING_FACTOR: f32 = 0.5;
pub(crate) const WATERMARK_SCALE: f32 = 0.7;
pub(crate) const WATERMARK_SPACING_FACTOR: f32 = 1.5;

pub(crate) const BULLET_COLUMN_WIDTH: f32 = 20.0;
pub(crate) const QUOTE_WRAP_INDENT: f32 = 20.0;
pub(crate) const QUOTE_TEXT_INSET: f32 = 15.0;
pub(crate) const QUOTE_BAR_WIDTH: f32 = 4.0;
pub(crate) const CODE_VERTICAL_PADDING: f32 = 20.0;
pub(crate) const CODE_TEXT_INSET: f32 = 10.0;
pub(crate) const CODE_FONT_FAMILIES: &str = "Monaco, monospace";
pub(crate) const CODE_FONT_SCALE: f32 = 0.9;
pub(crate) const RULE_EXTENT: f32 = 20.0;
pub(crate) const RULE_OFFSET: f32 = 10.0;
pub(crate) const RULE_STROKE_WIDTH: f32 = 2.0;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum BlockLayout {
    Heading {
        lines: Vec<String>,
        font_size: Px,
    },
    Paragraph {
        lines: Vec<String>,
    },
    List {
        items: Vec<Vec<String>>,
        ordered: bool,
    },
    Code {
        lines: Vec<String>,
    },
    Blockquote {
        lines: Vec<String>,
    },
    Table {
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
        column_width: Px,
    },
    Rule,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LaidBlock {
    pub kind: BlockLayout,
    pub extent: Px,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TitleLayout {
    pub lines: Vec<String>,
    pub font_size: Px,
    pub extent: Px,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DocumentLayout {
    pub title: Option<TitleLayout>,
    pub blocks: Vec<LaidBlock>,
}

/// Greedy word wrap. Words accumulate into a line while the candidate
/// (current + space + word) still fits; a word wider than `max_width`
/// is placed alone on its own line, never broken or truncated.
pub(crate) fn wrap_text(
    fonts: &FontRegistry,
    query: &FontQuery,
    font_size: Px,
    max_width: Px,
    text: &str,
) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };
        if !current.is_empty() && fonts.measure_text_width(query, font_size, &candidate) > max_width
        {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        } else {
            current = candidate;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

pub(crate) fn heading_font_size(style: &StyleDescriptor, level: u8) -> Px {
    let scale = (2.0 - 0.2 * level as f32).max(0.0);
    Px::from_f32(style.font_size * scale)
}

pub(crate) fn body_query(style: &StyleDescriptor) -> FontQuery {
    FontQuery::from_family_list(&style.font_family)
}

pub(crate) fn code_query() -> FontQuery {
    FontQuery::from_family_list(CODE_FONT_FAMILIES)
}

fn line_height(style: &StyleDescriptor, font_size: Px) -> Px {
    font_size * style.line_height
}

pub(crate) fn layout_block(
    fonts: &FontRegistry,
    style: &StyleDescriptor,
    max_width: Px,
    block: &Block,
) -> LaidBlock {
    let base_size = Px::from_f32(style.font_size);
    match block {
        Block::Heading { text, level } => {
            let font_size = heading_font_size(style, *level);
            let query = body_query(style).bold();
            let lines = wrap_text(fonts, &query, font_size, max_width, text);
            let extent = line_height(style, font_size) * (lines.len() as i32);
            LaidBlock {
                kind: BlockLayout::Heading { lines, font_size },
                extent,
            }
        }
        Block::Paragraph { text } => {
            let query = body_query(style);
            let lines = wrap_text(fonts, &query, base_size, max_width, text);
            let extent = line_height(style, base_size) * (lines.len() as i32);
            LaidBlock {
                kind: BlockLayout::Paragraph { lines },
                extent,
            }
        }
        Block::List { items } => layout_list(fonts, style, max_width, items, false),
        Block::OrderedList { items } => layout_list(fonts, style, max_width, items, true),
        Block::Code { text, .. } => {
            let lines: Vec<String> = text.split('\n').map(|line| line.to_string()).collect();
            let extent = line_height(style, base_size) * (lines.len() as i32)
                + Px::from_f32(CODE_VERTICAL_PADDING);
            LaidBlock {
                kind: BlockLayout::Code { lines },
                extent,
            }
        }
        Block::Blockquote { text } => {
            let query = body_query(style).italic();
            let wrap_width = max_width - Px::from_f32(QUOTE_WRAP_INDENT);
            let lines = wrap_text(fonts, &query, base_size, wrap_width, text);
            let extent = line_height(style, base_size) * (lines.len() as i32);
            LaidBlock {
                kind: BlockLayout::Blockquote { lines },
                extent,
            }
        }
        Block::Table { headers, rows } => {
            if headers.is_empty() || rows.is_empty() {
                return LaidBlock {
                    kind: BlockLayout::Table {
                        headers: Vec::new(),
                        rows: Vec::new(),
                        column_width: Px::ZERO,
                    },
                    extent: Px::ZERO,
                };
            }
            let column_width = max_width / (headers.len() as i32);
            let extent = line_height(style, base_size) * ((1 + rows.len()) as i32);
            LaidBlock {
                kind: BlockLayout::Table {
                    headers: headers.clone(),
                    rows: rows.clone(),
                    column_width,
                },
                extent,
            }
        }
        Block::Rule => LaidBlock {
            kind: BlockLayout::Rule,
            extent: Px::from_f32(RULE_EXTENT),
        },
    }
}

fn layout_list(
    fonts: &FontRegistry,
    style: &StyleDescriptor,
    max_width: Px,
    items: &[String],
    ordered: bool,
) -> LaidBlock {
    let base_size = Px::from_f32(style.font_size);
    let query = body_query(style);
    let item_width = max_width - Px::from_f32(BULLET_COLUMN_WIDTH);
    let mut wrapped = Vec::with_capacity(items.len());
    let mut line_count = 0i32;
    for item in items {
        let lines = wrap_text(fonts, &query, base_size, item_width, item);
        line_count += lines.len() as i32;
        wrapped.push(lines);
    }
    let extent = line_height(style, base_size) * line_count;
    LaidBlock {
        kind: BlockLayout::List {
            items: wrapped,
            ordered,
        },
        extent,
    }
}

pub(crate) fn layout_document(
    fonts: &FontRegistry,
    style: &StyleDescriptor,
    width: Px,
    title: Option<&str>,
    content: &[Block],
) -> DocumentLayout {
    let max_width = width - Px::from_f32(style.padding) * 2;
    let title = title.map(|text| {
        let font_size = Px::from_f32(style.font_size * TITLE_SCALE);
        let query = body_query(style).bold();
        let lines = wrap_text(fonts, &query, font_size, max_width, text);
        let extent = line_height(style, font_size) * (lines.len() as i32);
        TitleLayout {
            lines,
            font_size,
            extent,
        }
    });
    let blocks = content
        .iter()
        .map(|block| layout_block(fonts, style, max_width, block))
        .collect();
    DocumentLayout { title, blocks }
}

/// Total content height for a laid-out document: top padding, title
/// extent plus its spacing, every block extent plus inter-block spacing,
/// watermark clearance, bottom padding.
pub(crate) fn content_height(
    layout: &DocumentLayout,
    style: &StyleDescriptor,
    has_watermark: bool,
) -> Px {
    let base_size = Px::from_f32(style.font_size);
    let padding = Px::from_f32(style.padding);
    let mut total = padding;
    if let Some(title) = &layout.title {
        total += title.extent;
        total += base_size * TITLE_SPACING_FACTOR;
    }
    for block in &layout.blocks {
        total += block.extent;
        total += base_size * BLOCK_SPACING_FACTOR;
    }
    if has_watermark {
        total += base_size * WATERMARK_SPACING_FACTOR;
    }
    total + padding
}

pub(crate) fn auto_height(
    layout: &DocumentLayout,
    style: &StyleDescriptor,
    has_watermark: bool,
    min_height: u32,
    max_height: u32,
) -> u32 {
    let total = content_height(layout, style, has_watermark);
    total.ceil_to_u32().clamp(min_height, max_height)
}
