//! Render engine: validates a request, lays out the document, fixes the
//! canvas height, and replays the layout as draw commands. Every extent
//! the draw pass advances by comes from the layout pass, so auto-sized
//! cards never overflow and never leave unexpected blank space.

use crate::canvas::Canvas;
use crate::error::ShowCardError;
use crate::font::FontRegistry;
use crate::layout::{
    self, BLOCK_SPACING_FACTOR, BULLET_COLUMN_WIDTH, CODE_FONT_SCALE, CODE_TEXT_INSET,
    BlockLayout, DocumentLayout, QUOTE_BAR_WIDTH, QUOTE_TEXT_INSET, RULE_OFFSET,
    RULE_STROKE_WIDTH, TITLE_SPACING_FACTOR, WATERMARK_SCALE,
};
use crate::markdown::Block;
use crate::raster;
use crate::style::{self, GradientDirection, StyleDescriptor};
use crate::types::{Px, Rect};

const CODE_TINT_ALPHA: f32 = 0.1;
const ZEBRA_ALPHA: f32 = 0.05;
const WATERMARK_ALPHA: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    /// Accepts the usual aliases; "jpg" and "jpeg" are the same format.
    pub fn from_name(name: &str) -> Option<ImageFormat> {
        match name.to_ascii_lowercase().as_str() {
            "png" => Some(ImageFormat::Png),
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }
}

/// One render request. Constructed per call, fully consumed by a single
/// render, never shared across requests.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub style: StyleDescriptor,
    pub content: Vec<Block>,
    pub title: Option<String>,
    pub watermark: Option<String>,
    pub format: ImageFormat,
    pub quality: u8,
    pub auto_height: bool,
    pub min_height: u32,
    pub max_height: u32,
}

pub(crate) fn render(
    fonts: &FontRegistry,
    config: &RenderConfig,
) -> Result<Vec<u8>, ShowCardError> {
    validate(config)?;

    let layout = layout::layout_document(
        fonts,
        &config.style,
        Px::from_u32(config.width),
        config.title.as_deref(),
        &config.content,
    );
    let height = if config.auto_height {
        layout::auto_height(
            &layout,
            &config.style,
            config.watermark.is_some(),
            config.min_height,
            config.max_height,
        )
    } else {
        config.height
    };

    let commands = draw_document(fonts, config, &layout, height);
    let pixmap = raster::render_to_pixmap(config.width, height, &commands, fonts)?;
    raster::encode_pixmap(&pixmap, config.format, config.quality)
}

fn validate(config: &RenderConfig) -> Result<(), ShowCardError> {
    if config.width == 0 {
        return Err(ShowCardError::InvalidDimensions(
            "width must be greater than zero".to_string(),
        ));
    }
    if config.auto_height {
        if config.min_height > config.max_height {
            return Err(ShowCardError::InvalidDimensions(format!(
                "min_height {} exceeds max_height {}",
                config.min_height, config.max_height
            )));
        }
    } else if config.height == 0 {
        return Err(ShowCardError::InvalidDimensions(
            "height must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn draw_document(
    fonts: &FontRegistry,
    config: &RenderConfig,
    layout: &DocumentLayout,
    height: u32,
) -> Vec<crate::canvas::Command> {
    let style = &config.style;
    let mut canvas = Canvas::new();

    let width_px = Px::from_u32(config.width);
    let height_px = Px::from_u32(height);
    let padding = Px::from_f32(style.padding);
    let base_size = Px::from_f32(style.font_size);
    let max_width = width_px - padding * 2;
    let full = Rect {
        x: Px::ZERO,
        y: Px::ZERO,
        width: width_px,
        height: height_px,
    };

    let (background, _) = style::paint_color(&style.background_color);
    let (text_color, _) = style::paint_color(&style.text_color);
    let (header_color, _) = style::paint_color(&style.header_color);
    let (accent_color, _) = style::paint_color(&style.accent_color);

    match &style.gradient {
        Some(gradient) => {
            let (start, _) = style::paint_color(&gradient.start);
            let (end, _) = style::paint_color(&gradient.end);
            let (from, to) = match gradient.direction {
                GradientDirection::Horizontal => ((Px::ZERO, Px::ZERO), (width_px, Px::ZERO)),
                GradientDirection::Vertical => ((Px::ZERO, Px::ZERO), (Px::ZERO, height_px)),
                GradientDirection::Diagonal => ((Px::ZERO, Px::ZERO), (width_px, height_px)),
            };
            canvas.fill_linear_gradient(full, from, to, start, end);
        }
        None => {
            canvas.set_fill_color(background);
            canvas.fill_rect(full);
        }
    }

    if style.border_radius > 0.0 {
        canvas.clip_rounded_rect(full, Px::from_f32(style.border_radius));
    }

    let body = layout::body_query(style);
    let bold = body.clone().bold();
    let italic = body.clone().italic();

    let mut cursor = padding;

    if let Some(title) = &layout.title {
        canvas.set_font(&bold, title.font_size);
        canvas.set_fill_color(header_color);
        let mut baseline = cursor + title.font_size;
        for line in &title.lines {
            let line_width = fonts.measure_text_width(&bold, title.font_size, line);
            let x = (width_px - line_width) / 2;
            canvas.draw_string(x, baseline, line.clone());
            baseline += title.font_size * style.line_height;
        }
        cursor += title.extent;
        cursor += base_size * TITLE_SPACING_FACTOR;
    }

    for block in &layout.blocks {
        match &block.kind {
            BlockLayout::Heading { lines, font_size } => {
                canvas.set_font(&bold, *font_size);
                canvas.set_fill_color(header_color);
                let mut baseline = cursor + *font_size;
                for line in lines {
                    canvas.draw_string(padding, baseline, line.clone());
                    baseline += *font_size * style.line_height;
                }
            }
            BlockLayout::Paragraph { lines } => {
                canvas.set_font(&body, base_size);
                canvas.set_fill_color(text_color);
                let mut baseline = cursor + base_size;
                for line in lines {
                    canvas.draw_string(padding, baseline, line.clone());
                    baseline += base_size * style.line_height;
                }
            }
            BlockLayout::List { items, ordered } => {
                canvas.set_font(&body, base_size);
                canvas.set_fill_color(text_color);
                let mut baseline = cursor + base_size;
                let item_x = padding + Px::from_f32(BULLET_COLUMN_WIDTH);
                for (index, lines) in items.iter().enumerate() {
                    let bullet = if *ordered {
                        format!("{}.", index + 1)
                    } else {
                        "\u{2022}".to_string()
                    };
                    canvas.draw_string(padding, baseline, bullet);
                    for line in lines {
                        canvas.draw_string(item_x, baseline, line.clone());
                        baseline += base_size * style.line_height;
                    }
                }
            }
            BlockLayout::Code { lines } => {
                canvas.save_state();
                canvas.set_opacity(CODE_TINT_ALPHA);
                canvas.set_fill_color(accent_color);
                canvas.fill_rect(Rect {
                    x: padding,
                    y: cursor,
                    width: max_width,
                    height: block.extent,
                });
                canvas.restore_state();

                canvas.set_font(&layout::code_query(), base_size * CODE_FONT_SCALE);
                canvas.set_fill_color(text_color);
                let code_x = padding + Px::from_f32(CODE_TEXT_INSET);
                let mut baseline = cursor + base_size;
                for line in lines {
                    canvas.draw_string(code_x, baseline, line.clone());
                    baseline += base_size * style.line_height;
                }
            }
            BlockLayout::Blockquote { lines } => {
                canvas.set_fill_color(accent_color);
                canvas.fill_rect(Rect {
                    x: padding,
                    y: cursor,
                    width: Px::from_f32(QUOTE_BAR_WIDTH),
                    height: block.extent,
                });

                canvas.set_font(&italic, base_size);
                canvas.set_fill_color(text_color);
                let quote_x = padding + Px::from_f32(QUOTE_TEXT_INSET);
                let mut baseline = cursor + base_size;
                for line in lines {
                    canvas.draw_string(quote_x, baseline, line.clone());
                    baseline += base_size * style.line_height;
                }
            }
            BlockLayout::Table {
                headers,
                rows,
                column_width,
            } => {
                // Empty tables draw nothing; the cursor still advances
                // below so both passes stay in step.
                if !headers.is_empty() && !rows.is_empty() {
                    let row_height = base_size * style.line_height;
                    let mut row_y = cursor;

                    canvas.set_font(&bold, base_size);
                    canvas.set_fill_color(header_color);
                    for (index, header) in headers.iter().enumerate() {
                        let cell_width = fonts.measure_text_width(&bold, base_size, header);
                        let x = padding + *column_width * (index as i32)
                            + (*column_width - cell_width) / 2;
                        canvas.draw_string(x, row_y + base_size, header.clone());
                    }
                    row_y += row_height;

                    canvas.set_font(&body, base_size);
                    for (row_index, row) in rows.iter().enumerate() {
                        if row_index % 2 == 0 {
                            canvas.save_state();
                            canvas.set_opacity(ZEBRA_ALPHA);
                            canvas.set_fill_color(accent_color);
                            canvas.fill_rect(Rect {
                                x: padding,
                                y: row_y,
                                width: max_width,
                                height: row_height,
                            });
                            canvas.restore_state();
                        }
                        canvas.set_fill_color(text_color);
                        for (col_index, cell) in row.iter().enumerate() {
                            let x = padding + *column_width * (col_index as i32);
                            canvas.draw_string(x, row_y + base_size, cell.clone());
                        }
                        row_y += row_height;
                    }
                }
            }
            BlockLayout::Rule => {
                let y = cursor + Px::from_f32(RULE_OFFSET);
                canvas.set_stroke_color(accent_color);
                canvas.stroke_line(
                    (padding, y),
                    (padding + max_width, y),
                    Px::from_f32(RULE_STROKE_WIDTH),
                );
            }
        }
        cursor += block.extent;
        cursor += base_size * BLOCK_SPACING_FACTOR;
    }

    if let Some(watermark) = &config.watermark {
        let mark_size = base_size * WATERMARK_SCALE;
        canvas.save_state();
        canvas.set_font(&body, mark_size);
        canvas.set_opacity(WATERMARK_ALPHA);
        canvas.set_fill_color(text_color);
        let mark_width = fonts.measure_text_width(&body, mark_size, watermark);
        canvas.draw_string(
            width_px - padding - mark_width,
            height_px - padding,
            watermark.clone(),
        );
        canvas.restore_state();
    }

    canvas.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markdown::normalize;
    use crate::style::style_by_id;

    fn test_config(content: &str) -> RenderConfig {
        RenderConfig {
            width: 400,
            height: 500,
            style: style_by_id("minimal-gray").unwrap().clone(),
            content: normalize(content),
            title: None,
            watermark: None,
            format: ImageFormat::Png,
            quality: 90,
            auto_height: false,
            min_height: 400,
            max_height: 5000,
        }
    }

    #[test]
    fn format_names_accept_jpg_alias() {
        assert_eq!(ImageFormat::from_name("png"), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::from_name("jpg"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_name("JPEG"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_name("webp"), None);
    }

    #[test]
    fn explicit_dimensions_are_respected_exactly() {
        let fonts = FontRegistry::new(true);
        let mut config = test_config("# Hello\n\nsome text");
        config.width = 800;
        config.height = 1000;
        let bytes = render(&fonts, &config).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded.width(), 800);
        assert_eq!(decoded.height(), 1000);
    }

    #[test]
    fn zero_width_is_rejected() {
        let fonts = FontRegistry::new(true);
        let mut config = test_config("text");
        config.width = 0;
        let err = render(&fonts, &config).unwrap_err();
        assert!(matches!(err, ShowCardError::InvalidDimensions(_)));
    }

    #[test]
    fn zero_height_is_rejected_without_auto_height() {
        let fonts = FontRegistry::new(true);
        let mut config = test_config("text");
        config.height = 0;
        let err = render(&fonts, &config).unwrap_err();
        assert!(matches!(err, ShowCardError::InvalidDimensions(_)));
    }

    #[test]
    fn inverted_height_bounds_are_rejected() {
        let fonts = FontRegistry::new(true);
        let mut config = test_config("text");
        config.auto_height = true;
        config.min_height = 900;
        config.max_height = 500;
        let err = render(&fonts, &config).unwrap_err();
        assert!(matches!(err, ShowCardError::InvalidDimensions(_)));
    }

    #[test]
    fn auto_height_output_stays_within_bounds() {
        let fonts = FontRegistry::new(true);
        let mut config = test_config("short");
        config.auto_height = true;
        config.min_height = 450;
        config.max_height = 600;
        let bytes = render(&fonts, &config).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded.height(), 450);

        let long = "paragraph with plenty of words to occupy vertical space\n\n".repeat(60);
        let mut config = test_config(&long);
        config.auto_height = true;
        config.min_height = 450;
        config.max_height = 600;
        let bytes = render(&fonts, &config).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded.height(), 600);
    }

    #[test]
    fn auto_height_grows_with_title_and_watermark() {
        let fonts = FontRegistry::new(true);
        let mut plain = test_config("body");
        plain.auto_height = true;
        plain.min_height = 1;
        plain.max_height = 10_000;
        let plain_height = image::load_from_memory(&render(&fonts, &plain).unwrap())
            .unwrap()
            .to_rgba8()
            .height();

        let mut titled = plain.clone();
        titled.title = Some("A Card Title".to_string());
        titled.watermark = Some("@showcard".to_string());
        let titled_height = image::load_from_memory(&render(&fonts, &titled).unwrap())
            .unwrap()
            .to_rgba8()
            .height();
        assert!(titled_height > plain_height);
    }

    #[test]
    fn empty_table_draws_nothing_and_occupies_nothing() {
        let fonts = FontRegistry::new(true);
        let mut with_empty = test_config("before");
        with_empty.content.push(crate::markdown::Block::Table {
            headers: Vec::new(),
            rows: Vec::new(),
        });
        with_empty.auto_height = true;
        with_empty.min_height = 1;
        with_empty.max_height = 10_000;

        let mut without = test_config("before");
        without.auto_height = true;
        without.min_height = 1;
        without.max_height = 10_000;

        let with_height = image::load_from_memory(&render(&fonts, &with_empty).unwrap())
            .unwrap()
            .to_rgba8()
            .height();
        let without_height = image::load_from_memory(&render(&fonts, &without).unwrap())
            .unwrap()
            .to_rgba8()
            .height();
        // The empty table still costs one inter-block spacing, nothing more.
        let spacing = (Px::from_f32(with_empty.style.font_size) * BLOCK_SPACING_FACTOR)
            .ceil_to_u32();
        assert!(with_height - without_height <= spacing + 1);
    }

    #[test]
    fn jpeg_output_is_produced_for_jpg_requests() {
        let fonts = FontRegistry::new(true);
        let mut config = test_config("# JPEG card");
        config.format = ImageFormat::Jpeg;
        config.quality = 70;
        let bytes = render(&fonts, &config).unwrap();
        assert_eq!(&bytes[0..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded.width(), 400);
        assert_eq!(decoded.height(), 500);
    }

    #[test]
    fn gradient_background_reaches_both_ends() {
        let fonts = FontRegistry::new(true);
        // dreamy-gradient runs diagonally from #FF6B6B to #4ECDC4.
        let mut config = test_config("");
        config.style = style_by_id("dreamy-gradient").unwrap().clone();
        config.style.border_radius = 0.0;
        config.width = 100;
        config.height = 100;
        let bytes = render(&fonts, &config).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        let top_left = decoded.get_pixel(1, 1);
        let bottom_right = decoded.get_pixel(98, 98);
        assert!(top_left[0] > 200, "top-left should be reddish: {top_left:?}");
        assert!(
            bottom_right[1] > 150 && bottom_right[0] < 120,
            "bottom-right should be teal: {bottom_right:?}"
        );
    }

    #[test]
    fn rounded_corners_stay_clear_of_content_paint() {
        let fonts = FontRegistry::new(true);
        let mut config = test_config("# Corner check\n\nbody text");
        config.style = style_by_id("warm-soft").unwrap().clone();
        config.width = 200;
        config.height = 200;
        let bytes = render(&fonts, &config).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        // Background is painted before the clip, so corners carry the
        // background; the clip only bounds later content paint.
        let corner = decoded.get_pixel(0, 0);
        assert_eq!(corner[3], 255);
    }
}
