use crate::canvas::Command;
use crate::error::ShowCardError;
use crate::font::{FontQuery, FontRegistry, detect_direction};
use crate::render::ImageFormat;
use crate::types::{Color, Px};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use rustybuzz::{Face as HbFace, UnicodeBuffer};
use tiny_skia::{
    FillRule, GradientStop, LinearGradient, Mask, Paint, Path, PathBuilder, Pixmap, Point, Rect,
    Shader, SpreadMode, Stroke, Transform,
};
use ttf_parser::{GlyphId, OutlineBuilder};

// Circle-to-cubic approximation constant for rounded corners.
const KAPPA: f32 = 0.552_284_8;

#[derive(Clone)]
struct RasterState {
    fill_color: Color,
    stroke_color: Color,
    fill_opacity: f32,
    font: Option<(FontQuery, Px)>,
    clip_mask: Option<Mask>,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            fill_color: Color::BLACK,
            stroke_color: Color::BLACK,
            fill_opacity: 1.0,
            font: None,
            clip_mask: None,
        }
    }
}

/// Executes a recorded command list on a fresh pixmap. The pixmap starts
/// fully transparent; the command list is expected to paint its own
/// background first.
pub(crate) fn render_to_pixmap(
    width: u32,
    height: u32,
    commands: &[Command],
    fonts: &FontRegistry,
) -> Result<Pixmap, ShowCardError> {
    let mut pixmap = Pixmap::new(width, height).ok_or_else(|| {
        ShowCardError::InvalidDimensions(format!("invalid raster size {width}x{height}"))
    })?;

    let mut state = RasterState::default();
    let mut stack: Vec<RasterState> = Vec::new();

    for cmd in commands {
        match cmd {
            Command::SaveState => stack.push(state.clone()),
            Command::RestoreState => {
                if let Some(restored) = stack.pop() {
                    state = restored;
                }
            }
            Command::SetFillColor(color) => state.fill_color = *color,
            Command::SetStrokeColor(color) => state.stroke_color = *color,
            Command::SetOpacity { fill } => state.fill_opacity = fill.clamp(0.0, 1.0),
            Command::SetFont { query, size } => state.font = Some((query.clone(), *size)),
            Command::ClipRoundedRect { rect, radius } => {
                let path = rounded_rect_path(
                    rect.x.to_f32(),
                    rect.y.to_f32(),
                    rect.width.to_f32(),
                    rect.height.to_f32(),
                    radius.to_f32(),
                );
                if let Some(path) = path {
                    apply_clip_path(&mut state, &path, pixmap.width(), pixmap.height());
                }
            }
            Command::FillRect { rect } => {
                if let Some(rect) = Rect::from_xywh(
                    rect.x.to_f32(),
                    rect.y.to_f32(),
                    rect.width.to_f32(),
                    rect.height.to_f32(),
                ) {
                    let path = PathBuilder::from_rect(rect);
                    let paint = fill_paint(state.fill_color, state.fill_opacity);
                    pixmap.fill_path(
                        &path,
                        &paint,
                        FillRule::Winding,
                        Transform::identity(),
                        state.clip_mask.as_ref(),
                    );
                }
            }
            Command::FillLinearGradient {
                rect,
                from,
                to,
                start,
                end,
            } => {
                let Some(rect) = Rect::from_xywh(
                    rect.x.to_f32(),
                    rect.y.to_f32(),
                    rect.width.to_f32(),
                    rect.height.to_f32(),
                ) else {
                    continue;
                };
                let Some(shader) = build_gradient_shader(
                    (from.0.to_f32(), from.1.to_f32()),
                    (to.0.to_f32(), to.1.to_f32()),
                    *start,
                    *end,
                    state.fill_opacity,
                ) else {
                    continue;
                };
                let path = PathBuilder::from_rect(rect);
                let mut paint = Paint::default();
                paint.shader = shader;
                paint.anti_alias = true;
                pixmap.fill_path(
                    &path,
                    &paint,
                    FillRule::Winding,
                    Transform::identity(),
                    state.clip_mask.as_ref(),
                );
            }
            Command::StrokeLine { from, to, width } => {
                let mut builder = PathBuilder::new();
                builder.move_to(from.0.to_f32(), from.1.to_f32());
                builder.line_to(to.0.to_f32(), to.1.to_f32());
                let Some(path) = builder.finish() else {
                    continue;
                };
                let paint = fill_paint(state.stroke_color, state.fill_opacity);
                let mut stroke = Stroke::default();
                stroke.width = width.to_f32().max(0.0);
                pixmap.stroke_path(
                    &path,
                    &paint,
                    &stroke,
                    Transform::identity(),
                    state.clip_mask.as_ref(),
                );
            }
            Command::DrawString { x, y, text } => {
                draw_string(&mut pixmap, &state, x.to_f32(), y.to_f32(), text, fonts);
            }
        }
    }

    Ok(pixmap)
}

fn apply_clip_path(state: &mut RasterState, path: &Path, width: u32, height: u32) {
    if let Some(mask) = state.clip_mask.as_mut() {
        mask.intersect_path(path, FillRule::Winding, true, Transform::identity());
        return;
    }
    let Some(mut mask) = Mask::new(width, height) else {
        return;
    };
    mask.fill_path(path, FillRule::Winding, true, Transform::identity());
    state.clip_mask = Some(mask);
}

/// Rounded rectangle outline with cubic corner arcs. The radius is
/// clamped so opposite corners never overlap.
fn rounded_rect_path(x: f32, y: f32, width: f32, height: f32, radius: f32) -> Option<Path> {
    if width <= 0.0 || height <= 0.0 {
        return None;
    }
    let r = radius.max(0.0).min(width / 2.0).min(height / 2.0);
    if r <= 0.0 {
        return Rect::from_xywh(x, y, width, height).map(PathBuilder::from_rect);
    }
    let k = r * KAPPA;
    let (right, bottom) = (x + width, y + height);
    let mut pb = PathBuilder::new();
    pb.move_to(x + r, y);
    pb.line_to(right - r, y);
    pb.cubic_to(right - r + k, y, right, y + r - k, right, y + r);
    pb.line_to(right, bottom - r);
    pb.cubic_to(right, bottom - r + k, right - r + k, bottom, right - r, bottom);
    pb.line_to(x + r, bottom);
    pb.cubic_to(x + r - k, bottom, x, bottom - r + k, x, bottom - r);
    pb.line_to(x, y + r);
    pb.cubic_to(x, y + r - k, x + r - k, y, x + r, y);
    pb.close();
    pb.finish()
}

fn build_gradient_shader(
    from: (f32, f32),
    to: (f32, f32),
    start: Color,
    end: Color,
    opacity: f32,
) -> Option<Shader<'static>> {
    let stops = vec![
        GradientStop::new(0.0, to_sk_color(start, opacity)),
        GradientStop::new(1.0, to_sk_color(end, opacity)),
    ];
    LinearGradient::new(
        Point::from_xy(from.0, from.1),
        Point::from_xy(to.0, to.1),
        stops,
        SpreadMode::Pad,
        Transform::identity(),
    )
}

struct GlyphPlacement {
    glyph_id: u16,
    origin_x: f32,
    origin_y: f32,
    scale: f32,
}

fn draw_string(
    pixmap: &mut Pixmap,
    state: &RasterState,
    baseline_x: f32,
    baseline_y: f32,
    text: &str,
    fonts: &FontRegistry,
) {
    if text.is_empty() {
        return;
    }
    let debug_text = std::env::var("SHOWCARD_RASTER_DEBUG_TEXT")
        .map(|v| !v.is_empty() && v != "0" && !v.eq_ignore_ascii_case("false"))
        .unwrap_or(false);

    let Some((query, size)) = state.font.as_ref() else {
        return;
    };
    let font_size = size.to_f32();
    if font_size <= 0.0 {
        return;
    }

    let Some(font_data) = fonts.face_data(query) else {
        if debug_text {
            eprintln!(
                "[raster-text] skip: unresolved families={:?} text='{}'",
                query.families,
                truncate_debug_text(text)
            );
        }
        return;
    };
    let Ok(face) = ttf_parser::Face::parse(&font_data, 0) else {
        return;
    };

    let placements = layout_text_glyphs(&font_data, text, font_size, baseline_x, baseline_y);
    let paint = fill_paint(state.fill_color, state.fill_opacity);
    let mut drawn = 0usize;
    for placement in &placements {
        let mut builder =
            GlyphPathBuilder::new(placement.origin_x, placement.origin_y, placement.scale);
        if face
            .outline_glyph(GlyphId(placement.glyph_id), &mut builder)
            .is_none()
        {
            continue;
        }
        let Some(path) = builder.finish() else {
            continue;
        };
        pixmap.fill_path(
            &path,
            &paint,
            FillRule::Winding,
            Transform::identity(),
            state.clip_mask.as_ref(),
        );
        drawn += 1;
    }

    if debug_text {
        eprintln!(
            "[raster-text] draw families={:?} size={:.2} opacity={:.2} clip={} glyphs={}/{} at=({:.2},{:.2}) text='{}'",
            query.families,
            font_size,
            state.fill_opacity,
            state.clip_mask.is_some(),
            drawn,
            placements.len(),
            baseline_x,
            baseline_y,
            truncate_debug_text(text)
        );
    }
}

fn layout_text_glyphs(
    font_data: &[u8],
    text: &str,
    font_size: f32,
    baseline_x: f32,
    baseline_y: f32,
) -> Vec<GlyphPlacement> {
    let Some(face) = HbFace::from_slice(font_data, 0) else {
        return layout_text_glyphs_unshaped(font_data, text, font_size, baseline_x, baseline_y);
    };
    let units = face.units_per_em().max(1) as f32;
    let scale = font_size / units;
    let mut buffer = UnicodeBuffer::new();
    buffer.set_direction(detect_direction(text));
    buffer.push_str(text);
    let output = rustybuzz::shape(&face, &[], buffer);
    let infos = output.glyph_infos();
    let positions = output.glyph_positions();
    if infos.is_empty() || infos.len() != positions.len() {
        return layout_text_glyphs_unshaped(font_data, text, font_size, baseline_x, baseline_y);
    }

    let mut out = Vec::with_capacity(infos.len());
    let mut pen_x = 0.0f32;
    for (info, pos) in infos.iter().zip(positions.iter()) {
        let gid = info.glyph_id as u16;
        if gid == 0 {
            pen_x += (pos.x_advance as f32 / units) * font_size;
            continue;
        }
        let x_off = (pos.x_offset as f32 / units) * font_size;
        let y_off = (pos.y_offset as f32 / units) * font_size;
        out.push(GlyphPlacement {
            glyph_id: gid,
            origin_x: baseline_x + pen_x + x_off,
            // Offsets are font-space (y up); the canvas is y down.
            origin_y: baseline_y - y_off,
            scale,
        });
        pen_x += (pos.x_advance as f32 / units) * font_size;
    }
    out
}

fn layout_text_glyphs_unshaped(
    font_data: &[u8],
    text: &str,
    font_size: f32,
    baseline_x: f32,
    baseline_y: f32,
) -> Vec<GlyphPlacement> {
    let Ok(face) = ttf_parser::Face::parse(font_data, 0) else {
        return Vec::new();
    };
    let units = face.units_per_em().max(1) as f32;
    let scale = font_size / units;

    let mut out = Vec::new();
    let mut pen_x = 0.0f32;
    for ch in text.chars() {
        let gid = face.glyph_index(ch).map(|id| id.0).unwrap_or(0);
        if gid == 0 {
            pen_x += font_size * 0.5;
            continue;
        }
        out.push(GlyphPlacement {
            glyph_id: gid,
            origin_x: baseline_x + pen_x,
            origin_y: baseline_y,
            scale,
        });
        let advance_units = face.glyph_hor_advance(GlyphId(gid)).unwrap_or(0) as f32;
        let mut adv = (advance_units / units) * font_size;
        if adv <= 0.0 {
            adv = font_size * 0.5;
        }
        pen_x += adv;
    }
    out
}

struct GlyphPathBuilder {
    builder: PathBuilder,
    origin_x: f32,
    origin_y: f32,
    scale: f32,
}

impl GlyphPathBuilder {
    fn new(origin_x: f32, origin_y: f32, scale: f32) -> Self {
        Self {
            builder: PathBuilder::new(),
            origin_x,
            origin_y,
            scale,
        }
    }

    fn finish(self) -> Option<Path> {
        self.builder.finish()
    }
}

// Glyph outlines come out of the font y-up; the image canvas is y-down,
// so outline y coordinates are mirrored around the baseline.
impl OutlineBuilder for GlyphPathBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        self.builder.move_to(
            self.origin_x + x * self.scale,
            self.origin_y - y * self.scale,
        );
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.builder.line_to(
            self.origin_x + x * self.scale,
            self.origin_y - y * self.scale,
        );
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        self.builder.quad_to(
            self.origin_x + x1 * self.scale,
            self.origin_y - y1 * self.scale,
            self.origin_x + x * self.scale,
            self.origin_y - y * self.scale,
        );
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        self.builder.cubic_to(
            self.origin_x + x1 * self.scale,
            self.origin_y - y1 * self.scale,
            self.origin_x + x2 * self.scale,
            self.origin_y - y2 * self.scale,
            self.origin_x + x * self.scale,
            self.origin_y - y * self.scale,
        );
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

fn fill_paint(color: Color, opacity: f32) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(to_sk_color(color, opacity));
    paint.anti_alias = true;
    paint
}

fn to_sk_color(color: Color, opacity: f32) -> tiny_skia::Color {
    let r = color.r.clamp(0.0, 1.0);
    let g = color.g.clamp(0.0, 1.0);
    let b = color.b.clamp(0.0, 1.0);
    let a = opacity.clamp(0.0, 1.0);
    tiny_skia::Color::from_rgba(r, g, b, a)
        .unwrap_or_else(|| tiny_skia::Color::from_rgba8(0, 0, 0, 255))
}

fn truncate_debug_text(text: &str) -> String {
    const MAX: usize = 32;
    if text.chars().count() <= MAX {
        return text.to_string();
    }
    let prefix: String = text.chars().take(MAX).collect();
    format!("{prefix}…")
}

/// Encodes a rendered pixmap into the requested image format. The pixmap
/// stores premultiplied alpha; channels are demultiplied before they are
/// handed to the encoders.
pub(crate) fn encode_pixmap(
    pixmap: &Pixmap,
    format: ImageFormat,
    quality: u8,
) -> Result<Vec<u8>, ShowCardError> {
    let width = pixmap.width();
    let height = pixmap.height();
    let mut out = Vec::new();
    match format {
        ImageFormat::Png => {
            let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
            for px in pixmap.pixels() {
                let c = px.demultiply();
                rgba.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
            }
            PngEncoder::new(&mut out)
                .write_image(&rgba, width, height, ExtendedColorType::Rgba8)
                .map_err(|e| ShowCardError::EncodeFailure(format!("png encode failed: {e}")))?;
        }
        ImageFormat::Jpeg => {
            let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
            for px in pixmap.pixels() {
                let c = px.demultiply();
                rgb.extend_from_slice(&[c.red(), c.green(), c.blue()]);
            }
            JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
                .write_image(&rgb, width, height, ExtendedColorType::Rgb8)
                .map_err(|e| ShowCardError::EncodeFailure(format!("jpeg encode failed: {e}")))?;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Rect as PxRect;

    fn pixel_rgba(pixmap: &Pixmap, x: u32, y: u32) -> (u8, u8, u8, u8) {
        let px = pixmap.pixel(x, y).unwrap().demultiply();
        (px.red(), px.green(), px.blue(), px.alpha())
    }

    fn full_rect(width: u32, height: u32) -> PxRect {
        PxRect::from_f32(0.0, 0.0, width as f32, height as f32)
    }

    #[test]
    fn fill_rect_paints_solid_color() {
        let fonts = FontRegistry::new(true);
        let commands = vec![
            Command::SetFillColor(Color::rgb(1.0, 0.0, 0.0)),
            Command::FillRect {
                rect: full_rect(10, 10),
            },
        ];
        let pixmap = render_to_pixmap(10, 10, &commands, &fonts).unwrap();
        assert_eq!(pixel_rgba(&pixmap, 5, 5), (255, 0, 0, 255));
    }

    #[test]
    fn rounded_clip_keeps_corners_unpainted() {
        let fonts = FontRegistry::new(true);
        let commands = vec![
            Command::ClipRoundedRect {
                rect: full_rect(100, 100),
                radius: Px::from_f32(40.0),
            },
            Command::SetFillColor(Color::rgb(0.0, 0.0, 1.0)),
            Command::FillRect {
                rect: full_rect(100, 100),
            },
        ];
        let pixmap = render_to_pixmap(100, 100, &commands, &fonts).unwrap();
        // Center is painted, the extreme corner stays transparent.
        assert_eq!(pixel_rgba(&pixmap, 50, 50).3, 255);
        assert_eq!(pixel_rgba(&pixmap, 1, 1).3, 0);
    }

    #[test]
    fn linear_gradient_blends_between_stops() {
        let fonts = FontRegistry::new(true);
        let commands = vec![Command::FillLinearGradient {
            rect: full_rect(100, 10),
            from: (Px::ZERO, Px::ZERO),
            to: (Px::from_f32(100.0), Px::ZERO),
            start: Color::rgb(1.0, 0.0, 0.0),
            end: Color::rgb(0.0, 0.0, 1.0),
        }];
        let pixmap = render_to_pixmap(100, 10, &commands, &fonts).unwrap();
        let left = pixel_rgba(&pixmap, 2, 5);
        let right = pixel_rgba(&pixmap, 97, 5);
        assert!(left.0 > 200 && left.2 < 60, "left should be red: {left:?}");
        assert!(right.2 > 200 && right.0 < 60, "right should be blue: {right:?}");
    }

    #[test]
    fn opacity_applies_to_fills() {
        let fonts = FontRegistry::new(true);
        let commands = vec![
            Command::SetFillColor(Color::rgb(1.0, 1.0, 1.0)),
            Command::FillRect {
                rect: full_rect(4, 4),
            },
            Command::SetOpacity { fill: 0.5 },
            Command::SetFillColor(Color::BLACK),
            Command::FillRect {
                rect: full_rect(4, 4),
            },
        ];
        let pixmap = render_to_pixmap(4, 4, &commands, &fonts).unwrap();
        let (r, g, b, a) = pixel_rgba(&pixmap, 2, 2);
        assert_eq!(a, 255);
        // 50% black over white lands mid-gray.
        assert!(r > 100 && r < 160, "got {r} {g} {b}");
    }

    #[test]
    fn stroke_line_marks_pixels() {
        let fonts = FontRegistry::new(true);
        let commands = vec![
            Command::SetStrokeColor(Color::rgb(0.0, 1.0, 0.0)),
            Command::StrokeLine {
                from: (Px::ZERO, Px::from_f32(5.0)),
                to: (Px::from_f32(10.0), Px::from_f32(5.0)),
                width: Px::from_f32(2.0),
            },
        ];
        let pixmap = render_to_pixmap(10, 10, &commands, &fonts).unwrap();
        assert!(pixel_rgba(&pixmap, 5, 5).3 > 0);
    }

    #[test]
    fn draw_string_renders_glyphs_when_a_face_resolves() {
        let fonts = FontRegistry::new(true);
        let query = FontQuery::from_family_list("Arial, sans-serif");
        if !fonts.has_face(&query) {
            return;
        }
        let commands = vec![
            Command::SetFillColor(Color::BLACK),
            Command::SetFont {
                query,
                size: Px::from_f32(24.0),
            },
            Command::DrawString {
                x: Px::from_f32(4.0),
                y: Px::from_f32(40.0),
                text: "Hello".to_string(),
            },
        ];
        let pixmap = render_to_pixmap(120, 60, &commands, &fonts).unwrap();
        let inked = pixmap.pixels().iter().any(|px| px.alpha() > 0);
        assert!(inked, "expected glyph outlines to produce pixels");
    }

    #[test]
    fn draw_string_without_face_is_a_silent_no_op() {
        let fonts = FontRegistry::new(true);
        let commands = vec![
            Command::SetFont {
                query: FontQuery {
                    families: vec!["showcard-test-fallback".to_string()],
                    bold: false,
                    italic: false,
                },
                size: Px::from_f32(24.0),
            },
            Command::DrawString {
                x: Px::ZERO,
                y: Px::from_f32(20.0),
                text: "ghost".to_string(),
            },
        ];
        let pixmap = render_to_pixmap(40, 40, &commands, &fonts).unwrap();
        assert!(pixmap.pixels().iter().all(|px| px.alpha() == 0));
    }

    #[test]
    fn png_encode_round_trips_dimensions() {
        let fonts = FontRegistry::new(true);
        let commands = vec![
            Command::SetFillColor(Color::rgb(0.2, 0.4, 0.6)),
            Command::FillRect {
                rect: full_rect(17, 9),
            },
        ];
        let pixmap = render_to_pixmap(17, 9, &commands, &fonts).unwrap();
        let bytes = encode_pixmap(&pixmap, ImageFormat::Png, 90).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded.width(), 17);
        assert_eq!(decoded.height(), 9);
    }

    #[test]
    fn jpeg_encode_emits_jpeg_magic() {
        let fonts = FontRegistry::new(true);
        let commands = vec![
            Command::SetFillColor(Color::rgb(0.9, 0.9, 0.2)),
            Command::FillRect {
                rect: full_rect(8, 8),
            },
        ];
        let pixmap = render_to_pixmap(8, 8, &commands, &fonts).unwrap();
        let bytes = encode_pixmap(&pixmap, ImageFormat::Jpeg, 80).unwrap();
        assert_eq!(&bytes[0..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn rounded_rect_path_degenerates_to_rect_at_zero_radius() {
        let path = rounded_rect_path(0.0, 0.0, 10.0, 10.0, 0.0).unwrap();
        let rounded = rounded_rect_path(0.0, 0.0, 10.0, 10.0, 4.0).unwrap();
        assert!(path.bounds().width() == rounded.bounds().width());
    }
}
