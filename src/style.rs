use crate::types::Color;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradientDirection {
    Horizontal,
    Vertical,
    Diagonal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Gradient {
    pub start: String,
    pub end: String,
    pub direction: GradientDirection,
}

/// Drop-shadow metadata carried by a theme. Kept for API completeness;
/// the rasterizer does not paint shadows.
#[derive(Debug, Clone, PartialEq)]
pub struct Shadow {
    pub offset_x: f32,
    pub offset_y: f32,
    pub blur: f32,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StyleDescriptor {
    pub id: String,
    pub name: String,
    pub background_color: String,
    pub text_color: String,
    pub header_color: String,
    pub accent_color: String,
    pub border_radius: f32,
    pub padding: f32,
    pub font_family: String,
    pub font_size: f32,
    pub line_height: f32,
    pub gradient: Option<Gradient>,
    pub shadow: Option<Shadow>,
}

/// Visual subset of a descriptor returned by [`list_styles`].
#[derive(Debug, Clone, PartialEq)]
pub struct StylePreview {
    pub id: String,
    pub name: String,
    pub background_color: String,
    pub text_color: String,
    pub header_color: String,
    pub accent_color: String,
}

pub fn styles() -> &'static [StyleDescriptor] {
    static CATALOG: OnceLock<Vec<StyleDescriptor>> = OnceLock::new();
    CATALOG.get_or_init(build_catalog)
}

pub fn style_by_id(id: &str) -> Option<&'static StyleDescriptor> {
    styles().iter().find(|style| style.id == id)
}

pub fn list_styles() -> Vec<StylePreview> {
    styles()
        .iter()
        .map(|style| StylePreview {
            id: style.id.clone(),
            name: style.name.clone(),
            background_color: style.background_color.clone(),
            text_color: style.text_color.clone(),
            header_color: style.header_color.clone(),
            accent_color: style.accent_color.clone(),
        })
        .collect()
}

/// Parses `#rgb`, `#rrggbb`, `rgb(...)`, and `rgba(...)` strings into a
/// color plus alpha. Anything else is rejected; callers decide whether
/// rejection is an error or a fallback.
pub(crate) fn parse_color_string(raw: &str) -> Option<(Color, f32)> {
    let s = raw.trim();
    if let Some(hex) = s.strip_prefix('#') {
        let hex = match hex.len() {
            3 => {
                let mut out = String::with_capacity(6);
                for ch in hex.chars() {
                    out.push(ch);
                    out.push(ch);
                }
                out
            }
            6 => hex.to_string(),
            _ => return None,
        };
        let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
        let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
        let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
        return Some((Color::from_rgb8(r, g, b), 1.0));
    }

    let (body, has_alpha) = if let Some(rest) = s.strip_prefix("rgba(") {
        (rest.strip_suffix(')')?, true)
    } else if let Some(rest) = s.strip_prefix("rgb(") {
        (rest.strip_suffix(')')?, false)
    } else {
        return None;
    };

    let parts: Vec<&str> = body.split(',').map(str::trim).collect();
    if parts.len() != if has_alpha { 4 } else { 3 } {
        return None;
    }
    let r: u8 = parts[0].parse().ok()?;
    let g: u8 = parts[1].parse().ok()?;
    let b: u8 = parts[2].parse().ok()?;
    let alpha = if has_alpha {
        let a: f32 = parts[3].parse().ok()?;
        if !a.is_finite() {
            return None;
        }
        a.clamp(0.0, 1.0)
    } else {
        1.0
    };
    Some((Color::from_rgb8(r, g, b), alpha))
}

/// Paint-time color resolution. Unparseable strings fall back to opaque
/// black instead of failing the render.
pub(crate) fn paint_color(raw: &str) -> (Color, f32) {
    parse_color_string(raw).unwrap_or((Color::BLACK, 1.0))
}

fn build_catalog() -> Vec<StyleDescriptor> {
    vec![
        theme(
            "warm-soft",
            "Warm Soft",
            ["#FFF8F0", "#8B4513", "#CD853F", "#DEB887"],
            20.0,
            40.0,
            "Arial, sans-serif",
            16.0,
            1.6,
            Some(("#FFF8F0", "#FFE4B5", GradientDirection::Vertical)),
            Some((0.0, 10.0, 30.0, "rgba(205, 133, 63, 0.2)")),
        ),
        theme(
            "minimal-gray",
            "Minimal Gray",
            ["#F8F9FA", "#2E3440", "#5E81AC", "#88C0D0"],
            12.0,
            35.0,
            "Helvetica, Arial, sans-serif",
            15.0,
            1.7,
            None,
            Some((0.0, 5.0, 15.0, "rgba(0, 0, 0, 0.1)")),
        ),
        theme(
            "dreamy-gradient",
            "Dreamy Gradient",
            ["#FF6B6B", "#FFFFFF", "#FFFFFF", "#FFE66D"],
            25.0,
            45.0,
            "Georgia, serif",
            16.0,
            1.8,
            Some(("#FF6B6B", "#4ECDC4", GradientDirection::Diagonal)),
            Some((0.0, 15.0, 40.0, "rgba(255, 107, 107, 0.3)")),
        ),
        theme(
            "fresh-natural",
            "Fresh Natural",
            ["#E8F5E8", "#2D5016", "#4A7C59", "#7FB069"],
            18.0,
            38.0,
            "Verdana, sans-serif",
            15.0,
            1.7,
            Some(("#E8F5E8", "#C8E6C9", GradientDirection::Vertical)),
            Some((0.0, 8.0, 20.0, "rgba(74, 124, 89, 0.2)")),
        ),
        theme(
            "tech-blue",
            "Tech Blue",
            ["#0F172A", "#E2E8F0", "#38BDF8", "#0EA5E9"],
            16.0,
            40.0,
            "Monaco, monospace",
            14.0,
            1.6,
            Some(("#0F172A", "#1E293B", GradientDirection::Diagonal)),
            Some((0.0, 12.0, 25.0, "rgba(56, 189, 248, 0.3)")),
        ),
        theme(
            "elegant-purple",
            "Elegant Purple",
            ["#F3E8FF", "#581C87", "#7C3AED", "#A855F7"],
            20.0,
            42.0,
            "Times New Roman, serif",
            16.0,
            1.8,
            Some(("#F3E8FF", "#E9D5FF", GradientDirection::Vertical)),
            Some((0.0, 10.0, 30.0, "rgba(124, 58, 237, 0.2)")),
        ),
        theme(
            "vibrant-orange",
            "Vibrant Orange",
            ["#FFF7ED", "#9A3412", "#EA580C", "#FB923C"],
            22.0,
            40.0,
            "Arial, sans-serif",
            16.0,
            1.6,
            Some(("#FFF7ED", "#FFEDD5", GradientDirection::Vertical)),
            Some((0.0, 12.0, 28.0, "rgba(234, 88, 12, 0.25)")),
        ),
        theme(
            "forest-green",
            "Forest Green",
            ["#064E3B", "#D1FAE5", "#34D399", "#6EE7B7"],
            18.0,
            38.0,
            "Trebuchet MS, sans-serif",
            15.0,
            1.7,
            Some(("#064E3B", "#065F46", GradientDirection::Diagonal)),
            Some((0.0, 10.0, 25.0, "rgba(52, 211, 153, 0.3)")),
        ),
        theme(
            "rose-gold",
            "Rose Gold",
            ["#FDF2F8", "#831843", "#E11D48", "#F43F5E"],
            24.0,
            44.0,
            "Georgia, serif",
            16.0,
            1.8,
            Some(("#FDF2F8", "#FCE7F3", GradientDirection::Horizontal)),
            Some((0.0, 15.0, 35.0, "rgba(225, 29, 72, 0.2)")),
        ),
        theme(
            "deep-ocean",
            "Deep Ocean",
            ["#0C4A6E", "#BAE6FD", "#0EA5E9", "#38BDF8"],
            16.0,
            40.0,
            "Arial, sans-serif",
            15.0,
            1.7,
            Some(("#0C4A6E", "#075985", GradientDirection::Vertical)),
            Some((0.0, 12.0, 30.0, "rgba(14, 165, 233, 0.4)")),
        ),
        theme(
            "mint-green",
            "Mint Green",
            ["#ECFDF5", "#065F46", "#059669", "#10B981"],
            20.0,
            40.0,
            "Helvetica, sans-serif",
            16.0,
            1.6,
            Some(("#ECFDF5", "#D1FAE5", GradientDirection::Diagonal)),
            Some((0.0, 8.0, 20.0, "rgba(5, 150, 105, 0.2)")),
        ),
        theme(
            "neutral-gray",
            "Neutral Gray",
            ["#F9FAFB", "#374151", "#6B7280", "#9CA3AF"],
            12.0,
            35.0,
            "Arial, sans-serif",
            15.0,
            1.7,
            None,
            Some((0.0, 6.0, 15.0, "rgba(0, 0, 0, 0.08)")),
        ),
    ]
}

#[allow(clippy::too_many_arguments)]
fn theme(
    id: &str,
    name: &str,
    // background, text, header, accent
    colors: [&str; 4],
    border_radius: f32,
    padding: f32,
    font_family: &str,
    font_size: f32,
    line_height: f32,
    gradient: Option<(&str, &str, GradientDirection)>,
    shadow: Option<(f32, f32, f32, &str)>,
) -> StyleDescriptor {
    StyleDescriptor {
        id: id.to_string(),
        name: name.to_string(),
        background_color: colors[0].to_string(),
        text_color: colors[1].to_string(),
        header_color: colors[2].to_string(),
        accent_color: colors[3].to_string(),
        border_radius,
        padding,
        font_family: font_family.to_string(),
        font_size,
        line_height,
        gradient: gradient.map(|(start, end, direction)| Gradient {
            start: start.to_string(),
            end: end.to_string(),
            direction,
        }),
        shadow: shadow.map(|(offset_x, offset_y, blur, color)| Shadow {
            offset_x,
            offset_y,
            blur,
            color: color.to_string(),
        }),
    }
}
