//! showcard renders markdown into a single styled raster image (a
//! "card"). A normalized block sequence and a named visual theme go
//! through a measurement pass and a draw pass that share one set of
//! text metrics, so auto-sized cards come out exactly as tall as their
//! content. Output is deterministic: the same input produces the same
//! bytes on every run.

mod canvas;
mod debug;
mod error;
mod font;
mod layout;
mod markdown;
mod raster;
mod render;
mod style;
mod types;

pub use error::ShowCardError;
pub use markdown::{Block, normalize};
pub use render::{ImageFormat, RenderConfig};
pub use style::{
    Gradient, GradientDirection, Shadow, StyleDescriptor, StylePreview, list_styles, style_by_id,
    styles,
};
pub use types::{Color, Px, Rect};

use base64::Engine;
use debug::DebugLogger;
use font::FontRegistry;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Caller-facing knobs for one card. Defaults mirror the service layer
/// this engine grew out of: 800x1000, PNG, quality 90, auto-height
/// bounded to 400..5000.
#[derive(Debug, Clone)]
pub struct CardOptions {
    pub width: u32,
    pub height: u32,
    pub title: Option<String>,
    pub watermark: Option<String>,
    pub format: ImageFormat,
    pub quality: u8,
    pub auto_height: bool,
    pub min_height: u32,
    pub max_height: u32,
}

impl Default for CardOptions {
    fn default() -> Self {
        Self {
            width: 800,
            height: 1000,
            title: None,
            watermark: None,
            format: ImageFormat::Png,
            quality: 90,
            auto_height: false,
            min_height: 400,
            max_height: 5000,
        }
    }
}

/// Result of the persist variant: where the card landed and how big it is.
#[derive(Debug, Clone)]
pub struct RenderedFile {
    pub path: PathBuf,
    pub bytes: usize,
}

#[derive(Debug, Clone)]
pub struct ShowCardBuilder {
    font_dirs: Vec<PathBuf>,
    font_files: Vec<PathBuf>,
    unicode_metrics: bool,
    debug_path: Option<PathBuf>,
}

impl Default for ShowCardBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ShowCardBuilder {
    pub fn new() -> Self {
        Self {
            font_dirs: Vec::new(),
            font_files: Vec::new(),
            unicode_metrics: true,
            debug_path: None,
        }
    }

    /// Registers every .ttf/.otf file in `path` before system probing.
    pub fn font_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_dirs.push(path.into());
        self
    }

    pub fn font_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_files.push(path.into());
        self
    }

    /// When enabled (the default), text outside basic Latin is measured
    /// through the shaper instead of the per-codepoint advance table.
    pub fn unicode_metrics(mut self, enabled: bool) -> Self {
        self.unicode_metrics = enabled;
        self
    }

    /// Writes one JSONL summary line per render to `path`. Off unless
    /// configured; the engine never logs on its own.
    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<ShowCard, ShowCardError> {
        let fonts = FontRegistry::new(self.unicode_metrics);
        for dir in &self.font_dirs {
            fonts.register_dir(dir);
        }
        for file in &self.font_files {
            fonts.register_file(file);
        }
        let debug = match &self.debug_path {
            Some(path) => Some(DebugLogger::new(path)?),
            None => None,
        };
        Ok(ShowCard {
            fonts: Arc::new(fonts),
            debug,
        })
    }
}

/// The rendering engine. Cheap to share: holds the font registry and an
/// optional debug sink; every render call is otherwise self-contained,
/// so one engine serves any number of concurrent callers.
pub struct ShowCard {
    fonts: Arc<FontRegistry>,
    debug: Option<DebugLogger>,
}

impl Default for ShowCard {
    fn default() -> Self {
        Self::new()
    }
}

impl ShowCard {
    pub fn new() -> Self {
        Self {
            fonts: Arc::new(FontRegistry::new(true)),
            debug: None,
        }
    }

    pub fn builder() -> ShowCardBuilder {
        ShowCardBuilder::new()
    }

    /// Core entry point: renders a fully resolved config into image
    /// bytes. Fails with a typed error; never returns partial output.
    pub fn render(&self, config: &RenderConfig) -> Result<Vec<u8>, ShowCardError> {
        let bytes = render::render(&self.fonts, config)?;
        if let Some(debug) = &self.debug {
            debug.log_json(&format!(
                "{{\"type\":\"render.summary\",\"style\":\"{}\",\"width\":{},\"blocks\":{},\"bytes\":{}}}",
                debug::json_escape(&config.style.id),
                config.width,
                config.content.len(),
                bytes.len()
            ));
        }
        Ok(bytes)
    }

    /// Preview variant: markdown + style id in, encoded bytes out.
    pub fn render_markdown(
        &self,
        markdown: &str,
        style_id: &str,
        options: &CardOptions,
    ) -> Result<Vec<u8>, ShowCardError> {
        let config = self.config_for(markdown, style_id, options)?;
        self.render(&config)
    }

    /// Generate variant: renders and persists to `path`.
    pub fn render_markdown_to_file(
        &self,
        markdown: &str,
        style_id: &str,
        options: &CardOptions,
        path: impl AsRef<Path>,
    ) -> Result<RenderedFile, ShowCardError> {
        let bytes = self.render_markdown(markdown, style_id, options)?;
        let path = path.as_ref();
        std::fs::write(path, &bytes)?;
        Ok(RenderedFile {
            path: path.to_path_buf(),
            bytes: bytes.len(),
        })
    }

    /// Preview transport used by chat-style callers: a base64 data URI.
    pub fn render_markdown_data_uri(
        &self,
        markdown: &str,
        style_id: &str,
        options: &CardOptions,
    ) -> Result<String, ShowCardError> {
        let bytes = self.render_markdown(markdown, style_id, options)?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
        Ok(format!(
            "data:{};base64,{encoded}",
            options.format.mime_type()
        ))
    }

    fn config_for(
        &self,
        markdown: &str,
        style_id: &str,
        options: &CardOptions,
    ) -> Result<RenderConfig, ShowCardError> {
        let style = style::style_by_id(style_id)
            .ok_or_else(|| ShowCardError::StyleNotFound(style_id.to_string()))?;
        Ok(RenderConfig {
            width: options.width,
            height: options.height,
            style: style.clone(),
            content: markdown::normalize(markdown),
            title: options.title.clone(),
            watermark: options.watermark.clone(),
            format: options.format,
            quality: options.quality,
            auto_height: options.auto_height,
            min_height: options.min_height,
            max_height: options.max_height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::{Digest, Sha256};

    const KITCHEN_SINK: &str = "\
# Release Notes

This build ships the new renderer and a pile of fixes.

## Highlights

- deterministic output across platforms
- auto-sized cards
- zebra-striped tables

1. unpack
2. run
3. enjoy

> Rendering is just bookkeeping with pixels.

```rust
fn main() {
    println!(\"cards\");
}
```

| Area | Status |
|------|--------|
| layout | done |
| raster | done |
| encode | done |

---

That is all.
";

    fn digest(bytes: &[u8]) -> String {
        format!("{:x}", Sha256::digest(bytes))
    }

    #[test]
    fn repeated_renders_are_byte_identical() {
        let engine = ShowCard::new();
        let options = CardOptions {
            title: Some("Weekly Update".to_string()),
            watermark: Some("@showcard".to_string()),
            ..CardOptions::default()
        };
        let first = engine
            .render_markdown(KITCHEN_SINK, "tech-blue", &options)
            .unwrap();
        let second = engine
            .render_markdown(KITCHEN_SINK, "tech-blue", &options)
            .unwrap();
        assert_eq!(digest(&first), digest(&second));
    }

    #[test]
    fn fresh_engines_agree_on_output() {
        let options = CardOptions::default();
        let a = ShowCard::new()
            .render_markdown(KITCHEN_SINK, "warm-soft", &options)
            .unwrap();
        let b = ShowCard::new()
            .render_markdown(KITCHEN_SINK, "warm-soft", &options)
            .unwrap();
        assert_eq!(digest(&a), digest(&b));
    }

    #[test]
    fn unknown_style_fails_before_any_rendering() {
        let engine = ShowCard::new();
        let err = engine
            .render_markdown("# hi", "no-such-style", &CardOptions::default())
            .unwrap_err();
        match err {
            ShowCardError::StyleNotFound(id) => assert_eq!(id, "no-such-style"),
            other => panic!("expected StyleNotFound, got {other:?}"),
        }
    }

    #[test]
    fn explicit_geometry_is_exact() {
        let engine = ShowCard::new();
        let bytes = engine
            .render_markdown(KITCHEN_SINK, "minimal-gray", &CardOptions::default())
            .unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!((decoded.width(), decoded.height()), (800, 1000));
    }

    #[test]
    fn every_catalog_style_renders() {
        let engine = ShowCard::new();
        let options = CardOptions {
            width: 320,
            height: 480,
            ..CardOptions::default()
        };
        for preview in list_styles() {
            let bytes = engine
                .render_markdown("# Style probe\n\nbody", &preview.id, &options)
                .unwrap();
            assert!(!bytes.is_empty(), "style {} produced no bytes", preview.id);
        }
    }

    #[test]
    fn auto_height_tracks_content_volume() {
        let engine = ShowCard::new();
        let options = CardOptions {
            auto_height: true,
            min_height: 1,
            max_height: 100_000,
            ..CardOptions::default()
        };
        let small = engine
            .render_markdown("one paragraph", "neutral-gray", &options)
            .unwrap();
        let large = engine
            .render_markdown(&"a paragraph\n\n".repeat(40), "neutral-gray", &options)
            .unwrap();
        let small_h = image::load_from_memory(&small).unwrap().to_rgba8().height();
        let large_h = image::load_from_memory(&large).unwrap().to_rgba8().height();
        assert!(large_h > small_h);
    }

    #[test]
    fn generate_variant_persists_bytes() {
        let engine = ShowCard::new();
        let path = std::env::temp_dir().join("showcard-generate-test.png");
        let report = engine
            .render_markdown_to_file("# saved", "mint-green", &CardOptions::default(), &path)
            .unwrap();
        let on_disk = std::fs::read(&report.path).unwrap();
        assert_eq!(on_disk.len(), report.bytes);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn data_uri_carries_the_right_mime() {
        let engine = ShowCard::new();
        let uri = engine
            .render_markdown_data_uri("# uri", "rose-gold", &CardOptions::default())
            .unwrap();
        assert!(uri.starts_with("data:image/png;base64,"));

        let jpeg = CardOptions {
            format: ImageFormat::Jpeg,
            ..CardOptions::default()
        };
        let uri = engine
            .render_markdown_data_uri("# uri", "rose-gold", &jpeg)
            .unwrap();
        assert!(uri.starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn concurrent_renders_share_one_engine() {
        let engine = Arc::new(ShowCard::new());
        let options = CardOptions::default();
        let reference = engine
            .render_markdown(KITCHEN_SINK, "deep-ocean", &options)
            .unwrap();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let engine = engine.clone();
                let options = options.clone();
                std::thread::spawn(move || {
                    engine
                        .render_markdown(KITCHEN_SINK, "deep-ocean", &options)
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(digest(&handle.join().unwrap()), digest(&reference));
        }
    }

    #[test]
    fn debug_log_records_render_summaries() {
        let path = std::env::temp_dir().join("showcard-debug-test.jsonl");
        let engine = ShowCard::builder().debug_log(&path).build().unwrap();
        engine
            .render_markdown("# logged", "warm-soft", &CardOptions::default())
            .unwrap();
        let log = std::fs::read_to_string(&path).unwrap();
        assert!(log.contains("\"type\":\"render.summary\""));
        assert!(log.contains("\"style\":\"warm-soft\""));
        std::fs::remove_file(&path).unwrap();
    }
}
