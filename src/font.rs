use crate::error::ShowCardError;
use crate::types::Px;
use rustybuzz::{Direction as HbDirection, Face as HbFace, UnicodeBuffer};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Font request shared by the measurement pass and the draw pass: an
/// ordered family candidate list plus style flags. Both passes resolve
/// through the same registry, so widths can never diverge between them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FontQuery {
    pub families: Vec<String>,
    pub bold: bool,
    pub italic: bool,
}

impl FontQuery {
    /// Builds a query from a CSS-like family list ("Georgia, serif").
    pub fn from_family_list(list: &str) -> Self {
        let families = list
            .split(',')
            .map(|family| {
                family
                    .trim()
                    .trim_matches('"')
                    .trim_matches('\'')
                    .to_string()
            })
            .filter(|family| !family.is_empty())
            .collect();
        Self {
            families,
            bold: false,
            italic: false,
        }
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    pub fn italic(mut self) -> Self {
        self.italic = true;
        self
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct TextWidthKey {
    face_index: usize,
    size_milli: i64,
    text: String,
}

#[derive(Debug)]
struct TextWidthCache {
    map: HashMap<TextWidthKey, Px>,
    order: VecDeque<TextWidthKey>,
    max_entries: usize,
}

impl TextWidthCache {
    fn new(max_entries: usize) -> Self {
        Self {
            map: HashMap::new(),
            order: VecDeque::new(),
            max_entries,
        }
    }

    fn get(&mut self, key: &TextWidthKey) -> Option<Px> {
        self.map.get(key).copied()
    }

    fn insert(&mut self, key: TextWidthKey, value: Px) {
        if self.map.contains_key(&key) {
            return;
        }
        self.map.insert(key.clone(), value);
        self.order.push_back(key);
        while self.map.len() > self.max_entries {
            if let Some(old) = self.order.pop_front() {
                self.map.remove(&old);
            } else {
                break;
            }
        }
    }
}

#[derive(Debug)]
struct LoadedFace {
    data: Arc<Vec<u8>>,
    metrics: FaceMetrics,
}

#[derive(Debug)]
struct FaceStore {
    faces: Vec<LoadedFace>,
    lookup: HashMap<String, usize>,
    misses: HashSet<String>,
    file_index: Option<HashMap<String, PathBuf>>,
}

#[derive(Debug)]
pub(crate) struct FontRegistry {
    store: Mutex<FaceStore>,
    use_full_unicode_metrics: bool,
    text_width_cache: Mutex<TextWidthCache>,
}

impl FontRegistry {
    pub(crate) fn new(use_full_unicode_metrics: bool) -> Self {
        Self {
            store: Mutex::new(FaceStore {
                faces: Vec::new(),
                lookup: HashMap::new(),
                misses: HashSet::new(),
                file_index: None,
            }),
            use_full_unicode_metrics,
            text_width_cache: Mutex::new(TextWidthCache::new(20_000)),
        }
    }

    pub(crate) fn register_dir(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let Ok(entries) = fs::read_dir(path) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() {
                self.register_file(path);
            }
        }
    }

    pub(crate) fn register_file(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let Some(ext) = path.extension().and_then(|v| v.to_str()) else {
            return;
        };
        let ext = ext.to_ascii_lowercase();
        if ext != "ttf" && ext != "otf" {
            return;
        }
        let Ok(data) = fs::read(path) else {
            return;
        };
        let _ = self.register_bytes(data, path.file_stem().and_then(|v| v.to_str()));
    }

    pub(crate) fn register_bytes(
        &self,
        data: Vec<u8>,
        source_name: Option<&str>,
    ) -> Result<String, ShowCardError> {
        let source = source_name.unwrap_or("EmbeddedFont");
        let Ok(face) = ttf_parser::Face::parse(&data, 0) else {
            return Err(ShowCardError::Font(format!(
                "invalid font data for {source}"
            )));
        };

        let (name, aliases) = face_names(&face, source);
        let metrics = FaceMetrics::from_face(&face);
        let Ok(mut store) = self.store.lock() else {
            return Ok(name);
        };
        let index = store.faces.len();
        store.faces.push(LoadedFace {
            data: Arc::new(data),
            metrics,
        });

        let mut all_aliases = vec![name.clone()];
        all_aliases.extend(aliases);
        for alias in all_aliases {
            let key = normalize_name(&alias);
            if key.is_empty() || store.lookup.contains_key(&key) {
                continue;
            }
            store.lookup.insert(key, index);
        }

        Ok(name)
    }

    /// The single width-measurement entry point. When no face resolves,
    /// falls back to a deterministic per-character estimate so layout
    /// remains stable on fontless hosts.
    pub(crate) fn measure_text_width(&self, query: &FontQuery, font_size: Px, text: &str) -> Px {
        let Some(index) = self.resolve_query(query) else {
            let char_width = (font_size * 0.6).max(Px::from_f32(1.0));
            return char_width * (text.chars().count() as i32);
        };

        let cache_key = TextWidthKey {
            face_index: index,
            size_milli: font_size.to_milli_i64(),
            text: text.to_string(),
        };
        if let Ok(mut cache) = self.text_width_cache.lock() {
            if let Some(value) = cache.get(&cache_key) {
                return value;
            }
        }

        enum Plan {
            Quick(Px),
            Shaped(Arc<Vec<u8>>),
        }
        let plan = {
            let Ok(store) = self.store.lock() else {
                return Px::ZERO;
            };
            let Some(face) = store.faces.get(index) else {
                return Px::ZERO;
            };
            let quick =
                !self.use_full_unicode_metrics || face.metrics.is_within_basic_latin(text);
            if quick {
                Plan::Quick(face.metrics.measure_text_width(font_size, text))
            } else {
                Plan::Shaped(face.data.clone())
            }
        };

        let value = match plan {
            Plan::Quick(value) => value,
            // Shaping runs outside the store lock; it only needs the
            // face bytes.
            Plan::Shaped(data) => {
                measure_text_width_shaped(&data, font_size, text).unwrap_or_else(|| {
                    let Ok(store) = self.store.lock() else {
                        return Px::ZERO;
                    };
                    store
                        .faces
                        .get(index)
                        .map(|face| face.metrics.measure_text_width(font_size, text))
                        .unwrap_or(Px::ZERO)
                })
            }
        };

        if let Ok(mut cache) = self.text_width_cache.lock() {
            cache.insert(cache_key, value);
        }
        value
    }

    /// Raw face bytes for the rasterizer's glyph-outline pass.
    pub(crate) fn face_data(&self, query: &FontQuery) -> Option<Arc<Vec<u8>>> {
        let index = self.resolve_query(query)?;
        let store = self.store.lock().ok()?;
        store.faces.get(index).map(|face| face.data.clone())
    }

    #[cfg(test)]
    pub(crate) fn has_face(&self, query: &FontQuery) -> bool {
        self.resolve_query(query).is_some()
    }

    fn resolve_query(&self, query: &FontQuery) -> Option<usize> {
        let mut store = self.store.lock().ok()?;
        for family in &query.families {
            let alias = normalize_name(family);
            if alias.is_empty() {
                continue;
            }
            if let Some(index) = store.lookup.get(&alias) {
                return Some(*index);
            }
            let style_key = style_cache_key(&alias, query.bold, query.italic);
            if let Some(index) = store.lookup.get(&style_key) {
                return Some(*index);
            }
            if store.misses.contains(&style_key) {
                continue;
            }
            if let Some(index) = load_system_face(&mut store, family, query.bold, query.italic) {
                let key = style_cache_key(&alias, query.bold, query.italic);
                store.lookup.insert(key, index);
                return Some(index);
            }
            store.misses.insert(style_key);
        }
        None
    }
}

fn style_cache_key(family: &str, bold: bool, italic: bool) -> String {
    let style = match (bold, italic) {
        (false, false) => "regular",
        (true, false) => "bold",
        (false, true) => "italic",
        (true, true) => "bold-italic",
    };
    format!("{family}#{style}")
}

#[derive(Debug)]
struct FaceMetrics {
    first_char: u8,
    last_char: u8,
    widths: Vec<u16>,
    glyph_ids: Vec<u16>,
    kerning: HashMap<(u16, u16), i16>,
    missing_width: u16,
}

impl FaceMetrics {
    fn from_face(face: &ttf_parser::Face<'_>) -> Self {
        let units_per_em = face.units_per_em().max(1);
        let scale = 1000.0 / units_per_em as f32;
        let first_char = 32u8;
        let last_char = 255u8;

        let mut glyph_ids = Vec::with_capacity((last_char - first_char + 1) as usize);
        let mut widths = Vec::with_capacity((last_char - first_char + 1) as usize);
        for code in first_char..=last_char {
            let gid = char::from_u32(code as u32)
                .and_then(|ch| face.glyph_index(ch))
                .map(|id| id.0)
                .unwrap_or(0);
            glyph_ids.push(gid);
            let advance = if gid == 0 {
                0
            } else {
                face.glyph_hor_advance(ttf_parser::GlyphId(gid)).unwrap_or(0)
            };
            let scaled = (advance as f32 * scale).round() as i32;
            widths.push(scaled.clamp(0, u16::MAX as i32) as u16);
        }
        let missing_width = widths
            .get((b' ' - first_char) as usize)
            .copied()
            .unwrap_or(0);

        let kerning = build_kerning_pairs(face, &glyph_ids, scale);

        Self {
            first_char,
            last_char,
            widths,
            glyph_ids,
            kerning,
            missing_width,
        }
    }

    fn glyph_id_for_char(&self, ch: char) -> u16 {
        let code = ch as u32;
        let first = self.first_char as u32;
        let last = self.last_char as u32;
        if code < first || code > last {
            return 0;
        }
        self.glyph_ids.get((code - first) as usize).copied().unwrap_or(0)
    }

    fn advance_for_char(&self, ch: char) -> u16 {
        let code = ch as u32;
        let first = self.first_char as u32;
        let last = self.last_char as u32;
        if code < first || code > last {
            return self.missing_width;
        }
        self.widths
            .get((code - first) as usize)
            .copied()
            .unwrap_or(self.missing_width)
    }

    fn measure_text_width(&self, font_size: Px, text: &str) -> Px {
        let mut total_units: i32 = 0;
        let mut prev: Option<u16> = None;
        for ch in text.chars() {
            let gid = self.glyph_id_for_char(ch);
            total_units = total_units.saturating_add(self.advance_for_char(ch) as i32);
            if let Some(prev_gid) = prev {
                if let Some(k) = self.kerning.get(&(prev_gid, gid)) {
                    total_units = total_units.saturating_add(*k as i32);
                }
            }
            prev = Some(gid);
        }
        if total_units <= 0 {
            return Px::ZERO;
        }
        font_size.mul_ratio(total_units, 1000)
    }

    fn is_within_basic_latin(&self, text: &str) -> bool {
        let first = self.first_char as u32;
        let last = self.last_char as u32;
        text.chars().all(|ch| {
            let code = ch as u32;
            code >= first && code <= last
        })
    }
}

fn build_kerning_pairs(
    face: &ttf_parser::Face<'_>,
    glyph_ids: &[u16],
    scale: f32,
) -> HashMap<(u16, u16), i16> {
    let mut out = HashMap::new();
    let Some(kern) = face.tables().kern else {
        return out;
    };

    let subtables: Vec<_> = kern
        .subtables
        .into_iter()
        .filter(|s| s.horizontal && !s.has_cross_stream && !s.has_state_machine)
        .collect();
    if subtables.is_empty() {
        return out;
    }

    for &left in glyph_ids {
        if left == 0 {
            continue;
        }
        for &right in glyph_ids {
            if right == 0 {
                continue;
            }
            let mut total: i32 = 0;
            let left_id = ttf_parser::GlyphId(left);
            let right_id = ttf_parser::GlyphId(right);
            for sub in &subtables {
                if let Some(v) = sub.glyphs_kerning(left_id, right_id) {
                    total = total.saturating_add(v as i32);
                }
            }
            if total != 0 {
                let clamped = total.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
                let scaled = (clamped as f32 * scale).round() as i32;
                let scaled = scaled.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
                if scaled != 0 {
                    out.insert((left, right), scaled);
                }
            }
        }
    }
    out
}

fn measure_text_width_shaped(font_data: &[u8], font_size: Px, text: &str) -> Option<Px> {
    let face = HbFace::from_slice(font_data, 0)?;
    let units_per_em = face.units_per_em().max(1) as i64;

    let mut buffer = UnicodeBuffer::new();
    buffer.set_direction(detect_direction(text));
    buffer.push_str(text);
    let output = rustybuzz::shape(&face, &[], buffer);
    let positions = output.glyph_positions();
    if positions.is_empty() {
        return None;
    }
    let mut total_units: i32 = 0;
    for pos in positions {
        let adv = (((pos.x_advance as i64) * 1000 + (units_per_em / 2)) / units_per_em) as i32;
        total_units = total_units.saturating_add(adv);
    }
    if total_units <= 0 {
        return Some(Px::ZERO);
    }
    Some(font_size.mul_ratio(total_units, 1000))
}

pub(crate) fn detect_direction(text: &str) -> HbDirection {
    for ch in text.chars() {
        let code = ch as u32;
        let rtl = matches!(
            code,
            0x0590..=0x08FF
                | 0xFB1D..=0xFDFF
                | 0xFE70..=0xFEFF
                | 0x1EE00..=0x1EEFF
        );
        if rtl {
            return HbDirection::RightToLeft;
        }
    }
    HbDirection::LeftToRight
}

fn face_names(face: &ttf_parser::Face<'_>, source: &str) -> (String, Vec<String>) {
    use ttf_parser::name::name_id;

    let mut family = None;
    let mut full = None;
    let mut post = None;

    for entry in face.names() {
        let Some(name) = entry.to_string() else {
            continue;
        };
        match entry.name_id {
            name_id::TYPOGRAPHIC_FAMILY | name_id::FAMILY => {
                if family.is_none() {
                    family = Some(name);
                }
            }
            name_id::FULL_NAME => {
                if full.is_none() {
                    full = Some(name);
                }
            }
            name_id::POST_SCRIPT_NAME => {
                if post.is_none() {
                    post = Some(name);
                }
            }
            _ => {}
        }
    }

    let stem = Some(source.to_string()).filter(|s| !s.is_empty());
    let primary = family
        .clone()
        .or_else(|| full.clone())
        .or_else(|| post.clone())
        .or_else(|| stem.clone())
        .unwrap_or_else(|| "EmbeddedFont".to_string());

    let mut aliases = Vec::new();
    for candidate in [full, post, stem].into_iter().flatten() {
        if candidate != primary {
            aliases.push(candidate);
        }
    }

    (primary, aliases)
}

fn normalize_name(name: &str) -> String {
    name.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .to_ascii_lowercase()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FamilyClass {
    Sans,
    Serif,
    Mono,
}

/// Families the candidate tables know about. Anything else only gets
/// synthesized file names, so an unknown family stays unresolved
/// instead of silently borrowing a sans face.
fn family_class(family: &str) -> Option<FamilyClass> {
    match normalize_name(family).as_str() {
        "georgia" | "times" | "times new roman" | "serif" | "ui-serif" => {
            Some(FamilyClass::Serif)
        }
        "monaco" | "consolas" | "courier" | "courier new" | "monospace" | "ui-monospace" => {
            Some(FamilyClass::Mono)
        }
        "arial" | "helvetica" | "verdana" | "tahoma" | "trebuchet ms" | "segoe ui"
        | "sans-serif" | "system-ui" | "ui-sans-serif" => Some(FamilyClass::Sans),
        _ => None,
    }
}

/// Candidate font file names for a family/style request, most specific
/// first. Style candidates are followed by regular ones so a missing
/// bold face degrades to the regular cut instead of to nothing.
fn font_file_candidates(family: &str, bold: bool, italic: bool) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let Some(class) = family_class(family) else {
        push_synthesized_candidates(&mut out, family, bold, italic);
        return out;
    };
    let (regular, bold_files, italic_files, bold_italic): (&[&str], &[&str], &[&str], &[&str]) =
        match class {
            FamilyClass::Sans => (
                &[
                    "DejaVuSans.ttf",
                    "LiberationSans-Regular.ttf",
                    "NotoSans-Regular.ttf",
                    "arial.ttf",
                    "Arial.ttf",
                ],
                &[
                    "DejaVuSans-Bold.ttf",
                    "LiberationSans-Bold.ttf",
                    "NotoSans-Bold.ttf",
                    "arialbd.ttf",
                ],
                &[
                    "DejaVuSans-Oblique.ttf",
                    "LiberationSans-Italic.ttf",
                    "NotoSans-Italic.ttf",
                    "ariali.ttf",
                ],
                &[
                    "DejaVuSans-BoldOblique.ttf",
                    "LiberationSans-BoldItalic.ttf",
                    "NotoSans-BoldItalic.ttf",
                    "arialbi.ttf",
                ],
            ),
            FamilyClass::Serif => (
                &[
                    "DejaVuSerif.ttf",
                    "LiberationSerif-Regular.ttf",
                    "NotoSerif-Regular.ttf",
                    "times.ttf",
                    "georgia.ttf",
                ],
                &[
                    "DejaVuSerif-Bold.ttf",
                    "LiberationSerif-Bold.ttf",
                    "NotoSerif-Bold.ttf",
                    "timesbd.ttf",
                    "georgiab.ttf",
                ],
                &[
                    "DejaVuSerif-Italic.ttf",
                    "LiberationSerif-Italic.ttf",
                    "NotoSerif-Italic.ttf",
                    "timesi.ttf",
                    "georgiai.ttf",
                ],
                &[
                    "DejaVuSerif-BoldItalic.ttf",
                    "LiberationSerif-BoldItalic.ttf",
                    "timesbi.ttf",
                    "georgiaz.ttf",
                ],
            ),
            FamilyClass::Mono => (
                &[
                    "DejaVuSansMono.ttf",
                    "LiberationMono-Regular.ttf",
                    "consola.ttf",
                    "cour.ttf",
                ],
                &[
                    "DejaVuSansMono-Bold.ttf",
                    "LiberationMono-Bold.ttf",
                    "consolab.ttf",
                    "courbd.ttf",
                ],
                &[
                    "DejaVuSansMono-Oblique.ttf",
                    "LiberationMono-Italic.ttf",
                    "consolai.ttf",
                    "couri.ttf",
                ],
                &[
                    "DejaVuSansMono-BoldOblique.ttf",
                    "LiberationMono-BoldItalic.ttf",
                    "consolaz.ttf",
                    "courbi.ttf",
                ],
            ),
        };

    let style_files: &[&str] = match (bold, italic) {
        (false, false) => regular,
        (true, false) => bold_files,
        (false, true) => italic_files,
        (true, true) => bold_italic,
    };
    out.extend(style_files.iter().map(|s| s.to_string()));
    if bold || italic {
        out.extend(regular.iter().map(|s| s.to_string()));
    }
    push_synthesized_candidates(&mut out, family, bold, italic);
    out
}

// File names guessed from the family itself ("Verdana" -> Verdana.ttf /
// Verdana-Bold.ttf).
fn push_synthesized_candidates(out: &mut Vec<String>, family: &str, bold: bool, italic: bool) {
    let compact = family.trim().replace(' ', "");
    if compact.is_empty() || compact.contains('-') {
        return;
    }
    match (bold, italic) {
        (false, false) => out.push(format!("{compact}.ttf")),
        (true, false) => {
            out.push(format!("{compact}-Bold.ttf"));
            out.push(format!("{compact}.ttf"));
        }
        (false, true) => {
            out.push(format!("{compact}-Italic.ttf"));
            out.push(format!("{compact}.ttf"));
        }
        (true, true) => {
            out.push(format!("{compact}-BoldItalic.ttf"));
            out.push(format!("{compact}.ttf"));
        }
    }
}

fn system_font_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    #[cfg(target_os = "windows")]
    {
        dirs.push(PathBuf::from(r"C:\Windows\Fonts"));
        if let Ok(windir) = std::env::var("WINDIR") {
            dirs.push(PathBuf::from(windir).join("Fonts"));
        }
    }

    #[cfg(target_os = "linux")]
    {
        dirs.push(PathBuf::from("/usr/share/fonts"));
        dirs.push(PathBuf::from("/usr/local/share/fonts"));
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(PathBuf::from(home).join(".fonts"));
        }
    }

    #[cfg(target_os = "macos")]
    {
        dirs.push(PathBuf::from("/System/Library/Fonts"));
        dirs.push(PathBuf::from("/Library/Fonts"));
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(PathBuf::from(home).join("Library/Fonts"));
        }
    }

    if let Ok(extra) = std::env::var("SHOWCARD_FONT_DIR") {
        for path in std::env::split_paths(&extra) {
            if !path.as_os_str().is_empty() {
                dirs.push(path);
            }
        }
    }

    dirs
}

/// Maps lowercased font file names to their paths, walking each system
/// directory tree once. Distributions nest families in subdirectories
/// (e.g. truetype/dejavu), so a flat join is not enough.
fn build_file_index() -> HashMap<String, PathBuf> {
    let mut index = HashMap::new();
    for dir in system_font_dirs() {
        index_fonts_under(&dir, 0, &mut index);
    }
    index
}

fn index_fonts_under(dir: &Path, depth: usize, index: &mut HashMap<String, PathBuf>) {
    if depth > 5 {
        return;
    }
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    // Directory order is OS-dependent; sort so duplicate file names
    // always resolve to the same path.
    let mut paths: Vec<PathBuf> = entries.flatten().map(|entry| entry.path()).collect();
    paths.sort();
    for path in paths {
        if path.is_dir() {
            index_fonts_under(&path, depth + 1, index);
            continue;
        }
        let Some(name) = path.file_name().and_then(|v| v.to_str()) else {
            continue;
        };
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".ttf") || lower.ends_with(".otf") {
            index.entry(lower).or_insert(path);
        }
    }
}

fn load_system_face(
    store: &mut FaceStore,
    family: &str,
    bold: bool,
    italic: bool,
) -> Option<usize> {
    if store.file_index.is_none() {
        store.file_index = Some(build_file_index());
    }

    for candidate in font_file_candidates(family, bold, italic) {
        let Some(path) = store
            .file_index
            .as_ref()
            .and_then(|index| index.get(&candidate.to_ascii_lowercase()))
            .cloned()
        else {
            continue;
        };
        let Ok(bytes) = fs::read(&path) else {
            continue;
        };
        let Ok(face) = ttf_parser::Face::parse(&bytes, 0) else {
            continue;
        };
        let metrics = FaceMetrics::from_face(&face);
        let face_index = store.faces.len();
        store.faces.push(LoadedFace {
            data: Arc::new(bytes),
            metrics,
        });
        return Some(face_index);
    }
    None
}
