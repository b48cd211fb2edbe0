//! Burns generated text onto template images
//!
//! Each slot's text is wrapped to its layout box, shrunk until it fits, and
//! drawn white with a black outline.

use crate::templates::RendererLayout;
use crate::types::{Alignment, GeneratedMeme, MemeCategory, TemplateEntry, TextPosition};
use ab_glyph::{FontArc, PxScale};
use chrono::Local;
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_text_mut, text_size};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

const MIN_FONT_SIZE: u32 = 12;
const OUTLINE: i32 = 2;
const LINE_SPACING: f32 = 1.15;

/// Searched when no font path is configured
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/System/Library/Fonts/Supplemental/Impact.ttf",
    "/Library/Fonts/Impact.ttf",
    "C:\\Windows\\Fonts\\impact.ttf",
];

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Template image not found: {0}")]
    TemplateNotFound(PathBuf),

    #[error("Failed to decode {path}: {message}")]
    Decode { path: PathBuf, message: String },

    #[error("No layout registered for template '{0}'")]
    NoLayout(String),

    #[error("Layout for '{template}' has no box for slot '{slot}'")]
    MissingBox { template: String, slot: String },

    #[error("No usable font; set MEME_FONT_PATH")]
    NoFont,

    #[error("Failed to write {path}: {message}")]
    Write { path: PathBuf, message: String },
}

/// Load the configured font, else the first system font that parses
pub fn load_font(path: Option<&Path>) -> Option<FontArc> {
    let candidates: Vec<PathBuf> = match path {
        Some(p) => vec![p.to_path_buf()],
        None => SYSTEM_FONTS.iter().map(PathBuf::from).collect(),
    };
    candidates.into_iter().find_map(|p| {
        let bytes = std::fs::read(&p).ok()?;
        match FontArc::try_from_vec(bytes) {
            Ok(font) => {
                debug!("[Render] Using font {}", p.display());
                Some(font)
            }
            Err(e) => {
                warn!("[Render] Bad font {}: {}", p.display(), e);
                None
            }
        }
    })
}

/// Greedy word wrap; a single word wider than `max_width` keeps its own line
pub fn wrap_lines(text: &str, max_width: u32, measure: impl Fn(&str) -> u32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };
        if measure(&candidate) <= max_width || current.is_empty() {
            current = candidate;
        } else {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Left edge of a line inside its box
fn line_x(pos: &TextPosition, line_width: u32) -> i32 {
    let slack = pos.width.saturating_sub(line_width) as i32;
    let x = pos.x as i32;
    match pos.alignment {
        Alignment::Left => x,
        Alignment::Center => x + slack / 2,
        Alignment::Right => x + slack,
    }
}

/// `{category}/{NN}_{template}_{category}_{YYYYmmdd_HHMMSS}.png`
pub fn output_name(meme: &GeneratedMeme, index: usize) -> PathBuf {
    let category = meme.category.as_str();
    PathBuf::from(category).join(format!(
        "{:02}_{}_{}_{}.png",
        index,
        meme.template_id,
        category,
        Local::now().format("%Y%m%d_%H%M%S")
    ))
}

pub struct MemeRenderer {
    template_dir: PathBuf,
    output_dir: PathBuf,
    font: Option<FontArc>,
}

impl MemeRenderer {
    pub fn new(template_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>, font: Option<FontArc>) -> Self {
        Self {
            template_dir: template_dir.into(),
            output_dir: output_dir.into(),
            font,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Draw `meme` onto its template and write the PNG; returns the written path
    pub fn render(
        &self,
        meme: &GeneratedMeme,
        entry: &TemplateEntry,
        layout: Option<&RendererLayout>,
        index: usize,
    ) -> Result<PathBuf, RenderError> {
        let layout = layout.ok_or_else(|| RenderError::NoLayout(entry.id.clone()))?;
        let source = self.template_dir.join(&entry.filename);
        if !source.exists() {
            return Err(RenderError::TemplateNotFound(source));
        }
        let font = self.font.as_ref().ok_or(RenderError::NoFont)?;

        let mut canvas = image::open(&source)
            .map_err(|e| RenderError::Decode {
                path: source.clone(),
                message: e.to_string(),
            })?
            .to_rgba8();

        for slot in &entry.slot_names {
            let pos = layout.slots.get(slot).ok_or_else(|| RenderError::MissingBox {
                template: entry.id.clone(),
                slot: slot.clone(),
            })?;
            let text = meme.text_content.get(slot).map(String::as_str).unwrap_or_default();
            draw_slot(&mut canvas, font, pos, text, layout.font_size);
        }

        let target = self.output_dir.join(output_name(meme, index));
        let write_err = |message: String| RenderError::Write {
            path: target.clone(),
            message,
        };
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
        }
        canvas.save(&target).map_err(|e| write_err(e.to_string()))?;

        info!("[Render] Created {}", target.display());
        Ok(target)
    }
}

fn draw_slot(canvas: &mut RgbaImage, font: &FontArc, pos: &TextPosition, text: &str, font_size: u32) {
    if text.trim().is_empty() {
        return;
    }

    // Shrink until the wrapped block fits the box height
    let mut size = font_size.max(MIN_FONT_SIZE);
    let (scale, lines, line_height) = loop {
        let scale = PxScale::from(size as f32);
        let lines = wrap_lines(text, pos.width, |s| text_size(scale, font, s).0);
        let line_height = (size as f32 * LINE_SPACING).ceil() as u32;
        if line_height * lines.len() as u32 <= pos.height || size <= MIN_FONT_SIZE {
            break (scale, lines, line_height);
        }
        size -= 2;
    };

    let block = line_height * lines.len() as u32;
    let mut y = pos.y as i32 + (pos.height.saturating_sub(block) / 2) as i32;
    let black = Rgba([0, 0, 0, 255]);
    let white = Rgba([255, 255, 255, 255]);

    for line in &lines {
        let x = line_x(pos, text_size(scale, font, line).0);
        for dx in -OUTLINE..=OUTLINE {
            for dy in -OUTLINE..=OUTLINE {
                if dx != 0 || dy != 0 {
                    draw_text_mut(canvas, black, x + dx, y + dy, scale, font, line);
                }
            }
        }
        draw_text_mut(canvas, white, x, y, scale, font, line);
        y += line_height as i32;
    }
}

/// A rendered meme on disk
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedFile {
    pub filename: String,
    pub category: MemeCategory,
    /// Path under the `/memes` static mount
    pub url: String,
}

/// Rendered PNGs, newest file name first
pub fn list_generated(output_dir: &Path, category: Option<MemeCategory>) -> Vec<GeneratedFile> {
    let categories: Vec<MemeCategory> = match category {
        Some(c) => vec![c],
        None => MemeCategory::all().to_vec(),
    };

    let mut files = Vec::new();
    for category in categories {
        let Ok(entries) = std::fs::read_dir(output_dir.join(category.as_str())) else {
            continue;
        };
        for entry in entries.flatten() {
            let filename = entry.file_name().to_string_lossy().to_string();
            if filename.to_lowercase().ends_with(".png") {
                files.push(GeneratedFile {
                    url: format!("/memes/{}/{}", category.as_str(), filename),
                    filename,
                    category,
                });
            }
        }
    }
    files.sort_by(|a, b| b.filename.cmp(&a.filename));
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::models::tests::sample_result;
    use crate::templates::orchestrator::tests::write_png;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn meme(template: &str, text: &[(&str, &str)]) -> GeneratedMeme {
        GeneratedMeme {
            template_id: template.into(),
            category: MemeCategory::ProObaa,
            text_content: text.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect::<BTreeMap<_, _>>(),
            confidence: 1.0,
            source_comments: vec![],
            reasoning: String::new(),
            generated_at: Utc::now(),
        }
    }

    fn drake() -> (TemplateEntry, RendererLayout) {
        let result = sample_result("drake", &["reject_text", "approve_text"]);
        let layout: RendererLayout = serde_json::from_str(&result.code.renderer).unwrap();
        (result.registry_entry(), layout)
    }

    #[test]
    fn test_wrap_lines_by_width() {
        // one unit per char
        let measure = |s: &str| s.chars().count() as u32;
        assert_eq!(wrap_lines("aa bb cc dd", 5, measure), vec!["aa bb", "cc dd"]);
        assert_eq!(wrap_lines("supercalifragilistic no", 5, measure), vec!["supercalifragilistic", "no"]);
        assert!(wrap_lines("   ", 5, measure).is_empty());
    }

    #[test]
    fn test_line_alignment() {
        let mut pos = TextPosition { x: 10, y: 0, width: 100, height: 20, alignment: Alignment::Left };
        assert_eq!(line_x(&pos, 40), 10);
        pos.alignment = Alignment::Center;
        assert_eq!(line_x(&pos, 40), 40);
        pos.alignment = Alignment::Right;
        assert_eq!(line_x(&pos, 40), 70);
        assert_eq!(line_x(&pos, 400), 10);
    }

    #[test]
    fn test_output_name_pattern() {
        let name = output_name(&meme("drake", &[]), 3);
        let s = name.to_string_lossy().replace('\\', "/");
        let re = regex::Regex::new(r"^pro_obaa/03_drake_pro_obaa_\d{8}_\d{6}\.png$").unwrap();
        assert!(re.is_match(&s), "{}", s);
    }

    #[test]
    fn test_render_errors() {
        let dir = tempfile::tempdir().unwrap();
        let (entry, layout) = drake();
        let m = meme("drake", &[("reject_text", "a"), ("approve_text", "b")]);

        let renderer = MemeRenderer::new(dir.path(), dir.path().join("out"), None);
        assert!(matches!(renderer.render(&m, &entry, None, 1), Err(RenderError::NoLayout(_))));
        assert!(matches!(
            renderer.render(&m, &entry, Some(&layout), 1),
            Err(RenderError::TemplateNotFound(_))
        ));

        write_png(&dir.path().join(&entry.filename), 400, 300);
        assert!(matches!(renderer.render(&m, &entry, Some(&layout), 1), Err(RenderError::NoFont)));
    }

    const BUNDLED_FONT: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/assets/fonts/DejaVuSans-Bold.ttf");

    fn changed_pixels(img: &RgbaImage, x0: u32, y0: u32, x1: u32, y1: u32) -> usize {
        let background = Rgba([200, 200, 200, 255]);
        (y0..y1)
            .flat_map(|y| (x0..x1).map(move |x| (x, y)))
            .filter(|&(x, y)| *img.get_pixel(x, y) != background)
            .count()
    }

    #[test]
    fn test_render_draws_inside_slot_boxes() {
        let font = load_font(Some(Path::new(BUNDLED_FONT))).expect("bundled font");
        let dir = tempfile::tempdir().unwrap();
        let (entry, layout) = drake();
        write_png(&dir.path().join(&entry.filename), 400, 300);

        let renderer = MemeRenderer::new(dir.path(), dir.path().join("out"), Some(font));
        let m = meme("drake", &[("reject_text", "Generic Oscar bait"), ("approve_text", "")]);
        let path = renderer.render(&m, &entry, Some(&layout), 1).unwrap();

        let out = image::open(&path).unwrap().to_rgba8();
        assert_eq!(out.dimensions(), (400, 300));
        // reject_text box is (10, 10) 300x80, approve_text box is (10, 110) 300x80
        assert!(changed_pixels(&out, 10, 10, 310, 90) > 100);
        assert!(out.pixels().any(|p| *p == Rgba([255, 255, 255, 255])));
        assert_eq!(changed_pixels(&out, 0, 110, 400, 300), 0);

        let listed = list_generated(renderer.output_dir(), Some(MemeCategory::ProObaa));
        assert_eq!(listed.len(), 1);
        assert!(listed[0].url.starts_with("/memes/pro_obaa/01_drake_"));
    }

    #[test]
    fn test_list_generated_filters() {
        let dir = tempfile::tempdir().unwrap();
        for (cat, name) in [("pro_obaa", "01_a.png"), ("pro_obaa", "02_b.png"), ("anti_sinners", "01_c.png"), ("anti_sinners", "notes.txt")] {
            std::fs::create_dir_all(dir.path().join(cat)).unwrap();
            std::fs::write(dir.path().join(cat).join(name), b"x").unwrap();
        }
        assert_eq!(list_generated(dir.path(), None).len(), 3);
        let pro = list_generated(dir.path(), Some(MemeCategory::ProObaa));
        assert_eq!(pro.iter().map(|f| f.filename.as_str()).collect::<Vec<_>>(), vec!["02_b.png", "01_a.png"]);
        assert!(list_generated(&dir.path().join("missing"), None).is_empty());
    }
}
