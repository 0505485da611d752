//! Renders styled subtitle chunks to premultiplied RGBA8 overlay rasters.
//!
//! Layout is done with Parley against font bytes loaded once per renderer;
//! rasterization goes through `vello_cpu` glyph runs. Rendering is pure with
//! respect to its inputs: identical `(chunk, style, canvas)` produce
//! bit-identical rasters, which keeps the compositor deterministic.

use std::path::{Path, PathBuf};

use crate::core::Canvas;
use crate::error::{ReelError, ReelResult};
use crate::style::{PositionAnchor, Rgba8, StyleSpec};
use crate::timeline::SubtitleChunk;

/// Horizontal safe margin between the canvas edge and the text block.
const TEXT_MARGIN_PX: u32 = 80;

/// RGBA8 brush color used by Parley text layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct TextBrushRgba8 {
    pub(crate) r: u8,
    pub(crate) g: u8,
    pub(crate) b: u8,
    pub(crate) a: u8,
}

/// A rendered subtitle overlay bound to its chunk's display window.
#[derive(Clone, Debug)]
pub struct SubtitleOverlay {
    pub chunk: SubtitleChunk,
    /// Raster dimensions in pixels.
    pub width: u32,
    pub height: u32,
    /// Raster bytes in row-major premultiplied RGBA8.
    pub rgba8_premul: Vec<u8>,
    /// Placement of the raster's top-left corner on the canvas.
    pub dst_x: f64,
    pub dst_y: f64,
}

impl SubtitleOverlay {
    pub fn active_at(&self, t: f64) -> bool {
        self.chunk.active_at(t)
    }
}

/// Stateful renderer holding the Parley contexts and the resolved font.
pub struct SubtitleRenderer {
    canvas: Canvas,
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<TextBrushRgba8>,
    family_name: String,
    font: vello_cpu::peniko::FontData,
}

impl SubtitleRenderer {
    /// Construct a renderer for `canvas` from raw font bytes.
    pub fn new(canvas: Canvas, font_bytes: Vec<u8>) -> ReelResult<Self> {
        if canvas.width <= 2 * TEXT_MARGIN_PX {
            return Err(ReelError::invalid_input(format!(
                "canvas width {} leaves no room inside the {}px text margins",
                canvas.width, TEXT_MARGIN_PX
            )));
        }

        let mut font_ctx = parley::FontContext::default();
        let families = font_ctx
            .collection
            .register_fonts(parley::fontique::Blob::from(font_bytes.clone()), None);
        let family_id = families.first().map(|(id, _)| *id).ok_or_else(|| {
            ReelError::invalid_input("no font families registered from font bytes")
        })?;
        let family_name = font_ctx
            .collection
            .family_name(family_id)
            .ok_or_else(|| ReelError::invalid_input("registered font family has no name"))?
            .to_string();

        let font =
            vello_cpu::peniko::FontData::new(vello_cpu::peniko::Blob::from(font_bytes), 0);

        Ok(Self {
            canvas,
            font_ctx,
            layout_ctx: parley::LayoutContext::new(),
            family_name,
            font,
        })
    }

    /// Render one chunk with a resolved style into an overlay raster.
    pub fn render(
        &mut self,
        chunk: &SubtitleChunk,
        style: &StyleSpec,
    ) -> ReelResult<SubtitleOverlay> {
        if !style.font_size_px.is_finite() || style.font_size_px <= 0.0 {
            return Err(ReelError::invalid_input(
                "style font_size_px must be finite and > 0",
            ));
        }

        let lines = wrap_text(&chunk.text, style.max_chars_per_line);
        let layouts: Vec<parley::Layout<TextBrushRgba8>> = lines
            .iter()
            .map(|line| self.layout_line(line, style))
            .collect::<ReelResult<_>>()?;

        let safe_w = (self.canvas.width - 2 * TEXT_MARGIN_PX) as f64;
        let pad = f64::from(style.outline_width_px.ceil()) + 2.0;
        let block_h: f64 = layouts.iter().map(|l| f64::from(l.height())).sum();

        let raster_w = (safe_w + 2.0 * pad).ceil() as u32;
        let raster_h = (block_h + 2.0 * pad).ceil().max(1.0) as u32;
        let w16: u16 = raster_w
            .try_into()
            .map_err(|_| ReelError::invalid_input("subtitle raster width exceeds u16"))?;
        let h16: u16 = raster_h
            .try_into()
            .map_err(|_| ReelError::invalid_input("subtitle raster height exceeds u16"))?;

        let mut ctx = vello_cpu::RenderContext::new(w16, h16);

        let mut y_cursor = pad;
        for layout in &layouts {
            let line_w = f64::from(layout.width());
            let x_off = pad + (safe_w - line_w) / 2.0;

            // Outline first: fill the glyph run at ring offsets in the outline
            // color, then the face color on top. Uses only glyph fills, which
            // keeps the raster identical across runs.
            for (dx, dy) in ring_offsets(f64::from(style.outline_width_px)) {
                self.draw_line_glyphs(&mut ctx, layout, x_off + dx, y_cursor + dy, style.outline);
            }
            self.draw_line_glyphs(&mut ctx, layout, x_off, y_cursor, style.fill);

            y_cursor += f64::from(layout.height());
        }

        ctx.flush();
        let mut pixmap = vello_cpu::Pixmap::new(w16, h16);
        pixmap.data_as_u8_slice_mut().fill(0);
        ctx.render_to_pixmap(&mut pixmap);

        let dst_x = (f64::from(self.canvas.width) - f64::from(raster_w)) / 2.0;
        let anchor_center_y = match style.anchor {
            PositionAnchor::Center => f64::from(self.canvas.height) / 2.0,
            PositionAnchor::LowerThird => f64::from(self.canvas.height) * 0.75,
        };
        let dst_y = anchor_center_y - f64::from(raster_h) / 2.0;

        Ok(SubtitleOverlay {
            chunk: chunk.clone(),
            width: raster_w,
            height: raster_h,
            rgba8_premul: pixmap.data_as_u8_slice().to_vec(),
            dst_x,
            dst_y,
        })
    }

    fn layout_line(
        &mut self,
        line: &str,
        style: &StyleSpec,
    ) -> ReelResult<parley::Layout<TextBrushRgba8>> {
        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, line, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(std::borrow::Cow::Owned(self.family_name.clone())),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(style.font_size_px));
        builder.push_default(parley::style::StyleProperty::FontWeight(
            parley::style::FontWeight::new(f32::from(style.font_weight)),
        ));
        builder.push_default(parley::style::StyleProperty::Brush(TextBrushRgba8::default()));

        let mut layout: parley::Layout<TextBrushRgba8> = builder.build(line);
        layout.break_all_lines(None);
        Ok(layout)
    }

    fn draw_line_glyphs(
        &self,
        ctx: &mut vello_cpu::RenderContext,
        layout: &parley::Layout<TextBrushRgba8>,
        x_off: f64,
        y_off: f64,
        color: Rgba8,
    ) {
        ctx.set_transform(vello_cpu::kurbo::Affine::translate((x_off, y_off)));
        ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
            color.r, color.g, color.b, color.a,
        ));
        for line in layout.lines() {
            for item in line.items() {
                let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                    continue;
                };
                let glyphs = run.glyphs().map(|g| vello_cpu::Glyph {
                    id: g.id,
                    x: g.x,
                    y: g.y,
                });
                ctx.glyph_run(&self.font)
                    .font_size(run.run().font_size())
                    .fill_glyphs(glyphs);
            }
        }
    }
}

/// Wrap text at a character bound without breaking words (long words keep
/// their own line).
fn wrap_text(text: &str, max_chars_per_line: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if !current.is_empty()
            && current.chars().count() + 1 + word.chars().count() > max_chars_per_line
        {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }

    lines
}

/// Eight compass offsets at `radius` used to approximate a glyph outline.
fn ring_offsets(radius: f64) -> [(f64, f64); 8] {
    let d = radius * std::f64::consts::FRAC_1_SQRT_2;
    [
        (radius, 0.0),
        (-radius, 0.0),
        (0.0, radius),
        (0.0, -radius),
        (d, d),
        (d, -d),
        (-d, d),
        (-d, -d),
    ]
}

/// Locate a usable fallback font on the host system.
///
/// Mirrors the spirit of a "safe font list": well-known font directories are
/// scanned in order and the lexicographically first `.ttf`/`.otf` wins, so
/// the choice is stable on a given machine.
pub fn find_fallback_font() -> Option<PathBuf> {
    const FONT_DIRS: [&str; 5] = [
        "/usr/share/fonts",
        "/usr/local/share/fonts",
        "/System/Library/Fonts",
        "/Library/Fonts",
        "C:\\Windows\\Fonts",
    ];

    for dir in FONT_DIRS {
        let mut found = Vec::new();
        collect_fonts(Path::new(dir), &mut found, 0);
        found.sort();
        if let Some(p) = found.into_iter().next() {
            return Some(p);
        }
    }
    None
}

fn collect_fonts(dir: &Path, out: &mut Vec<PathBuf>, depth: usize) {
    if depth > 4 {
        return;
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_fonts(&path, out, depth + 1);
        } else if matches!(
            path.extension().and_then(|e| e.to_str()),
            Some(ext) if ext.eq_ignore_ascii_case("ttf") || ext.eq_ignore_ascii_case("otf")
        ) {
            out.push(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style;

    fn test_renderer() -> Option<SubtitleRenderer> {
        let font_path = find_fallback_font()?;
        let bytes = std::fs::read(font_path).ok()?;
        SubtitleRenderer::new(Canvas::SHORTS, bytes).ok()
    }

    fn chunk(text: &str) -> SubtitleChunk {
        SubtitleChunk {
            text: text.to_string(),
            start_sec: 1.0,
            end_sec: 3.0,
        }
    }

    #[test]
    fn wrap_respects_char_bound_without_breaking_words() {
        let lines = wrap_text("the quick brown fox jumps over the lazy dog", 15);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(line.chars().count() <= 15, "line too long: {line}");
        }
        assert_eq!(
            lines.join(" "),
            "the quick brown fox jumps over the lazy dog"
        );

        // A word longer than the bound still gets its own unbroken line.
        let lines = wrap_text("supercalifragilistic yes", 10);
        assert_eq!(lines[0], "supercalifragilistic");
    }

    #[test]
    fn ring_offsets_sit_on_the_radius() {
        for (dx, dy) in ring_offsets(8.0) {
            assert!(((dx * dx + dy * dy).sqrt() - 8.0).abs() < 1e-9);
        }
    }

    #[test]
    fn overlay_activity_follows_chunk_window() {
        let Some(mut renderer) = test_renderer() else {
            eprintln!("skipping: no system font found");
            return;
        };
        let spec = style::resolve("ultra_vibrant").unwrap();
        let overlay = renderer.render(&chunk("Hello world"), &spec).unwrap();
        assert!(!overlay.active_at(0.5));
        assert!(overlay.active_at(1.0));
        assert!(overlay.active_at(2.9));
        assert!(!overlay.active_at(3.0));
    }

    #[test]
    fn rendering_is_idempotent() {
        let Some(mut renderer) = test_renderer() else {
            eprintln!("skipping: no system font found");
            return;
        };
        let spec = style::resolve("neon_pop").unwrap();
        let c = chunk("Ninety seven percent of water");
        let a = renderer.render(&c, &spec).unwrap();
        let b = renderer.render(&c, &spec).unwrap();
        assert_eq!(a.width, b.width);
        assert_eq!(a.height, b.height);
        assert_eq!(a.rgba8_premul, b.rgba8_premul);
        assert_eq!((a.dst_x, a.dst_y), (b.dst_x, b.dst_y));
    }

    #[test]
    fn overlay_raster_is_nonempty_and_centered() {
        let Some(mut renderer) = test_renderer() else {
            eprintln!("skipping: no system font found");
            return;
        };
        let spec = style::resolve("ultra_vibrant").unwrap();
        let overlay = renderer.render(&chunk("Bright yellow words"), &spec).unwrap();

        assert_eq!(
            overlay.rgba8_premul.len(),
            (overlay.width * overlay.height * 4) as usize
        );
        // Some pixels must be inked.
        assert!(overlay.rgba8_premul.chunks_exact(4).any(|px| px[3] > 0));
        // Horizontally centered on the canvas.
        let center = overlay.dst_x + f64::from(overlay.width) / 2.0;
        assert!((center - 540.0).abs() < 1.0);
    }
}
