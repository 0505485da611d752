//! Named subtitle style presets, resolved once before any rendering.

use crate::error::{ReelError, ReelResult};

/// Straight-alpha RGBA8 color used by subtitle styling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }
}

/// Where the subtitle block sits on the output canvas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PositionAnchor {
    /// Horizontally centered, block center at 3/4 of the canvas height.
    LowerThird,
    /// Horizontally and vertically centered.
    Center,
}

/// Intra-chunk entrance transition. Never extends the chunk's time window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Animation {
    None,
    /// Scale/opacity ramp over the first `duration_ms` of the chunk window.
    PopIn { duration_ms: u32 },
}

/// A fully resolved bundle of subtitle visual options.
#[derive(Clone, Debug, PartialEq)]
pub struct StyleSpec {
    pub name: &'static str,
    pub font_size_px: f32,
    pub font_weight: u16,
    pub fill: Rgba8,
    pub outline: Rgba8,
    pub outline_width_px: f32,
    pub max_chars_per_line: usize,
    pub anchor: PositionAnchor,
    pub animation: Animation,
}

/// Resolve a preset name to its concrete [`StyleSpec`].
///
/// Resolution happens once, before rendering; a bad name fails here and
/// never per-chunk.
pub fn resolve(name: &str) -> ReelResult<StyleSpec> {
    match name {
        "ultra_vibrant" => Ok(StyleSpec {
            name: "ultra_vibrant",
            font_size_px: 75.0,
            font_weight: 800,
            fill: Rgba8::opaque(0xff, 0xff, 0x00),
            outline: Rgba8::opaque(0x00, 0x00, 0x00),
            outline_width_px: 8.0,
            max_chars_per_line: 28,
            anchor: PositionAnchor::Center,
            animation: Animation::PopIn { duration_ms: 180 },
        }),
        "neon_pop" => Ok(StyleSpec {
            name: "neon_pop",
            font_size_px: 78.0,
            font_weight: 800,
            fill: Rgba8::opaque(0x00, 0xff, 0xff),
            outline: Rgba8::opaque(0xff, 0x00, 0xff),
            outline_width_px: 7.0,
            max_chars_per_line: 26,
            anchor: PositionAnchor::Center,
            animation: Animation::PopIn { duration_ms: 160 },
        }),
        "fire_text" => Ok(StyleSpec {
            name: "fire_text",
            font_size_px: 80.0,
            font_weight: 900,
            fill: Rgba8::opaque(0xff, 0x45, 0x00),
            outline: Rgba8::opaque(0xff, 0xff, 0xff),
            outline_width_px: 9.0,
            max_chars_per_line: 25,
            anchor: PositionAnchor::LowerThird,
            animation: Animation::None,
        }),
        other => Err(ReelError::unknown_style(other)),
    }
}

/// Names accepted by [`resolve`].
pub fn preset_names() -> [&'static str; 3] {
    ["ultra_vibrant", "neon_pop", "fire_text"]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_preset_name_resolves() {
        for name in preset_names() {
            let spec = resolve(name).unwrap();
            assert_eq!(spec.name, name);
            assert!(spec.font_size_px > 0.0);
            assert!(spec.outline_width_px > 0.0);
            assert!(spec.max_chars_per_line > 0);
        }
    }

    #[test]
    fn unknown_name_fails_at_resolution() {
        assert!(matches!(
            resolve("unknown_style"),
            Err(ReelError::UnknownStyle(_))
        ));
    }

    #[test]
    fn ultra_vibrant_matches_documented_values() {
        let s = resolve("ultra_vibrant").unwrap();
        assert_eq!(s.fill, Rgba8::opaque(255, 255, 0));
        assert_eq!(s.outline, Rgba8::opaque(0, 0, 0));
        assert_eq!(s.outline_width_px, 8.0);
        assert_eq!(s.max_chars_per_line, 28);
    }
}
