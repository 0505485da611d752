//! Easing and pose sampling for subtitle entrance animations.

use crate::style::Animation;

#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub enum Ease {
    Linear,
    OutQuad,
    OutCubic,
}

impl Ease {
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::OutQuad => 1.0 - (1.0 - t) * (1.0 - t),
            Self::OutCubic => 1.0 - (1.0 - t).powi(3),
        }
    }
}

/// Per-frame overlay draw state sampled from an [`Animation`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlayPose {
    /// Uniform scale about the overlay center.
    pub scale: f64,
    /// Opacity multiplier in `[0, 1]`.
    pub opacity: f32,
}

impl OverlayPose {
    pub const IDENTITY: OverlayPose = OverlayPose {
        scale: 1.0,
        opacity: 1.0,
    };
}

/// Pop-in starts slightly shrunken and fully transparent.
const POP_IN_START_SCALE: f64 = 0.85;

/// Sample the overlay pose `elapsed_sec` after the chunk became active.
///
/// Poses settle to identity at the end of the ramp; the animation never
/// extends the chunk's active window.
pub fn pose_at(animation: Animation, elapsed_sec: f64) -> OverlayPose {
    match animation {
        Animation::None => OverlayPose::IDENTITY,
        Animation::PopIn { duration_ms } => {
            if duration_ms == 0 {
                return OverlayPose::IDENTITY;
            }
            let ramp = f64::from(duration_ms) / 1000.0;
            let progress = Ease::OutCubic.apply(elapsed_sec / ramp);
            OverlayPose {
                scale: POP_IN_START_SCALE + (1.0 - POP_IN_START_SCALE) * progress,
                opacity: progress as f32,
            }
        }
    }
}
