//! Maps an arbitrary background clip onto the fixed 9:16 output: a centered
//! crop in space, and an explicit trim-or-loop plan in time.

use rand::Rng;

use crate::core::Canvas;
use crate::error::{ReelError, ReelResult};
use crate::media::VideoSourceInfo;

/// Centered crop rectangle in source pixels plus the uniform scale that maps
/// it onto the output canvas.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CropTransform {
    pub src_x: f64,
    pub src_y: f64,
    pub src_w: f64,
    pub src_h: f64,
    pub scale: f64,
}

impl CropTransform {
    /// Largest centered canvas-aspect rectangle inside a `src_w` x `src_h`
    /// frame. Wider-than-target sources are cropped horizontally, narrower
    /// sources vertically; the output is always filled with no borders.
    pub fn compute(src_w: u32, src_h: u32, canvas: Canvas) -> ReelResult<Self> {
        if src_w == 0 || src_h == 0 {
            return Err(ReelError::incompatible_media(
                "background frame dimensions must be non-zero",
            ));
        }

        let (sw, sh) = (f64::from(src_w), f64::from(src_h));
        let target_aspect = canvas.aspect();
        let source_aspect = sw / sh;

        let (crop_w, crop_h) = if source_aspect > target_aspect {
            (sh * target_aspect, sh)
        } else {
            (sw, sw / target_aspect)
        };

        Ok(Self {
            src_x: (sw - crop_w) / 2.0,
            src_y: (sh - crop_h) / 2.0,
            src_w: crop_w,
            src_h: crop_h,
            scale: f64::from(canvas.height) / crop_h,
        })
    }

    /// Affine mapping source-frame pixels onto the output canvas.
    pub fn to_affine(&self) -> kurbo::Affine {
        kurbo::Affine::scale(self.scale)
            * kurbo::Affine::translate(kurbo::Vec2::new(-self.src_x, -self.src_y))
    }
}

/// How background playback time maps onto the output timeline.
///
/// An explicit tagged choice so the compositor can be exercised against each
/// branch independently.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum TrimPlan {
    /// The clip is at least as long as the target: play a random window.
    Trim { start_offset_sec: f64 },
    /// The clip is shorter: repeat it from the start, truncating the last
    /// copy.
    Loop { copies: u32, last_copy_sec: f64 },
}

impl TrimPlan {
    /// Source timestamp for output timestamp `t`.
    pub fn source_time_for(&self, t: f64, clip_duration_sec: f64) -> f64 {
        match *self {
            TrimPlan::Trim { start_offset_sec } => start_offset_sec + t,
            TrimPlan::Loop { .. } => {
                if clip_duration_sec <= 0.0 {
                    0.0
                } else {
                    t % clip_duration_sec
                }
            }
        }
    }

    /// Source seconds remaining before this plan wraps or runs out, seen from
    /// output timestamp `t`. `None` means the window is contiguous to the end.
    pub(crate) fn contiguous_until(&self, t: f64, clip_duration_sec: f64) -> Option<f64> {
        match *self {
            TrimPlan::Trim { .. } => None,
            TrimPlan::Loop { .. } => {
                Some((clip_duration_sec - self.source_time_for(t, clip_duration_sec)).max(0.0))
            }
        }
    }
}

/// Fit a background clip to `target_duration_sec`: compute the centered crop
/// and pick the trim/loop branch. The random trim offset is drawn uniformly
/// from the injected `rng` so callers can force determinism.
pub fn fit<R: Rng>(
    info: &VideoSourceInfo,
    target_duration_sec: f64,
    canvas: Canvas,
    rng: &mut R,
) -> ReelResult<(CropTransform, TrimPlan)> {
    if !target_duration_sec.is_finite() || target_duration_sec <= 0.0 {
        return Err(ReelError::invalid_duration(format!(
            "fit target duration must be > 0, got {target_duration_sec}"
        )));
    }
    if !info.duration_sec.is_finite() || info.duration_sec <= 0.0 {
        return Err(ReelError::incompatible_media(format!(
            "background clip '{}' has zero duration",
            info.source_path.display()
        )));
    }

    let crop = CropTransform::compute(info.width, info.height, canvas)?;

    let plan = if info.duration_sec >= target_duration_sec {
        let max_start = info.duration_sec - target_duration_sec;
        let start_offset_sec = if max_start > 0.0 {
            rng.gen_range(0.0..=max_start)
        } else {
            0.0
        };
        TrimPlan::Trim { start_offset_sec }
    } else {
        let copies = (target_duration_sec / info.duration_sec).ceil() as u32;
        let last_copy_sec = target_duration_sec - f64::from(copies - 1) * info.duration_sec;
        TrimPlan::Loop {
            copies,
            last_copy_sec,
        }
    };

    Ok((crop, plan))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng as _;
    use rand::rngs::StdRng;
    use std::path::PathBuf;

    fn clip(width: u32, height: u32, duration_sec: f64) -> VideoSourceInfo {
        VideoSourceInfo {
            source_path: PathBuf::from("clip.mp4"),
            width,
            height,
            fps_num: 30,
            fps_den: 1,
            duration_sec,
            has_audio: true,
        }
    }

    #[test]
    fn wide_source_crops_horizontally() {
        let c = CropTransform::compute(1920, 1080, Canvas::SHORTS).unwrap();
        assert!((c.src_h - 1080.0).abs() < 1e-9);
        assert!((c.src_w - 1080.0 * 9.0 / 16.0).abs() < 1e-9);
        assert!((c.src_y - 0.0).abs() < 1e-9);
        // Crop is centered and keeps the target aspect exactly.
        assert!((c.src_x - (1920.0 - c.src_w) / 2.0).abs() < 1e-9);
        assert!((c.src_w / c.src_h - 9.0 / 16.0).abs() < 1e-9);
    }

    #[test]
    fn tall_source_crops_vertically() {
        let c = CropTransform::compute(720, 1600, Canvas::SHORTS).unwrap();
        assert!((c.src_w - 720.0).abs() < 1e-9);
        assert!((c.src_h - 720.0 * 16.0 / 9.0).abs() < 1e-9);
        assert!((c.src_x - 0.0).abs() < 1e-9);
        assert!((c.src_w / c.src_h - 9.0 / 16.0).abs() < 1e-9);
    }

    #[test]
    fn crop_affine_maps_crop_rect_onto_canvas() {
        let c = CropTransform::compute(1920, 1080, Canvas::SHORTS).unwrap();
        let a = c.to_affine();
        let top_left = a * kurbo::Point::new(c.src_x, c.src_y);
        let bottom_right = a * kurbo::Point::new(c.src_x + c.src_w, c.src_y + c.src_h);
        assert!((top_left.x - 0.0).abs() < 1e-6);
        assert!((top_left.y - 0.0).abs() < 1e-6);
        assert!((bottom_right.x - 1080.0).abs() < 1e-6);
        assert!((bottom_right.y - 1920.0).abs() < 1e-6);
    }

    #[test]
    fn long_clip_trims_with_offset_inside_valid_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let (_, plan) = fit(&clip(1920, 1080, 60.0), 12.0, Canvas::SHORTS, &mut rng).unwrap();
            let TrimPlan::Trim { start_offset_sec } = plan else {
                panic!("expected Trim for a long clip");
            };
            assert!((0.0..=48.0).contains(&start_offset_sec));
        }
    }

    #[test]
    fn equal_length_clip_trims_at_zero() {
        let mut rng = StdRng::seed_from_u64(7);
        let (_, plan) = fit(&clip(1920, 1080, 12.0), 12.0, Canvas::SHORTS, &mut rng).unwrap();
        assert_eq!(
            plan,
            TrimPlan::Trim {
                start_offset_sec: 0.0
            }
        );
    }

    #[test]
    fn short_clip_loops_with_truncated_last_copy() {
        let mut rng = StdRng::seed_from_u64(7);
        let (_, plan) = fit(&clip(1920, 1080, 5.0), 12.0, Canvas::SHORTS, &mut rng).unwrap();
        let TrimPlan::Loop {
            copies,
            last_copy_sec,
        } = plan
        else {
            panic!("expected Loop for a short clip");
        };
        assert_eq!(copies, 3);
        assert!((last_copy_sec - 2.0).abs() < 1e-9);
        // Window length is exactly the target duration.
        assert!((f64::from(copies - 1) * 5.0 + last_copy_sec - 12.0).abs() < 1e-9);
    }

    #[test]
    fn loop_plan_wraps_source_time() {
        let plan = TrimPlan::Loop {
            copies: 3,
            last_copy_sec: 2.0,
        };
        assert!((plan.source_time_for(0.0, 5.0) - 0.0).abs() < 1e-9);
        assert!((plan.source_time_for(4.9, 5.0) - 4.9).abs() < 1e-9);
        assert!((plan.source_time_for(5.0, 5.0) - 0.0).abs() < 1e-9);
        assert!((plan.source_time_for(11.5, 5.0) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn trim_plan_offsets_source_time() {
        let plan = TrimPlan::Trim {
            start_offset_sec: 3.25,
        };
        assert!((plan.source_time_for(4.0, 60.0) - 7.25).abs() < 1e-9);
        assert_eq!(plan.contiguous_until(4.0, 60.0), None);
    }

    #[test]
    fn zero_duration_clip_is_incompatible() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!(matches!(
            fit(&clip(1920, 1080, 0.0), 12.0, Canvas::SHORTS, &mut rng),
            Err(ReelError::IncompatibleMedia(_))
        ));
    }
}
