//! Viewport-width to render-scale policy
//!
//! Three discrete breakpoints (narrow / medium / wide) map to increasing
//! scale factors. The session never computes this itself; callers derive the
//! scale here and hand it to `ViewerSession::set_scale`.

use serde::{Deserialize, Serialize};

/// Breakpoints and factors for deriving a render scale
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScalePolicy {
    /// Widths below this are narrow
    #[serde(default = "default_narrow_below")]
    pub narrow_below: u32,
    /// Widths below this (and not narrow) are medium
    #[serde(default = "default_medium_below")]
    pub medium_below: u32,
    #[serde(default = "default_narrow_scale")]
    pub narrow_scale: f32,
    #[serde(default = "default_medium_scale")]
    pub medium_scale: f32,
    #[serde(default = "default_wide_scale")]
    pub wide_scale: f32,
}

fn default_narrow_below() -> u32 {
    600
}

fn default_medium_below() -> u32 {
    1024
}

fn default_narrow_scale() -> f32 {
    0.8
}

fn default_medium_scale() -> f32 {
    0.9
}

fn default_wide_scale() -> f32 {
    1.1
}

impl Default for ScalePolicy {
    fn default() -> Self {
        Self {
            narrow_below: default_narrow_below(),
            medium_below: default_medium_below(),
            narrow_scale: default_narrow_scale(),
            medium_scale: default_medium_scale(),
            wide_scale: default_wide_scale(),
        }
    }
}

impl ScalePolicy {
    /// Minimum factor any configuration can produce
    pub const MIN_SCALE: f32 = 0.1;

    /// Scale for a viewport `width_px` wide
    #[must_use]
    pub fn scale_for_width(&self, width_px: u32) -> f32 {
        let factor = if width_px < self.narrow_below {
            self.narrow_scale
        } else if width_px < self.medium_below {
            self.medium_scale
        } else {
            self.wide_scale
        };
        Self::clamp_factor(factor)
    }

    /// Clamp factor to valid range, handling NaN/Inf
    #[must_use]
    pub fn clamp_factor(factor: f32) -> f32 {
        if !factor.is_finite() {
            1.0
        } else {
            factor.max(Self::MIN_SCALE)
        }
    }
}
