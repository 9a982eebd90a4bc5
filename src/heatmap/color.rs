/// Fixed translucency of the live overlay, independent of intensity.
pub const OVERLAY_ALPHA: f32 = 0.7;

/// Opaque 8-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

const GREEN_YELLOW: f64 = 255.0;
const GREEN_ORANGE: f64 = 165.0;

/// Map accumulated heat to yellow -> orange -> red.
///
/// Zero cells are never painted, so callers skip them; a non-positive
/// `max_intensity` maps everything to the bottom of the ramp.
pub fn color_for(intensity: f64, max_intensity: f64) -> Rgb {
    let t = normalized(intensity, max_intensity);
    let g = if t <= 0.5 {
        GREEN_YELLOW - (GREEN_YELLOW - GREEN_ORANGE) * (t / 0.5)
    } else {
        GREEN_ORANGE - GREEN_ORANGE * ((t - 0.5) / 0.5)
    };
    Rgb::new(255, g.round().clamp(0.0, 255.0) as u8, 0)
}

/// `min(intensity / max, 1)`, or 0 when the ratio is undefined.
pub fn normalized(intensity: f64, max_intensity: f64) -> f64 {
    if max_intensity <= 0.0 {
        return 0.0;
    }
    let t = intensity / max_intensity;
    if t.is_finite() {
        t.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_anchors() {
        assert_eq!(color_for(0.0, 10.0), Rgb::new(255, 255, 0));
        assert_eq!(color_for(5.0, 10.0), Rgb::new(255, 165, 0));
        assert_eq!(color_for(10.0, 10.0), Rgb::new(255, 0, 0));
    }

    #[test]
    fn clamps_above_max() {
        assert_eq!(color_for(20.0, 10.0), color_for(10.0, 10.0));
        assert_eq!(color_for(1e9, 3.0), Rgb::new(255, 0, 0));
    }

    #[test]
    fn interpolates_each_segment() {
        // t = 0.25 -> halfway yellow to orange.
        assert_eq!(color_for(2.5, 10.0).g, 210);
        // t = 0.75 -> halfway orange to red (82.5 rounds up).
        assert_eq!(color_for(7.5, 10.0).g, 83);
    }

    #[test]
    fn degenerate_max_is_not_nan() {
        assert_eq!(color_for(3.0, 0.0), Rgb::new(255, 255, 0));
        assert_eq!(normalized(0.0, 0.0), 0.0);
        assert_eq!(normalized(f64::NAN, 1.0), 0.0);
    }
}
