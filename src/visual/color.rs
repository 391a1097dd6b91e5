/// Anchor colours of the arousal/valence plane.
pub const HAPPY: [u8; 3] = [255, 214, 10];
pub const CALM: [u8; 3] = [20, 170, 160];
pub const ANGRY: [u8; 3] = [214, 32, 39];
pub const SAD: [u8; 3] = [33, 72, 196];

pub const BRIGHTEN_FACTOR: f32 = 2.0;

/// Colour with channels in 0.0-1.0.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub fn from_u8(c: [u8; 3]) -> Self {
        Self {
            r: c[0] as f32 / 255.0,
            g: c[1] as f32 / 255.0,
            b: c[2] as f32 / 255.0,
        }
    }

    pub fn channels(&self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }

    /// `#rrggbb`
    pub fn to_hex(&self) -> String {
        let [r, g, b] = self.channels().map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
        format!("#{:02x}{:02x}{:02x}", r, g, b)
    }

    fn mix(a: [u8; 3], b: [u8; 3], weight_a: f32) -> [f32; 3] {
        let mut out = [0.0f32; 3];
        for (i, v) in out.iter_mut().enumerate() {
            *v = weight_a * a[i] as f32 + (1.0 - weight_a) * b[i] as f32;
        }
        out
    }
}

/// Bilinear blend of the four anchors, normalized to 0.0-1.0.
///
/// Brightness weighs the positive pair (happy/calm) against the negative
/// pair (angry/sad); loudness weighs within each pair.
pub fn blend(loudness: f32, brightness: f32) -> Rgb {
    let loudness = clamp_unit(loudness);
    let brightness = clamp_unit(brightness);

    let positive = Rgb::mix(HAPPY, CALM, loudness);
    let negative = Rgb::mix(ANGRY, SAD, loudness);
    let c: [f32; 3] = std::array::from_fn(|i| {
        (brightness * positive[i] + (1.0 - brightness) * negative[i]) / 255.0
    });
    Rgb {
        r: c[0],
        g: c[1],
        b: c[2],
    }
}

/// Scale every channel by `factor`, clamped to 0.0-1.0.
pub fn brighten(color: Rgb, factor: f32) -> Rgb {
    let [r, g, b] = color.channels().map(|c| (c * factor).clamp(0.0, 1.0));
    Rgb { r, g, b }
}

pub fn emotion_color(loudness: f32, brightness: f32) -> Rgb {
    brighten(blend(loudness, brightness), BRIGHTEN_FACTOR)
}

fn clamp_unit(v: f32) -> f32 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_hit_anchor_colours() {
        assert_eq!(blend(1.0, 1.0), Rgb::from_u8(HAPPY));
        assert_eq!(blend(0.0, 1.0), Rgb::from_u8(CALM));
        assert_eq!(blend(1.0, 0.0), Rgb::from_u8(ANGRY));
        assert_eq!(blend(0.0, 0.0), Rgb::from_u8(SAD));
    }

    #[test]
    fn brightening_raises_or_saturates_every_channel() {
        for li in 0..=10 {
            for bi in 0..=10 {
                let base = blend(li as f32 / 10.0, bi as f32 / 10.0);
                let bright = emotion_color(li as f32 / 10.0, bi as f32 / 10.0);
                assert_ne!(base, bright);
                for (before, after) in base.channels().iter().zip(bright.channels()) {
                    assert!(after <= 1.0);
                    if *before < 1.0 {
                        assert!(after > *before, "{before} -> {after}");
                    } else {
                        assert_eq!(after, 1.0);
                    }
                }
            }
        }
    }

    #[test]
    fn brighten_clamps() {
        let c = brighten(Rgb { r: 0.8, g: 0.25, b: 0.0 }, 2.0);
        assert_eq!(c, Rgb { r: 1.0, g: 0.5, b: 0.0 });
    }

    #[test]
    fn out_of_range_inputs_are_clamped() {
        assert_eq!(blend(4.0, -1.0), blend(1.0, 0.0));
        assert_eq!(blend(f32::NAN, 1.0), blend(0.0, 1.0));
    }

    #[test]
    fn hex_rendering() {
        assert_eq!(Rgb::from_u8([255, 0, 16]).to_hex(), "#ff0010");
        assert_eq!(Rgb { r: 2.0, g: -1.0, b: 0.5 }.to_hex(), "#ff0080");
    }
}
