pub use kurbo::Vec2;

/// Straight-alpha RGBA color with `f64` channels in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    #[serde(default = "one")]
    pub a: f64,
}

fn one() -> f64 {
    1.0
}

impl Color {
    pub const TRANSPARENT: Color = Color::rgba(0.0, 0.0, 0.0, 0.0);
    pub const WHITE: Color = Color::rgba(1.0, 1.0, 1.0, 1.0);

    pub const fn rgba(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self { r, g, b, a }
    }

    /// `h` is a phase in `[0, 1)`; `s` and `v` are clamped to `[0, 1]`.
    pub fn from_hsv(h: f64, s: f64, v: f64) -> Self {
        let h = crate::foundation::math::wrap_phase(h) * 6.0;
        let s = s.clamp(0.0, 1.0);
        let v = v.clamp(0.0, 1.0);
        let sector = h.floor();
        let f = h - sector;
        let p = v * (1.0 - s);
        let q = v * (1.0 - s * f);
        let t = v * (1.0 - s * (1.0 - f));
        let (r, g, b) = match sector as u8 {
            0 => (v, t, p),
            1 => (q, v, p),
            2 => (p, v, t),
            3 => (p, q, v),
            4 => (t, p, v),
            _ => (v, p, q),
        };
        Self::rgba(r, g, b, 1.0)
    }

    /// Porter-Duff source-over of `self` onto `dst`.
    pub fn over(self, dst: Color) -> Color {
        let a = self.a + dst.a * (1.0 - self.a);
        if a <= 0.0 {
            return Color::TRANSPARENT;
        }
        let mix = |s: f64, d: f64| (s * self.a + d * dst.a * (1.0 - self.a)) / a;
        Color::rgba(mix(self.r, dst.r), mix(self.g, dst.g), mix(self.b, dst.b), a)
    }

    pub fn to_array(self) -> [f64; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub(crate) fn from_slice(c: &[f64]) -> Self {
        Self::rgba(c[0], c[1], c[2], c[3])
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
