//! Pixel and colour primitives shared by the register arena, the codec
//! bridge, and the sample engine.

/// Non-premultiplied 8-bit ARGB colour. Alpha 0 is fully transparent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Argb8 {
    pub a: u8,
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Argb8 {
    pub fn new(a: u8, r: u8, g: u8, b: u8) -> Self {
        Self { a, r, g, b }
    }

    /// Unpack a packed 32-bit ARGB value.
    pub fn unpack(v: u32) -> Self {
        Self {
            a: (v >> 24) as u8,
            r: (v >> 16) as u8,
            g: (v >> 8) as u8,
            b: v as u8,
        }
    }

    /// Pack into a 32-bit ARGB value.
    pub fn pack(self) -> u32 {
        (u32::from(self.a) << 24)
            | (u32::from(self.r) << 16)
            | (u32::from(self.g) << 8)
            | u32::from(self.b)
    }

    /// Alpha-composite against opaque white, yielding an opaque colour.
    pub fn down_rgb(self) -> Self {
        if self.a == 255 {
            return self;
        }
        let a = f64::from(self.a) / 255.0;
        let flat = |c: u8| quant_unit(f64::from(c) / 255.0 * a + (1.0 - a));
        Self {
            a: 255,
            r: flat(self.r),
            g: flat(self.g),
            b: flat(self.b),
        }
    }

    /// Flatten against white, then reduce to the BT.709 luma byte.
    pub fn down_gray(self) -> u8 {
        let f = self.down_rgb();
        quant_unit(luma(
            f64::from(f.r) / 255.0,
            f64::from(f.g) / 255.0,
            f64::from(f.b) / 255.0,
        ))
    }
}

/// Replicate a grey byte across RGB.
pub fn gray_to_rgb(v: u8) -> [u8; 3] {
    [v, v, v]
}

/// Promote a grey byte to an opaque ARGB colour.
pub fn gray_to_argb(v: u8) -> Argb8 {
    Argb8::new(255, v, v, v)
}

/// Promote an RGB triple to an opaque ARGB colour.
pub fn rgb_to_argb(r: u8, g: u8, b: u8) -> Argb8 {
    Argb8::new(255, r, g, b)
}

/// BT.709 luma `0.2126 r + 0.7152 g + 0.0722 b`, arranged so achromatic
/// inputs reproduce exactly.
pub(crate) fn luma(r: f64, g: f64, b: f64) -> f64 {
    b + 0.2126 * (r - b) + 0.7152 * (g - b)
}

/// Saturating `floor(v * 255)` quantization from unit range to a byte.
pub fn quant_unit(v: f64) -> u8 {
    debug_assert!(!v.is_nan());
    if v <= 0.0 {
        0
    } else if v >= 1.0 {
        255
    } else {
        (v * 255.0).floor() as u8
    }
}

/// Premultiplied ARGB with every component carried as an f64 in unit range.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ArgbPremul {
    pub a: f64,
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl ArgbPremul {
    pub const TRANSPARENT: Self = Self {
        a: 0.0,
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    /// Promote a non-premultiplied byte colour into premultiplied unit space.
    pub fn from_straight(c: Argb8) -> Self {
        let a = f64::from(c.a) / 255.0;
        Self {
            a,
            r: f64::from(c.r) / 255.0 * a,
            g: f64::from(c.g) / 255.0 * a,
            b: f64::from(c.b) / 255.0 * a,
        }
    }

    /// Source-over composite: `self + under * (1 - self.a)`.
    pub fn over(self, under: Self) -> Self {
        let k = 1.0 - self.a;
        Self {
            a: self.a + under.a * k,
            r: self.r + under.r * k,
            g: self.g + under.g * k,
            b: self.b + under.b * k,
        }
    }

    /// Scale every component, alpha included.
    pub fn scale(self, k: f64) -> Self {
        Self {
            a: self.a * k,
            r: self.r * k,
            g: self.g * k,
            b: self.b * k,
        }
    }

    pub fn clamp_unit(self) -> Self {
        Self {
            a: self.a.clamp(0.0, 1.0),
            r: self.r.clamp(0.0, 1.0),
            g: self.g.clamp(0.0, 1.0),
            b: self.b.clamp(0.0, 1.0),
        }
    }

    pub fn is_finite(self) -> bool {
        self.a.is_finite() && self.r.is_finite() && self.g.is_finite() && self.b.is_finite()
    }

    /// Back to non-premultiplied bytes; a zero quantized alpha collapses
    /// to transparent black.
    pub fn unpremultiply(self) -> Argb8 {
        let af = self.a.clamp(0.0, 1.0);
        let a = quant_unit(af);
        if a == 0 {
            return Argb8::new(0, 0, 0, 0);
        }
        Argb8::new(
            a,
            quant_unit(self.r / af),
            quant_unit(self.g / af),
            quant_unit(self.b / af),
        )
    }

    /// Flatten over opaque white and reduce to a luma byte.
    pub fn to_gray(self) -> u8 {
        // luma(rgb + k) with the white contribution factored out, so a
        // fully transparent colour lands exactly on white
        quant_unit(luma(self.r, self.g, self.b) + (1.0 - self.a))
    }
}

impl std::ops::Add for ArgbPremul {
    type Output = Self;

    fn add(self, o: Self) -> Self {
        Self {
            a: self.a + o.a,
            r: self.r + o.r,
            g: self.g + o.g,
            b: self.b + o.b,
        }
    }
}

impl std::ops::Mul<f64> for ArgbPremul {
    type Output = Self;

    fn mul(self, k: f64) -> Self {
        self.scale(k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_round_trip() {
        let c = Argb8::new(0x12, 0x34, 0x56, 0x78);
        assert_eq!(c.pack(), 0x1234_5678);
        assert_eq!(Argb8::unpack(c.pack()), c);
    }

    #[test]
    fn down_rgb_opaque_is_identity() {
        let c = Argb8::new(255, 10, 20, 30);
        assert_eq!(c.down_rgb(), c);
    }

    #[test]
    fn down_rgb_transparent_is_white() {
        let c = Argb8::new(0, 10, 20, 30);
        assert_eq!(c.down_rgb(), Argb8::new(255, 255, 255, 255));
    }

    #[test]
    fn down_gray_uses_luma_weights() {
        // 0.2126*10 + 0.7152*20 + 0.0722*30 = 18.596
        assert_eq!(Argb8::new(255, 10, 20, 30).down_gray(), 18);
    }

    #[test]
    fn from_straight_premultiplies() {
        let p = ArgbPremul::from_straight(Argb8::new(128, 255, 0, 0));
        assert!((p.a - 128.0 / 255.0).abs() < 1e-12);
        assert!((p.r - p.a).abs() < 1e-12);
        assert_eq!(p.g, 0.0);
    }

    #[test]
    fn over_transparent_under_is_identity() {
        let p = ArgbPremul::from_straight(Argb8::new(128, 200, 100, 50));
        assert_eq!(p.over(ArgbPremul::TRANSPARENT), p);
    }

    #[test]
    fn over_opaque_source_hides_under() {
        let src = ArgbPremul::from_straight(Argb8::new(255, 255, 0, 0));
        let under = ArgbPremul::from_straight(Argb8::new(255, 0, 255, 0));
        assert_eq!(src.over(under), src);
    }

    #[test]
    fn premultiply_round_trip_at_extremes() {
        for a in [1u8, 64, 128, 254, 255] {
            let c = Argb8::new(a, 255, 0, 255);
            assert_eq!(ArgbPremul::from_straight(c).unpremultiply(), c);
        }
        assert_eq!(
            ArgbPremul::from_straight(Argb8::new(0, 9, 9, 9)).unpremultiply(),
            Argb8::new(0, 0, 0, 0)
        );
    }

    #[test]
    fn quant_floors_and_saturates() {
        assert_eq!(quant_unit(0.0), 0);
        assert_eq!(quant_unit(1.0), 255);
        assert_eq!(quant_unit(2.0), 255);
        assert_eq!(quant_unit(-0.5), 0);
        assert_eq!(quant_unit(0.5), 127);
        // byte -> unit -> byte is exact for every byte value
        for k in 0..=255u8 {
            assert_eq!(quant_unit(f64::from(k) / 255.0), k);
        }
    }
}
