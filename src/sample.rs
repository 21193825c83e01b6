//! The sample engine: inverse-mapped projection of a source area into a
//! target buffer through a resampling kernel, optional masking, and
//! premultiplied-alpha OVER compositing.
//!
//! The engine is stateless between calls; callers assemble a fresh
//! [`SampleParams`] per invocation. Boundary invariants (distinct, loaded
//! registers; valid sub-area; boundaries in range) must already hold --
//! violations are programming errors. Numeric degeneracies discovered
//! mid-loop (non-finite projections or composites) are faults. Empty
//! intersections return normally with zero pixels written.

use kurbo::Point;
use rayon::prelude::*;

use crate::buffer::{Channels, PixelBuffer};
use crate::pixel::{Argb8, ArgbPremul, quant_unit};
use crate::vm::Vm;

/// Resampling kernel selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Algorithm {
    Nearest,
    Bilinear,
    Bicubic,
}

/// Which side of the X pivot a procedural mask keeps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum XSide {
    /// Keep `x >= pivot`.
    Left,
    /// Keep `x <= pivot`.
    Right,
}

/// Which side of the Y pivot a procedural mask keeps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum YSide {
    /// Keep `y >= pivot`.
    Above,
    /// Keep `y <= pivot`.
    Below,
}

/// Masking selection for one sample call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MaskMode {
    /// Axis-aligned half-plane mask from normalized boundaries in [0, 1].
    Procedural {
        x_boundary: f64,
        y_boundary: f64,
        x_side: XSide,
        y_side: YSide,
    },
    /// Grayscale buffer, same dimensions as the target, scaling each
    /// sampled colour by `mask_byte / 255`.
    Raster { mask_buf: i32 },
}

impl MaskMode {
    /// The all-pass procedural mask.
    pub fn none() -> Self {
        Self::Procedural {
            x_boundary: 0.0,
            y_boundary: 0.0,
            x_side: XSide::Left,
            y_side: YSide::Above,
        }
    }
}

/// Source sub-rectangle in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SrcRect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

/// Everything one sample invocation needs.
#[derive(Clone, Copy, Debug)]
pub struct SampleParams {
    pub src_buf: i32,
    pub target_buf: i32,
    /// Sub-area within the source; `None` samples the whole source.
    pub src_area: Option<SrcRect>,
    /// Forward source-to-target transform register.
    pub t_matrix: i32,
    pub mask: MaskMode,
    pub algorithm: Algorithm,
}

impl Vm {
    /// Project a source area into the target buffer.
    #[tracing::instrument(skip(self), level = "debug")]
    pub fn sample(&mut self, p: &SampleParams) {
        assert!(
            p.src_buf != p.target_buf,
            "sample source and target must be distinct"
        );
        let mask_idx = match p.mask {
            MaskMode::Raster { mask_buf } => {
                assert!(
                    mask_buf != p.src_buf && mask_buf != p.target_buf,
                    "raster mask must be distinct from source and target"
                );
                Some(mask_buf)
            }
            MaskMode::Procedural {
                x_boundary,
                y_boundary,
                ..
            } => {
                assert!(
                    (0.0..=1.0).contains(&x_boundary) && (0.0..=1.0).contains(&y_boundary),
                    "procedural boundaries must lie in [0, 1]"
                );
                None
            }
        };

        let (sw, sh) = self.dim(p.src_buf);
        let rect = match p.src_area {
            None => SrcRect {
                x: 0,
                y: 0,
                w: sw,
                h: sh,
            },
            Some(r) => {
                assert!(
                    r.w >= 1
                        && r.h >= 1
                        && r.x >= 0
                        && r.y >= 0
                        && r.x <= sw - r.w
                        && r.y <= sh - r.h,
                    "sample sub-area outside source buffer"
                );
                r
            }
        };

        // Inverse is computed (and cached) before the parallel region so
        // the matrix register is only read inside it.
        let forward = *self.matrix(p.t_matrix);
        let inv = self.matrix_mut(p.t_matrix).inverse();

        let (tw, th) = self.dim(p.target_buf);

        // Bounding box in target space from the four projected corners.
        let (x0, y0) = (f64::from(rect.x), f64::from(rect.y));
        let (x1, y1) = (f64::from(rect.x + rect.w), f64::from(rect.y + rect.h));
        let corners = [
            Point::new(x0, y0),
            Point::new(x1, y0),
            Point::new(x0, y1),
            Point::new(x1, y1),
        ];
        let mut min = Point::new(f64::INFINITY, f64::INFINITY);
        let mut max = Point::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
        for c in corners {
            let q = forward.map(c);
            assert!(
                q.x.is_finite() && q.y.is_finite(),
                "non-finite corner projection in sample"
            );
            min.x = min.x.min(q.x);
            min.y = min.y.min(q.y);
            max.x = max.x.max(q.x);
            max.y = max.y.max(q.y);
        }
        let bx0 = min.x.floor() as i64;
        let bx1 = max.x.ceil() as i64;
        let by0 = min.y.floor() as i64;
        let by1 = max.y.ceil() as i64;
        if bx1 < 0 || by1 < 0 || bx0 >= i64::from(tw) || by0 >= i64::from(th) {
            return;
        }
        let mut bx0 = bx0.max(0) as i32;
        let mut bx1 = bx1.min(i64::from(tw) - 1) as i32;
        let mut by0 = by0.max(0) as i32;
        let mut by1 = by1.min(i64::from(th) - 1) as i32;

        // Procedural masking restricts the box to one quadrant.
        if let MaskMode::Procedural {
            x_boundary,
            y_boundary,
            x_side,
            y_side,
        } = p.mask
        {
            let px = pivot(x_boundary, tw);
            let py = pivot(y_boundary, th);
            match x_side {
                XSide::Left => bx0 = bx0.max(px),
                XSide::Right => bx1 = bx1.min(px),
            }
            match y_side {
                YSide::Above => by0 = by0.max(py),
                YSide::Below => by1 = by1.min(py),
            }
            if bx0 > bx1 || by0 > by1 {
                return;
            }
        }
        tracing::debug!(bx0, bx1, by0, by1, "sample box clipped");

        let (target, src, mask) = split_registers(
            self.buffers_mut(),
            p.target_buf as usize,
            p.src_buf as usize,
            mask_idx.map(|m| m as usize),
        );

        let src_view = SrcView {
            data: src.data().expect("sample source not loaded"),
            w: sw,
            h: sh,
            channels: src.channels(),
        };
        let mask_data = mask.map(|m| {
            assert_eq!(m.channels(), Channels::Gray, "raster mask must be grayscale");
            assert_eq!(m.dim(), (tw, th), "raster mask must match target dimensions");
            m.data().expect("raster mask not loaded")
        });

        let tch = target.channels();
        let stride = tw as usize * tch.count();
        let tdata = target.data_mut().expect("sample target not loaded");
        let lo = by0 as usize * stride;
        let hi = (by1 as usize + 1) * stride;

        tdata[lo..hi]
            .par_chunks_mut(stride)
            .enumerate()
            .for_each(|(k, row)| {
                let y = by0 + k as i32;
                for x in bx0..=bx1 {
                    let mval = match mask_data {
                        Some(m) => m[y as usize * tw as usize + x as usize],
                        None => 255,
                    };
                    if mask_data.is_some() && mval == 0 {
                        continue;
                    }

                    // Integer target coordinates are the sample points.
                    let sp = inv.map(Point::new(f64::from(x), f64::from(y)));
                    assert!(
                        sp.x.is_finite() && sp.y.is_finite(),
                        "non-finite projection in sample"
                    );
                    if sp.x < f64::from(rect.x)
                        || sp.x > f64::from(rect.x + rect.w)
                        || sp.y < f64::from(rect.y)
                        || sp.y > f64::from(rect.y + rect.h)
                    {
                        continue;
                    }

                    let mut c = match p.algorithm {
                        Algorithm::Nearest => src_view.nearest(sp.x, sp.y),
                        Algorithm::Bilinear => src_view.bilinear(sp.x, sp.y),
                        Algorithm::Bicubic => src_view.bicubic(sp.x, sp.y),
                    };
                    if mval != 255 {
                        c = c.scale(f64::from(mval) / 255.0);
                    }

                    let under = read_target(row, x, tch);
                    let f = c.over(under);
                    assert!(f.is_finite(), "non-finite composite in sample");
                    write_target(row, x, tch, f);
                }
            });
    }
}

/// Integer pivot of a normalized procedural boundary over an extent.
fn pivot(boundary: f64, extent: i32) -> i32 {
    if boundary <= 0.0 {
        0
    } else if boundary >= 1.0 {
        extent - 1
    } else {
        (boundary * f64::from(extent - 1)).floor() as i32
    }
}

/// Split the register arena into the mutable target and the read-only
/// source and mask, without copying.
fn split_registers(
    bufs: &mut [PixelBuffer],
    target: usize,
    src: usize,
    mask: Option<usize>,
) -> (&mut PixelBuffer, &PixelBuffer, Option<&PixelBuffer>) {
    let (left, at_and_right) = bufs.split_at_mut(target);
    let (t, right) = at_and_right
        .split_first_mut()
        .expect("target register index out of range");
    let s = if src < target {
        &left[src]
    } else {
        &right[src - target - 1]
    };
    let m = mask.map(|i| {
        if i < target {
            &left[i]
        } else {
            &right[i - target - 1]
        }
    });
    (t, s, m)
}

/// Read-only view of the source raster for the kernels.
struct SrcView<'a> {
    data: &'a [u8],
    w: i32,
    h: i32,
    channels: Channels,
}

impl SrcView<'_> {
    /// One texel promoted to premultiplied ARGB; coordinates edge-clamp.
    fn texel(&self, x: i32, y: i32) -> ArgbPremul {
        let x = x.clamp(0, self.w - 1) as usize;
        let y = y.clamp(0, self.h - 1) as usize;
        let i = (y * self.w as usize + x) * self.channels.count();
        let d = self.data;
        match self.channels {
            Channels::Gray => {
                let v = f64::from(d[i]) / 255.0;
                ArgbPremul {
                    a: 1.0,
                    r: v,
                    g: v,
                    b: v,
                }
            }
            Channels::Rgb => ArgbPremul {
                a: 1.0,
                r: f64::from(d[i]) / 255.0,
                g: f64::from(d[i + 1]) / 255.0,
                b: f64::from(d[i + 2]) / 255.0,
            },
            Channels::Argb => {
                ArgbPremul::from_straight(Argb8::new(d[i], d[i + 1], d[i + 2], d[i + 3]))
            }
        }
    }

    fn nearest(&self, px: f64, py: f64) -> ArgbPremul {
        self.texel(px.floor() as i32, py.floor() as i32)
    }

    fn bilinear(&self, px: f64, py: f64) -> ArgbPremul {
        // Pixel-centre convention: a sample exactly at a centre reproduces
        // that pixel.
        let xb = px - 0.5;
        let yb = py - 0.5;
        let x0 = xb.floor();
        let y0 = yb.floor();
        let fx = xb - x0;
        let fy = yb - y0;
        let (x0, y0) = (x0 as i32, y0 as i32);

        let c00 = self.texel(x0, y0) * ((1.0 - fx) * (1.0 - fy));
        let c10 = self.texel(x0 + 1, y0) * (fx * (1.0 - fy));
        let c01 = self.texel(x0, y0 + 1) * ((1.0 - fx) * fy);
        let c11 = self.texel(x0 + 1, y0 + 1) * (fx * fy);
        c00 + c10 + c01 + c11
    }

    fn bicubic(&self, px: f64, py: f64) -> ArgbPremul {
        let xb = px - 0.5;
        let yb = py - 0.5;
        let x0 = xb.floor();
        let y0 = yb.floor();
        let wx = catmull_weights(xb - x0);
        let wy = catmull_weights(yb - y0);
        let (x0, y0) = (x0 as i32, y0 as i32);

        let mut acc = ArgbPremul::TRANSPARENT;
        for (j, &wj) in wy.iter().enumerate() {
            for (i, &wi) in wx.iter().enumerate() {
                acc = acc + self.texel(x0 - 1 + i as i32, y0 - 1 + j as i32) * (wi * wj);
            }
        }
        acc.clamp_unit()
    }
}

/// Catmull-Rom (b = 0, c = 0.5) weights for taps at offsets -1..=2.
fn catmull_weights(t: f64) -> [f64; 4] {
    let t2 = t * t;
    let t3 = t2 * t;
    [
        0.5 * (-t3 + 2.0 * t2 - t),
        0.5 * (3.0 * t3 - 5.0 * t2 + 2.0),
        0.5 * (-3.0 * t3 + 4.0 * t2 + t),
        0.5 * (t3 - t2),
    ]
}

/// Promote the current target pixel; 1- and 3-channel targets read as
/// opaque.
fn read_target(row: &[u8], x: i32, channels: Channels) -> ArgbPremul {
    let i = x as usize * channels.count();
    match channels {
        Channels::Gray => {
            let v = f64::from(row[i]) / 255.0;
            ArgbPremul {
                a: 1.0,
                r: v,
                g: v,
                b: v,
            }
        }
        Channels::Rgb => ArgbPremul {
            a: 1.0,
            r: f64::from(row[i]) / 255.0,
            g: f64::from(row[i + 1]) / 255.0,
            b: f64::from(row[i + 2]) / 255.0,
        },
        Channels::Argb => {
            ArgbPremul::from_straight(Argb8::new(row[i], row[i + 1], row[i + 2], row[i + 3]))
        }
    }
}

fn write_target(row: &mut [u8], x: i32, channels: Channels, f: ArgbPremul) {
    let i = x as usize * channels.count();
    match channels {
        Channels::Gray => row[i] = f.to_gray(),
        Channels::Rgb => {
            row[i] = quant_unit(f.r);
            row[i + 1] = quant_unit(f.g);
            row[i + 2] = quant_unit(f.b);
        }
        Channels::Argb => {
            let c = f.unpremultiply();
            row[i] = c.a;
            row[i + 1] = c.r;
            row[i + 2] = c.g;
            row[i + 3] = c.b;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catmull_weights_partition_unity() {
        for &t in &[0.0, 0.1, 0.25, 0.5, 0.75, 0.99] {
            let w = catmull_weights(t);
            let sum: f64 = w.iter().sum();
            assert!((sum - 1.0).abs() < 1e-12, "t = {t}: sum {sum}");
        }
        assert_eq!(catmull_weights(0.0), [0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn pivot_endpoints_and_interior() {
        assert_eq!(pivot(0.0, 100), 0);
        assert_eq!(pivot(1.0, 100), 99);
        assert_eq!(pivot(0.5, 100), 49);
        assert_eq!(pivot(0.5, 101), 50);
    }

    fn edge_view() -> SrcView<'static> {
        // 4x1 grey step edge.
        static DATA: [u8; 4] = [0, 0, 255, 255];
        SrcView {
            data: &DATA,
            w: 4,
            h: 1,
            channels: Channels::Gray,
        }
    }

    #[test]
    fn kernels_reproduce_pixels_at_centres() {
        let v = edge_view();
        for (x, want) in [(0, 0.0), (1, 0.0), (2, 1.0), (3, 1.0)] {
            let centre = f64::from(x) + 0.5;
            assert_eq!(v.nearest(centre, 0.5).g, want);
            assert!((v.bilinear(centre, 0.5).g - want).abs() < 1e-12);
            assert!((v.bicubic(centre, 0.5).g - want).abs() < 1e-12);
        }
    }

    #[test]
    fn bilinear_and_bicubic_are_distinct_kernels() {
        let v = edge_view();
        let bl = v.bilinear(1.75, 0.5).g;
        let bc = v.bicubic(1.75, 0.5).g;
        assert!((bl - 0.25).abs() < 1e-12);
        // Catmull-Rom weights the outer taps, so an off-centre sample on
        // the edge differs from the linear blend.
        assert!((bc - bl).abs() > 1e-3, "bicubic {bc} vs bilinear {bl}");
    }

    #[test]
    fn bicubic_clamps_overshoot() {
        let v = edge_view();
        for step in 0..=20 {
            let px = 0.5 + 3.0 * f64::from(step) / 20.0;
            let c = v.bicubic(px, 0.5);
            assert!(c.g >= 0.0 && c.g <= 1.0);
        }
    }

    #[test]
    fn write_target_zero_alpha_stores_zeros() {
        let mut row = [9u8; 4];
        write_target(
            &mut row,
            0,
            Channels::Argb,
            ArgbPremul {
                a: 0.001,
                r: 0.5,
                g: 0.5,
                b: 0.5,
            },
        );
        assert_eq!(row, [0, 0, 0, 0]);
    }

    #[test]
    fn write_target_unpremultiplies() {
        let mut row = [0u8; 4];
        let half = ArgbPremul::from_straight(Argb8::new(128, 255, 0, 0));
        write_target(&mut row, 0, Channels::Argb, half);
        assert_eq!(row, [128, 255, 0, 0]);
    }

    #[test]
    fn gray_write_flattens_over_white() {
        let mut row = [0u8; 1];
        // Transparent result flattens to white.
        write_target(&mut row, 0, Channels::Gray, ArgbPremul::TRANSPARENT);
        assert_eq!(row[0], 255);
    }
}
