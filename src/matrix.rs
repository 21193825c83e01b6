//! Matrix registers: 2-D affine transforms with lazily cached inverses.

use kurbo::Point;

/// Inverse coefficients of a [`Matrix`], laid out like the forward matrix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Inverse {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Inverse {
    /// Map a point through the inverse transform.
    pub fn map(&self, p: Point) -> Point {
        Point::new(
            self.a * p.x + self.b * p.y + self.c,
            self.d * p.x + self.e * p.y + self.f,
        )
    }
}

/// A 2×3 affine transform
///
/// ```text
/// | a b c |
/// | d e f |
/// | 0 0 1 |
/// ```
///
/// with an optional cached inverse. Every mutation clears the cache; the
/// inverse is recomputed lazily from the determinant on demand.
#[derive(Clone, Copy, Debug)]
pub struct Matrix {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    e: f64,
    f: f64,
    inverse: Option<Inverse>,
}

impl Matrix {
    /// The identity transform, with its (identity) inverse already cached.
    pub fn identity() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 0.0,
            e: 1.0,
            f: 0.0,
            inverse: Some(Inverse {
                a: 1.0,
                b: 0.0,
                c: 0.0,
                d: 0.0,
                e: 1.0,
                f: 0.0,
            }),
        }
    }

    /// Forward coefficients as `[a, b, c, d, e, f]`.
    pub fn coeffs(&self) -> [f64; 6] {
        [self.a, self.b, self.c, self.d, self.e, self.f]
    }

    /// `a * b` as the standard 3×3 product over the implied bottom row.
    ///
    /// The result carries no cached inverse.
    pub fn multiply(a: Matrix, b: Matrix) -> Matrix {
        Matrix {
            a: a.a * b.a + a.b * b.d,
            b: a.a * b.b + a.b * b.e,
            c: a.a * b.c + a.b * b.f + a.c,
            d: a.d * b.a + a.e * b.d,
            e: a.d * b.b + a.e * b.e,
            f: a.d * b.c + a.e * b.f + a.f,
            inverse: None,
        }
    }

    /// Map a point through the forward transform.
    pub fn map(&self, p: Point) -> Point {
        Point::new(
            self.a * p.x + self.b * p.y + self.c,
            self.d * p.x + self.e * p.y + self.f,
        )
    }

    /// Premultiply a translation. A zero translation is a no-op.
    pub fn translate(&mut self, tx: f64, ty: f64) {
        assert!(tx.is_finite() && ty.is_finite(), "translation must be finite");
        if tx == 0.0 && ty == 0.0 {
            return;
        }
        let mut t = Matrix::identity();
        t.c = tx;
        t.f = ty;
        self.premultiply(t);
    }

    /// Premultiply a scale. Factors must be finite and non-zero; a unit
    /// scale is a no-op.
    pub fn scale(&mut self, sx: f64, sy: f64) {
        assert!(
            sx.is_finite() && sy.is_finite() && sx != 0.0 && sy != 0.0,
            "scale factors must be finite and non-zero"
        );
        if sx == 1.0 && sy == 1.0 {
            return;
        }
        let mut t = Matrix::identity();
        t.a = sx;
        t.e = sy;
        self.premultiply(t);
    }

    /// Premultiply a clockwise rotation (Y axis down) of `deg` degrees.
    ///
    /// The angle is reduced modulo 360 by remainder toward zero; a zero
    /// angle is a no-op.
    pub fn rotate(&mut self, deg: f64) {
        assert!(deg.is_finite(), "rotation must be finite");
        let deg = deg % 360.0;
        if deg == 0.0 {
            return;
        }
        let rad = deg.to_radians();
        let mut t = Matrix::identity();
        t.a = rad.cos();
        t.b = -rad.sin();
        t.d = rad.sin();
        t.e = rad.cos();
        self.premultiply(t);
    }

    /// The inverse, computed from the determinant and cached on first use.
    ///
    /// A singular forward matrix is a fault; the register operators never
    /// produce one.
    pub fn inverse(&mut self) -> Inverse {
        if let Some(inv) = self.inverse {
            return inv;
        }
        let det = self.a * self.e - self.b * self.d;
        assert!(det != 0.0 && det.is_finite(), "singular matrix has no inverse");
        let inv = Inverse {
            a: self.e / det,
            b: -self.b / det,
            c: (self.b * self.f - self.c * self.e) / det,
            d: -self.d / det,
            e: self.a / det,
            f: (self.c * self.d - self.a * self.f) / det,
        };
        self.inverse = Some(inv);
        inv
    }

    /// Whether an inverse is currently cached.
    pub fn is_inverse_cached(&self) -> bool {
        self.inverse.is_some()
    }

    fn premultiply(&mut self, t: Matrix) {
        *self = Matrix::multiply(t, *self);
    }
}
