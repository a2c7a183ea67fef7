//! Axis-aligned bounds and the normalization that frames a model.

pub type Vec3 = [f32; 3];

/// Column-major 4×4 matrix, the layout glTF uses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat4(pub [f32; 16]);

impl Mat4 {
    pub const IDENTITY: Mat4 = Mat4([
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]);

    /// `T * R * S`, rotation given as a unit quaternion `[x, y, z, w]`.
    pub fn from_trs(translation: Vec3, rotation: [f32; 4], scale: Vec3) -> Self {
        let [x, y, z, w] = rotation;
        let (x2, y2, z2) = (x + x, y + y, z + z);
        let (xx, xy, xz) = (x * x2, x * y2, x * z2);
        let (yy, yz, zz) = (y * y2, y * z2, z * z2);
        let (wx, wy, wz) = (w * x2, w * y2, w * z2);
        let [sx, sy, sz] = scale;
        let [tx, ty, tz] = translation;
        Mat4([
            (1.0 - (yy + zz)) * sx,
            (xy + wz) * sx,
            (xz - wy) * sx,
            0.0,
            (xy - wz) * sy,
            (1.0 - (xx + zz)) * sy,
            (yz + wx) * sy,
            0.0,
            (xz + wy) * sz,
            (yz - wx) * sz,
            (1.0 - (xx + yy)) * sz,
            0.0,
            tx,
            ty,
            tz,
            1.0,
        ])
    }

    pub fn mul(&self, rhs: &Mat4) -> Mat4 {
        let (a, b) = (&self.0, &rhs.0);
        let mut out = [0.0; 16];
        for col in 0..4 {
            for row in 0..4 {
                out[col * 4 + row] = (0..4).map(|k| a[k * 4 + row] * b[col * 4 + k]).sum();
            }
        }
        Mat4(out)
    }

    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        let m = &self.0;
        [
            m[0] * p[0] + m[4] * p[1] + m[8] * p[2] + m[12],
            m[1] * p[0] + m[5] * p[1] + m[9] * p[2] + m[13],
            m[2] * p[0] + m[6] * p[1] + m[10] * p[2] + m[14],
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Contains nothing; extending it with a point yields that point.
    pub const EMPTY: Aabb = Aabb {
        min: [f32::INFINITY; 3],
        max: [f32::NEG_INFINITY; 3],
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn is_empty(&self) -> bool {
        (0..3).any(|i| !(self.min[i] <= self.max[i]))
    }

    pub fn extend(&mut self, p: Vec3) {
        for i in 0..3 {
            self.min[i] = self.min[i].min(p[i]);
            self.max[i] = self.max[i].max(p[i]);
        }
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        if other.is_empty() {
            return *self;
        }
        let mut out = *self;
        out.extend(other.min);
        out.extend(other.max);
        out
    }

    pub fn size(&self) -> Vec3 {
        if self.is_empty() {
            return [0.0; 3];
        }
        [0, 1, 2].map(|i| self.max[i] - self.min[i])
    }

    pub fn center(&self) -> Vec3 {
        if self.is_empty() {
            return [0.0; 3];
        }
        [0, 1, 2].map(|i| (self.min[i] + self.max[i]) * 0.5)
    }

    pub fn max_dimension(&self) -> f32 {
        let [x, y, z] = self.size();
        x.max(y).max(z)
    }

    /// Bounds of the box after `m`, computed from its eight corners.
    pub fn transformed(&self, m: &Mat4) -> Aabb {
        if self.is_empty() {
            return *self;
        }
        let mut out = Aabb::EMPTY;
        for corner in 0..8 {
            let pick = |axis: usize| {
                if corner & (1 << axis) == 0 {
                    self.min[axis]
                } else {
                    self.max[axis]
                }
            };
            out.extend(m.transform_point([pick(0), pick(1), pick(2)]));
        }
        out
    }
}

/// Uniform scale plus translation applied to a model before display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    pub scale: f32,
    pub translation: Vec3,
}

impl Normalization {
    pub const IDENTITY: Normalization = Normalization {
        scale: 1.0,
        translation: [0.0; 3],
    };

    /// Scales so the longest side equals `target_size` and moves the box
    /// center to the origin. Empty or zero-size boxes keep scale 1.
    pub fn fit(bounds: &Aabb, target_size: f32) -> Self {
        if bounds.is_empty() {
            return Self::IDENTITY;
        }
        let max_dim = bounds.max_dimension();
        let scale = if max_dim > f32::EPSILON && max_dim.is_finite() {
            target_size / max_dim
        } else {
            1.0
        };
        let center = bounds.center();
        Self {
            scale,
            translation: center.map(|c| -c * scale),
        }
    }

    pub fn apply(&self, p: Vec3) -> Vec3 {
        [0, 1, 2].map(|i| p[i] * self.scale + self.translation[i])
    }

    pub fn apply_bounds(&self, bounds: &Aabb) -> Aabb {
        if bounds.is_empty() {
            return *bounds;
        }
        Aabb::new(self.apply(bounds.min), self.apply(bounds.max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-4;

    fn close(a: Vec3, b: Vec3) -> bool {
        (0..3).all(|i| (a[i] - b[i]).abs() < EPS)
    }

    #[test]
    fn test_fit_centers_and_scales_to_target() {
        let bounds = Aabb::new([2.0, 4.0, 6.0], [12.0, 6.0, 8.0]);
        let n = Normalization::fit(&bounds, 30.0);
        assert!((n.scale - 3.0).abs() < EPS);

        let framed = n.apply_bounds(&bounds);
        assert!(close(framed.center(), [0.0; 3]));
        assert!((framed.max_dimension() - 30.0).abs() < EPS);
    }

    #[test]
    fn test_fit_tiny_and_huge_models() {
        for (min, max) in [
            ([-0.01, 0.0, 0.0], [0.01, 0.005, 0.0]),
            ([-500.0, -20.0, 100.0], [1500.0, 20.0, 140.0]),
        ] {
            let bounds = Aabb::new(min, max);
            let framed = Normalization::fit(&bounds, 30.0).apply_bounds(&bounds);
            assert!(close(framed.center(), [0.0; 3]), "{framed:?}");
            assert!((framed.max_dimension() - 30.0).abs() < 1e-3, "{framed:?}");
        }
    }

    #[test]
    fn test_degenerate_boxes_keep_unit_scale() {
        assert_eq!(Normalization::fit(&Aabb::EMPTY, 30.0), Normalization::IDENTITY);

        let point = Aabb::new([1.0, 2.0, 3.0], [1.0, 2.0, 3.0]);
        let n = Normalization::fit(&point, 30.0);
        assert_eq!(n.scale, 1.0);
        assert!(close(n.apply([1.0, 2.0, 3.0]), [0.0; 3]));
    }

    #[test]
    fn test_transformed_bounds() {
        let unit = Aabb::new([0.0; 3], [1.0; 3]);
        let moved = unit.transformed(&Mat4::from_trs([10.0, 0.0, 0.0], [0.0, 0.0, 0.0, 1.0], [2.0; 3]));
        assert!(close(moved.min, [10.0, 0.0, 0.0]));
        assert!(close(moved.max, [12.0, 2.0, 2.0]));

        // 90° about Z maps +X onto +Y.
        let half = std::f32::consts::FRAC_1_SQRT_2;
        let rotated = unit.transformed(&Mat4::from_trs([0.0; 3], [0.0, 0.0, half, half], [1.0; 3]));
        assert!(close(rotated.min, [-1.0, 0.0, 0.0]));
        assert!(close(rotated.max, [0.0, 1.0, 1.0]));
    }

    #[test]
    fn test_mul_composes_parent_first() {
        let parent = Mat4::from_trs([5.0, 0.0, 0.0], [0.0, 0.0, 0.0, 1.0], [1.0; 3]);
        let child = Mat4::from_trs([0.0; 3], [0.0, 0.0, 0.0, 1.0], [2.0; 3]);
        let world = parent.mul(&child);
        assert!(close(world.transform_point([1.0, 1.0, 1.0]), [7.0, 2.0, 2.0]));
        assert_eq!(Mat4::IDENTITY.mul(&world), world);
    }

    #[test]
    fn test_union_ignores_empty() {
        let a = Aabb::new([0.0; 3], [1.0; 3]);
        assert_eq!(a.union(&Aabb::EMPTY), a);
        assert_eq!(Aabb::EMPTY.union(&a), a);
    }
}
