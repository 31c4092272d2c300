use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, MulAssign, Neg, Sub, SubAssign};

/// 3D point or direction. Serialized as `[x, y, z]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3::new(0.0, 0.0, 0.0);
    pub const X: Vec3 = Vec3::new(1.0, 0.0, 0.0);
    pub const Y: Vec3 = Vec3::new(0.0, 1.0, 0.0);
    pub const Z: Vec3 = Vec3::new(0.0, 0.0, 1.0);
    /// Straight down, the direction gravity pulls.
    pub const DOWN: Vec3 = Vec3::new(0.0, 0.0, -1.0);

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Scales to unit length in place. A zero vector is left untouched.
    pub fn normalize(&mut self) -> &mut Self {
        let len = self.length();
        if len > 0.0 {
            *self *= 1.0 / len;
        }
        self
    }

    pub fn normalized(mut self) -> Self {
        self.normalize();
        self
    }

    pub fn dot(&self, other: Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(&self, other: Vec3) -> Vec3 {
        Vec3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn length(&self) -> f64 {
        self.dot(*self).sqrt()
    }

    pub fn distance_to(&self, other: Vec3) -> f64 {
        (*self - other).length()
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.z == 0.0
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Rotates in place around `axis` by `angle_degrees` (Rodrigues' formula):
    /// `v cos t + (k x v) sin t + k (k . v)(1 - cos t)` with `k` the unit axis.
    /// A zero axis leaves the vector unchanged.
    pub fn rotate_around(&mut self, axis: Vec3, angle_degrees: f64) -> &mut Self {
        let k = axis.normalized();
        if k.is_zero() {
            return self;
        }
        let (sin, cos) = angle_degrees.to_radians().sin_cos();
        let v = *self;
        *self = v * cos + k.cross(v) * sin + k * (k.dot(v) * (1.0 - cos));
        self
    }

    pub fn rotated_around(mut self, axis: Vec3, angle_degrees: f64) -> Self {
        self.rotate_around(axis, angle_degrees);
        self
    }

    /// Angle to `other` in degrees. Zero vectors give 0.
    pub fn angle_to(&self, other: Vec3) -> f64 {
        let denom = self.length() * other.length();
        if denom == 0.0 {
            return 0.0;
        }
        (self.dot(other) / denom).clamp(-1.0, 1.0).acos().to_degrees()
    }

    /// Closest point to `self` on the segment `[a, b]`. A degenerate segment yields `a`.
    pub fn closest_on_segment(&self, a: Vec3, b: Vec3) -> Vec3 {
        let ab = b - a;
        let denom = ab.dot(ab);
        if denom == 0.0 {
            return a;
        }
        let t = ((*self - a).dot(ab) / denom).clamp(0.0, 1.0);
        a + ab * t
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

impl From<[f64; 3]> for Vec3 {
    fn from(v: [f64; 3]) -> Self {
        Vec3::new(v[0], v[1], v[2])
    }
}

impl From<Vec3> for [f64; 3] {
    fn from(v: Vec3) -> Self {
        v.to_array()
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Vec3;
    fn mul(self, rhs: f64) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Vec3 {
    type Output = Vec3;
    fn neg(self) -> Vec3 {
        Vec3::new(-self.x, -self.y, -self.z)
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Vec3) {
        self.x += rhs.x;
        self.y += rhs.y;
        self.z += rhs.z;
    }
}

impl SubAssign for Vec3 {
    fn sub_assign(&mut self, rhs: Vec3) {
        self.x -= rhs.x;
        self.y -= rhs.y;
        self.z -= rhs.z;
    }
}

impl MulAssign<f64> for Vec3 {
    fn mul_assign(&mut self, rhs: f64) {
        self.x *= rhs;
        self.y *= rhs;
        self.z *= rhs;
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3}, {:.3})", self.x, self.y, self.z)
    }
}

/// Stable handle of a segment: its index in the simulation's segment arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(pub usize);

impl SegmentId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lineage colour inherited from parent to child, each channel in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Color {
    pub const fn new(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }

    pub fn clamped(self) -> Self {
        Self::new(
            self.r.clamp(0.0, 1.0),
            self.g.clamp(0.0, 1.0),
            self.b.clamp(0.0, 1.0),
        )
    }

    pub fn channels(&self) -> [f64; 3] {
        [self.r, self.g, self.b]
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::new(0.5, 0.5, 0.5)
    }
}

impl From<[f64; 3]> for Color {
    fn from(c: [f64; 3]) -> Self {
        Color::new(c[0], c[1], c[2])
    }
}

impl From<Color> for [f64; 3] {
    fn from(c: Color) -> Self {
        c.channels()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec3, b: Vec3) -> bool {
        a.distance_to(b) < 1e-9
    }

    #[test]
    fn rotate_x_quarter_turn_around_z_gives_y() {
        let v = Vec3::X.rotated_around(Vec3::Z, 90.0);
        assert!(close(v, Vec3::Y), "got {v}");
    }

    #[test]
    fn rotation_axis_need_not_be_unit() {
        let v = Vec3::X.rotated_around(Vec3::new(0.0, 0.0, 5.0), 180.0);
        assert!(close(v, Vec3::new(-1.0, 0.0, 0.0)));
    }

    #[test]
    fn normalize_leaves_zero_vector_alone() {
        let mut v = Vec3::ZERO;
        v.normalize();
        assert_eq!(v, Vec3::ZERO);

        let mut w = Vec3::new(3.0, 0.0, 4.0);
        w.normalize().normalize();
        assert!((w.length() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn in_place_operators_match_value_operators() {
        let mut a = Vec3::new(1.0, 2.0, 3.0);
        a += Vec3::X;
        a -= Vec3::Y;
        a *= 2.0;
        assert_eq!(a, (Vec3::new(1.0, 2.0, 3.0) + Vec3::X - Vec3::Y) * 2.0);
    }

    #[test]
    fn cross_follows_right_hand_rule() {
        assert_eq!(Vec3::X.cross(Vec3::Y), Vec3::Z);
        assert_eq!(Vec3::Y.cross(Vec3::X), -Vec3::Z);
    }

    #[test]
    fn closest_point_is_clamped_to_segment() {
        let a = Vec3::ZERO;
        let b = Vec3::new(10.0, 0.0, 0.0);
        assert_eq!(Vec3::new(-4.0, 3.0, 0.0).closest_on_segment(a, b), a);
        assert_eq!(Vec3::new(14.0, 3.0, 0.0).closest_on_segment(a, b), b);
        assert_eq!(
            Vec3::new(4.0, 3.0, 0.0).closest_on_segment(a, b),
            Vec3::new(4.0, 0.0, 0.0)
        );
        assert_eq!(Vec3::new(1.0, 1.0, 1.0).closest_on_segment(a, a), a);
    }

    #[test]
    fn vectors_serialize_as_triples() {
        let json = serde_json::to_string(&Vec3::new(1.0, 2.0, 3.0)).unwrap();
        assert_eq!(json, "[1.0,2.0,3.0]");
        let back: Vec3 = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Vec3::new(1.0, 2.0, 3.0));
    }
}
