use std::ops::{Add, Div, Mul, Neg, Sub};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub const fn zero() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Unit vector at `radians` from the +x axis.
    pub fn from_angle(radians: f64) -> Self {
        Self::new(radians.cos(), radians.sin())
    }

    pub fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// Z component of the 3D cross product.
    pub fn cross(self, other: Self) -> f64 {
        self.x * other.y - self.y * other.x
    }

    pub fn length(self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn normalized(self) -> Self {
        let len = self.length();
        if len == 0.0 {
            self
        } else {
            self / len
        }
    }

    /// Counter-clockwise perpendicular.
    pub fn perpendicular(self) -> Self {
        Self::new(-self.y, self.x)
    }

    pub fn min(self, other: Self) -> Self {
        Self::new(self.x.min(other.x), self.y.min(other.y))
    }

    pub fn max(self, other: Self) -> Self {
        Self::new(self.x.max(other.x), self.y.max(other.y))
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Vec2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self::Output {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl Div<f64> for Vec2 {
    type Output = Self;

    fn div(self, rhs: f64) -> Self::Output {
        Self::new(self.x / rhs, self.y / rhs)
    }
}

impl Neg for Vec2 {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::new(-self.x, -self.y)
    }
}

impl Mul<Vec2> for f64 {
    type Output = Vec2;

    fn mul(self, rhs: Vec2) -> Self::Output {
        rhs * self
    }
}

/// Hits closer than this are treated as the surface the ray just left.
pub const RAY_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec2,
    /// Always unit length.
    pub direction: Vec2,
}

impl Ray {
    pub fn new(origin: Vec2, direction: Vec2) -> Self {
        Self {
            origin,
            direction: direction.normalized(),
        }
    }

    pub fn from_angle(origin: Vec2, radians: f64) -> Self {
        Self {
            origin,
            direction: Vec2::from_angle(radians),
        }
    }

    pub fn set_angle(&mut self, radians: f64) {
        self.direction = Vec2::from_angle(radians);
    }

    pub fn at(&self, distance: f64) -> Vec2 {
        self.origin + self.direction * distance
    }

    /// Mirror the direction about `normal`, which need not be unit length.
    pub fn reflect(&mut self, normal: Vec2) {
        let n = normal.normalized();
        self.direction = self.direction - n * (2.0 * self.direction.dot(n));
    }

    /// Intersect with the segment `start .. start + delta`.
    ///
    /// Returns the distance along the ray and the fractional position
    /// `alpha` along the segment.
    pub fn intersect_segment(&self, start: Vec2, delta: Vec2) -> Option<(f64, f64)> {
        let denom = self.direction.cross(delta);
        if denom == 0.0 {
            return None;
        }

        let offset = start - self.origin;
        let distance = offset.cross(delta) / denom;
        let alpha = offset.cross(self.direction) / denom;

        if distance > RAY_EPSILON && (0.0..=1.0).contains(&alpha) {
            Some((distance, alpha))
        } else {
            None
        }
    }

    /// Distance to the furthest point where the ray crosses `aabb`, or zero
    /// if it never does.
    pub fn intersect_furthest(&self, aabb: &Aabb) -> f64 {
        let mut t_min = 0.0;
        let mut t_max = f64::INFINITY;
        if !aabb.clip(self, &mut t_min, &mut t_max) || !t_max.is_finite() {
            return 0.0;
        }
        t_max
    }
}

/// Axis-aligned box in scene coordinates; `top` is the smaller y.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Aabb {
    pub const fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub const fn empty() -> Self {
        Self::new(
            f64::INFINITY,
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::NEG_INFINITY,
        )
    }

    pub fn is_empty(&self) -> bool {
        !(self.left <= self.right && self.top <= self.bottom)
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    pub fn union(self, other: Self) -> Self {
        Self::new(
            self.left.min(other.left),
            self.top.min(other.top),
            self.right.max(other.right),
            self.bottom.max(other.bottom),
        )
    }

    /// Closed-interval overlap test.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.left <= other.right
            && other.left <= self.right
            && self.top <= other.bottom
            && other.top <= self.bottom
    }

    pub fn contains(&self, other: &Self) -> bool {
        self.left <= other.left
            && self.top <= other.top
            && self.right >= other.right
            && self.bottom >= other.bottom
    }

    pub fn contains_point(&self, p: Vec2) -> bool {
        p.x >= self.left && p.x <= self.right && p.y >= self.top && p.y <= self.bottom
    }

    /// Does the ray cross this box anywhere in `[t_min, t_max]`?
    pub fn hit(&self, ray: &Ray, mut t_min: f64, mut t_max: f64) -> bool {
        self.clip(ray, &mut t_min, &mut t_max)
    }

    /// Narrow `[t_min, t_max]` to the part of the ray inside the box.
    fn clip(&self, ray: &Ray, t_min: &mut f64, t_max: &mut f64) -> bool {
        hit_axis(self.left, self.right, ray.origin.x, ray.direction.x, t_min, t_max)
            && hit_axis(self.top, self.bottom, ray.origin.y, ray.direction.y, t_min, t_max)
    }
}

fn hit_axis(min: f64, max: f64, origin: f64, direction: f64, t_min: &mut f64, t_max: &mut f64) -> bool {
    if direction == 0.0 {
        return origin >= min && origin <= max;
    }

    let inv_d = 1.0 / direction;
    let mut t0 = (min - origin) * inv_d;
    let mut t1 = (max - origin) * inv_d;
    if inv_d < 0.0 {
        std::mem::swap(&mut t0, &mut t1);
    }

    *t_min = t0.max(*t_min);
    *t_max = t1.min(*t_max);
    // Degenerate (zero-width) boxes still count when the ray crosses them.
    *t_max >= *t_min
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_hit_reports_distance_and_alpha() {
        let ray = Ray::from_angle(Vec2::new(0.0, 0.0), 0.0);
        let (distance, alpha) = ray
            .intersect_segment(Vec2::new(5.0, -1.0), Vec2::new(0.0, 4.0))
            .unwrap();
        assert!((distance - 5.0).abs() < 1e-12);
        assert!((alpha - 0.25).abs() < 1e-12);
    }

    #[test]
    fn segment_behind_or_parallel_misses() {
        let ray = Ray::from_angle(Vec2::new(0.0, 0.0), 0.0);
        assert!(ray
            .intersect_segment(Vec2::new(-5.0, -1.0), Vec2::new(0.0, 2.0))
            .is_none());
        assert!(ray
            .intersect_segment(Vec2::new(1.0, 0.0), Vec2::new(3.0, 0.0))
            .is_none());
    }

    #[test]
    fn reflect_mirrors_about_normal() {
        let mut ray = Ray::new(Vec2::zero(), Vec2::new(1.0, -1.0));
        ray.reflect(Vec2::new(0.0, 3.0));
        assert!((ray.direction.x - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-12);
        assert!((ray.direction.y - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-12);
    }

    #[test]
    fn furthest_box_crossing() {
        let bounds = Aabb::new(0.0, 0.0, 10.0, 10.0);
        let inside = Ray::from_angle(Vec2::new(2.0, 5.0), 0.0);
        assert!((inside.intersect_furthest(&bounds) - 8.0).abs() < 1e-12);

        let outside = Ray::from_angle(Vec2::new(-4.0, 5.0), 0.0);
        assert!((outside.intersect_furthest(&bounds) - 14.0).abs() < 1e-12);

        let away = Ray::from_angle(Vec2::new(-4.0, 5.0), std::f64::consts::PI);
        assert_eq!(away.intersect_furthest(&bounds), 0.0);
    }

    #[test]
    fn degenerate_box_is_still_hit() {
        let wall = Aabb::new(5.0, 0.0, 5.0, 10.0);
        let ray = Ray::from_angle(Vec2::new(0.0, 5.0), 0.0);
        assert!(wall.hit(&ray, 0.0, f64::INFINITY));
        assert!(!wall.hit(&ray, 0.0, 4.0));
    }
}
