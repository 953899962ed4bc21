// Released under MIT License.
// Copyright (c) 2023-2025 Ladislav Bartos

//! Implementation of the three-dimensional vector used for coordinates and box dimensions.

use std::ops::{Add, Deref, DerefMut, Mul, Sub};

use nalgebra::base::Vector3;

/// Position of a point in space or a vector in space.
/// Implemented using `nalgebra`'s Vector3. All public coordinates are in Ångströms.
#[derive(Debug, PartialEq, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Vector3D(pub(crate) Vector3<f32>);

impl From<[f32; 3]> for Vector3D {
    #[inline]
    fn from(arr: [f32; 3]) -> Self {
        Vector3D(Vector3::new(arr[0], arr[1], arr[2]))
    }
}

impl From<Vector3D> for [f32; 3] {
    #[inline]
    fn from(vec: Vector3D) -> Self {
        [vec.x, vec.y, vec.z]
    }
}

/// Allows accessing fields of `Vector3D` as `.x`, `.y`, and `.z`.
pub struct Vector3Raw {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Deref for Vector3D {
    type Target = Vector3Raw;

    #[inline]
    fn deref(&self) -> &Self::Target {
        unsafe { &*(self.0.as_ptr() as *const Vector3Raw) }
    }
}

impl DerefMut for Vector3D {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *(self.0.as_mut_ptr() as *mut Vector3Raw) }
    }
}

impl Add for Vector3D {
    type Output = Vector3D;

    #[inline]
    fn add(self, rhs: Vector3D) -> Self::Output {
        Vector3D(self.0 + rhs.0)
    }
}

impl Sub for Vector3D {
    type Output = Vector3D;

    #[inline]
    fn sub(self, rhs: Vector3D) -> Self::Output {
        Vector3D(self.0 - rhs.0)
    }
}

impl Mul<f32> for Vector3D {
    type Output = Vector3D;

    #[inline]
    fn mul(self, rhs: f32) -> Self::Output {
        Vector3D(self.0 * rhs)
    }
}

impl Vector3D {
    /// Create a new `Vector3D` structure.
    #[inline]
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Vector3D(Vector3::new(x, y, z))
    }

    /// Calculate length of the vector.
    ///
    /// ## Example
    /// ```
    /// # use trajstream::prelude::*;
    /// # use float_cmp::assert_approx_eq;
    /// #
    /// let vector = Vector3D::new(1.0, 2.0, 3.0);
    /// assert_approx_eq!(f32, vector.len(), 3.741657);
    /// ```
    #[inline]
    pub fn len(&self) -> f32 {
        self.0.magnitude()
    }

    /// Calculate dot product of two vectors.
    #[inline]
    pub fn dot(&self, vector: &Vector3D) -> f32 {
        self.0.dot(&vector.0)
    }

    /// Calculate the angle between two vectors. Returns angle in radians.
    ///
    /// ## Example
    /// ```
    /// # use trajstream::prelude::*;
    /// # use float_cmp::assert_approx_eq;
    /// #
    /// let vector1 = Vector3D::new(1.0, 0.0, 0.0);
    /// let vector2 = Vector3D::new(0.0, 2.0, 0.0);
    ///
    /// assert_approx_eq!(f32, vector1.angle(&vector2), std::f32::consts::FRAC_PI_2);
    /// ```
    #[inline]
    pub fn angle(&self, vector: &Vector3D) -> f32 {
        self.0.angle(&vector.0)
    }

    /// Calculate distance between two points ignoring periodic boundary conditions.
    #[inline]
    pub fn distance_naive(&self, point: &Vector3D) -> f32 {
        (*self - *point).len()
    }

    /// Largest absolute difference between the individual components of two vectors.
    #[inline]
    pub fn max_abs_diff(&self, other: &Vector3D) -> f32 {
        (self.0 - other.0).amax()
    }
}

/******************************/
/*         UNIT TESTS         */
/******************************/

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn from_array_and_back() {
        let vec = Vector3D::from([1.5, -2.5, 3.0]);
        assert_approx_eq!(f32, vec.x, 1.5);
        assert_approx_eq!(f32, vec.y, -2.5);
        assert_approx_eq!(f32, vec.z, 3.0);

        let arr: [f32; 3] = vec.into();
        assert_eq!(arr, [1.5, -2.5, 3.0]);
    }

    #[test]
    fn arithmetic() {
        let a = Vector3D::new(1.0, 2.0, 3.0);
        let b = Vector3D::new(0.5, 0.5, 0.5);

        assert_eq!(a + b, Vector3D::new(1.5, 2.5, 3.5));
        assert_eq!(a - b, Vector3D::new(0.5, 1.5, 2.5));
        assert_eq!(a * 10.0, Vector3D::new(10.0, 20.0, 30.0));
    }

    #[test]
    fn distance_and_diff() {
        let a = Vector3D::new(1.0, 1.0, 1.0);
        let b = Vector3D::new(4.0, 5.0, 1.0);

        assert_approx_eq!(f32, a.distance_naive(&b), 5.0);
        assert_approx_eq!(f32, a.max_abs_diff(&b), 4.0);
    }

    #[test]
    fn deref_mut() {
        let mut vec = Vector3D::default();
        vec.y = 7.0;
        assert_eq!(vec, Vector3D::new(0.0, 7.0, 0.0));
    }
}
