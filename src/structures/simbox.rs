// Released under MIT License.
// Copyright (c) 2023-2025 Ladislav Bartos

//! Implementation of the SimBox structure and its methods.

use crate::structures::vector3d::Vector3D;

/// Structure defining simulation box shape and dimensions.
/// Box vectors are stored in Ångströms.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimBox {
    pub v1x: f32,
    pub v2y: f32,
    pub v3z: f32,
    pub v1y: f32,
    pub v1z: f32,
    pub v2x: f32,
    pub v2z: f32,
    pub v3x: f32,
    pub v3y: f32,
}

impl From<[f32; 3]> for SimBox {
    /// Convert 3-member array to a rectangular SimBox. Off-diagonal values are set to 0.
    fn from(arr: [f32; 3]) -> Self {
        SimBox {
            v1x: arr[0],
            v2y: arr[1],
            v3z: arr[2],
            ..Default::default()
        }
    }
}

impl From<Vector3D> for SimBox {
    fn from(vec: Vector3D) -> Self {
        [vec.x, vec.y, vec.z].into()
    }
}

impl SimBox {
    /// Create new simulation box from lengths and angles (in degrees).
    ///
    /// ## Example
    /// ```
    /// # use trajstream::prelude::*;
    /// # use float_cmp::assert_approx_eq;
    /// #
    /// let simbox = SimBox::from_lengths_angles([5.0, 4.0, 3.0].into(), [80.0, 70.0, 120.0].into());
    ///
    /// assert_approx_eq!(f32, simbox.v1x,  5.000000, epsilon = 0.0001);
    /// assert_approx_eq!(f32, simbox.v2y,  3.464102, epsilon = 0.0001);
    /// assert_approx_eq!(f32, simbox.v3z,  2.553768, epsilon = 0.0001);
    /// assert_approx_eq!(f32, simbox.v2x, -2.000000, epsilon = 0.0001);
    /// assert_approx_eq!(f32, simbox.v3x,  1.026060, epsilon = 0.0001);
    /// assert_approx_eq!(f32, simbox.v3y,  1.193930, epsilon = 0.0001);
    /// ```
    ///
    /// ## Notes
    /// - Adapted from Tsjerk Wassenaar's `triclinic` function:
    /// <https://www.mail-archive.com/gmx-users@gromacs.org/msg28032.html>
    pub fn from_lengths_angles(lengths: Vector3D, angles: Vector3D) -> Self {
        let mut simbox = SimBox {
            v1x: lengths.x,
            ..Default::default()
        };

        if angles.x == 90.0 && angles.y == 90.0 && angles.z == 90.0 {
            simbox.v2y = lengths.y;
            simbox.v3z = lengths.z;
        } else {
            let alpha = angles.x.to_radians();
            let beta = angles.y.to_radians();
            let gamma = angles.z.to_radians();

            simbox.v2x = lengths.y * gamma.cos();
            simbox.v2y = lengths.y * gamma.sin();

            simbox.v3x = lengths.z * beta.cos();
            simbox.v3y = lengths.z * (alpha.cos() - beta.cos() * gamma.cos()) / gamma.sin();
            simbox.v3z =
                (lengths.z * lengths.z - simbox.v3x * simbox.v3x - simbox.v3y * simbox.v3y).sqrt();
        }

        simbox
    }

    /// Create new simulation box from a 3x3 matrix whose rows are the box vectors.
    pub fn from_matrix(matrix: [[f32; 3]; 3]) -> Self {
        SimBox {
            v1x: matrix[0][0],
            v1y: matrix[0][1],
            v1z: matrix[0][2],
            v2x: matrix[1][0],
            v2y: matrix[1][1],
            v2z: matrix[1][2],
            v3x: matrix[2][0],
            v3y: matrix[2][1],
            v3z: matrix[2][2],
        }
    }

    /// Convert the simulation box into a 3x3 matrix whose rows are the box vectors.
    pub fn to_matrix(&self) -> [[f32; 3]; 3] {
        [
            [self.v1x, self.v1y, self.v1z],
            [self.v2x, self.v2y, self.v2z],
            [self.v3x, self.v3y, self.v3z],
        ]
    }

    /// Multiply every component of the box by `factor`.
    pub fn scaled(&self, factor: f32) -> SimBox {
        let mut matrix = self.to_matrix();
        matrix
            .iter_mut()
            .flat_map(|row| row.iter_mut())
            .for_each(|value| *value *= factor);
        SimBox::from_matrix(matrix)
    }

    /// Get the diagonal of the box matrix.
    pub fn diagonal(&self) -> Vector3D {
        Vector3D::new(self.v1x, self.v2y, self.v3z)
    }

    /// Get the lengths of the three box vectors.
    pub fn lengths(&self) -> Vector3D {
        let [v1, v2, v3] = self.vectors();
        Vector3D::new(v1.len(), v2.len(), v3.len())
    }

    /// Get the box angles `[alpha, beta, gamma]` in degrees.
    /// Angles involving a null box vector are reported as 90°.
    pub fn angles(&self) -> Vector3D {
        let [v1, v2, v3] = self.vectors();

        let angle = |a: &Vector3D, b: &Vector3D| {
            if a.len() == 0.0 || b.len() == 0.0 {
                90.0
            } else {
                a.angle(b).to_degrees()
            }
        };

        Vector3D::new(angle(&v2, &v3), angle(&v1, &v3), angle(&v1, &v2))
    }

    /// Returns `true` if all off-diagonal components are zero.
    pub fn is_orthogonal(&self) -> bool {
        self.v1y == 0.0
            && self.v1z == 0.0
            && self.v2x == 0.0
            && self.v2z == 0.0
            && self.v3x == 0.0
            && self.v3y == 0.0
    }

    /// Returns `true` if all components of the box are zero.
    pub fn is_zero(&self) -> bool {
        self.to_matrix().iter().flatten().all(|&x| x == 0.0)
    }

    fn vectors(&self) -> [Vector3D; 3] {
        let m = self.to_matrix();
        [m[0].into(), m[1].into(), m[2].into()]
    }
}

/******************************/
/*         UNIT TESTS         */
/******************************/
