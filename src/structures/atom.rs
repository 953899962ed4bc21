// Released under MIT License.
// Copyright (c) 2023-2025 Ladislav Bartos

//! Implementation of the Atom structure and its methods.

use crate::structures::vector3d::Vector3D;

/// Single atom of a molecular model.
///
/// `id` is the identifier read from the topology (arbitrary, possibly sparse).
/// `index` is the dense 0-based position of the atom in the original model ordering
/// and is used to address the coordinate buffers of trajectory frames.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Atom {
    id: usize,
    name: String,
    index: Option<usize>,
    position: Vector3D,
    velocity: Option<Vector3D>,
}

impl Atom {
    /// Create new Atom structure with the specified properties.
    ///
    /// ## Notes
    /// - The atom is constructed without an index and without velocity.
    /// Use `Atom::with_index` to assign the index.
    pub fn new(id: usize, name: &str, position: Vector3D) -> Self {
        Atom {
            id,
            name: name.to_string(),
            index: None,
            position,
            velocity: None,
        }
    }

    /// Assign index to the atom.
    ///
    /// ## Example
    /// ```
    /// # use trajstream::prelude::*;
    /// let atom = Atom::new(17, "OW", [1.0, 2.0, 3.0].into()).with_index(3);
    ///
    /// assert_eq!(atom.get_id(), 17);
    /// assert_eq!(atom.get_index(), Some(3));
    /// ```
    pub fn with_index(mut self, index: usize) -> Self {
        self.set_index(index);
        self
    }

    /// Get the identifier of the atom.
    pub fn get_id(&self) -> usize {
        self.id
    }

    /// Set the identifier of the atom.
    pub fn set_id(&mut self, id: usize) {
        self.id = id;
    }

    /// Get the name of the atom.
    pub fn get_name(&self) -> &str {
        &self.name
    }

    /// Get the index of the atom. Returns `None` if the index property has not been set.
    pub fn get_index(&self) -> Option<usize> {
        self.index
    }

    /// Set the index of the atom.
    pub fn set_index(&mut self, index: usize) {
        self.index = Some(index);
    }

    /// Remove the index of the atom.
    pub fn reset_index(&mut self) {
        self.index = None;
    }

    /// Get the position of the atom.
    pub fn get_position(&self) -> &Vector3D {
        &self.position
    }

    /// Set the position of the atom.
    pub fn set_position(&mut self, position: Vector3D) {
        self.position = position;
    }

    /// Get the velocity of the atom. Returns `None` if the velocity is unknown.
    pub fn get_velocity(&self) -> Option<&Vector3D> {
        self.velocity.as_ref()
    }

    /// Set the velocity of the atom.
    pub fn set_velocity(&mut self, velocity: Vector3D) {
        self.velocity = Some(velocity);
    }
}

/******************************/
/*         UNIT TESTS         */
/******************************/

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_lifecycle() {
        let mut atom = Atom::new(5, "CA", Vector3D::default());
        assert_eq!(atom.get_index(), None);

        atom.set_index(0);
        assert_eq!(atom.get_index(), Some(0));

        atom.reset_index();
        assert_eq!(atom.get_index(), None);
    }

    #[test]
    fn position_and_velocity() {
        let mut atom = Atom::new(1, "HW1", [1.0, 2.0, 3.0].into());
        assert_eq!(atom.get_name(), "HW1");
        assert_eq!(atom.get_position(), &Vector3D::new(1.0, 2.0, 3.0));
        assert!(atom.get_velocity().is_none());

        atom.set_position([4.0, 5.0, 6.0].into());
        atom.set_velocity([0.1, 0.2, 0.3].into());
        assert_eq!(atom.get_position(), &Vector3D::new(4.0, 5.0, 6.0));
        assert_eq!(atom.get_velocity(), Some(&Vector3D::new(0.1, 0.2, 0.3)));
    }
}
