// Released under MIT License.
// Copyright (c) 2023-2025 Ladislav Bartos

//! Implementation of the AtomicGroup structure and its methods.

use std::ops::{Index, IndexMut};

use crate::structures::{atom::Atom, simbox::SimBox, vector3d::Vector3D};

/******************************/
/*    ATOMIC GROUP STRUCTURE  */
/******************************/

/// Collection of atoms, optionally with a periodic simulation box.
///
/// Trajectory readers update the atoms of the group by their `index` property,
/// so an `AtomicGroup` can be a sparse and reordered subset of the full model.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AtomicGroup {
    atoms: Vec<Atom>,
    simbox: Option<SimBox>,
}

impl AtomicGroup {
    /// Create a new empty `AtomicGroup`.
    pub fn new() -> Self {
        AtomicGroup::default()
    }

    /// Create a new `AtomicGroup` from a vector of atoms.
    pub fn from_atoms(atoms: Vec<Atom>) -> Self {
        AtomicGroup {
            atoms,
            simbox: None,
        }
    }

    /// Create a group of `n_atoms` atoms positioned at the origin with
    /// ids `1..=n_atoms` and indices `0..n_atoms`.
    pub fn with_n_atoms(n_atoms: usize) -> Self {
        let atoms = (0..n_atoms)
            .map(|i| Atom::new(i + 1, "X", Vector3D::default()).with_index(i))
            .collect();

        AtomicGroup::from_atoms(atoms)
    }

    /// Assign a simulation box to the group.
    pub fn with_box(mut self, simbox: SimBox) -> Self {
        self.set_box(simbox);
        self
    }

    /// Get the number of atoms in the group.
    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    /// Returns `true` if the group contains no atoms.
    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    /// Get the atoms of the group.
    pub fn get_atoms(&self) -> &[Atom] {
        &self.atoms
    }

    /// Get mutable access to the atoms of the group.
    pub fn get_atoms_mut(&mut self) -> &mut [Atom] {
        &mut self.atoms
    }

    /// Add an atom to the end of the group.
    pub fn push(&mut self, atom: Atom) {
        self.atoms.push(atom);
    }

    /// Iterate over the atoms of the group.
    pub fn iter(&self) -> std::slice::Iter<'_, Atom> {
        self.atoms.iter()
    }

    /// Iterate mutably over the atoms of the group.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Atom> {
        self.atoms.iter_mut()
    }

    /// Get the simulation box of the group.
    pub fn get_box(&self) -> Option<&SimBox> {
        self.simbox.as_ref()
    }

    /// Set the simulation box of the group.
    pub fn set_box(&mut self, simbox: SimBox) {
        self.simbox = Some(simbox);
    }

    /// Remove the simulation box from the group.
    pub fn reset_box(&mut self) {
        self.simbox = None;
    }

    /// Returns `true` if the group has a simulation box.
    pub fn has_box(&self) -> bool {
        self.simbox.is_some()
    }

    /// Set the index of each atom to its position in the group.
    pub fn index_atoms(&mut self) {
        self.atoms
            .iter_mut()
            .enumerate()
            .for_each(|(i, atom)| atom.set_index(i));
    }

    /// Returns `true` if every atom of the group has its index property set.
    pub fn all_indexed(&self) -> bool {
        self.atoms.iter().all(|atom| atom.get_index().is_some())
    }

    /// Create a new group containing copies of the atoms at the specified positions of this group.
    /// The indices of the atoms are preserved.
    ///
    /// ## Panics
    /// Panics if any of the positions is out of range.
    ///
    /// ## Example
    /// ```
    /// # use trajstream::prelude::*;
    /// let model = AtomicGroup::with_n_atoms(10);
    /// let subset = model.subset(&[7, 2]);
    ///
    /// assert_eq!(subset.len(), 2);
    /// assert_eq!(subset[0].get_index(), Some(7));
    /// assert_eq!(subset[1].get_index(), Some(2));
    /// ```
    pub fn subset(&self, positions: &[usize]) -> AtomicGroup {
        AtomicGroup {
            atoms: positions.iter().map(|&i| self.atoms[i].clone()).collect(),
            simbox: self.simbox.clone(),
        }
    }

    /// Get the positions of all atoms of the group.
    pub fn coords(&self) -> Vec<Vector3D> {
        self.atoms.iter().map(|atom| *atom.get_position()).collect()
    }
}

impl Index<usize> for AtomicGroup {
    type Output = Atom;

    fn index(&self, index: usize) -> &Self::Output {
        &self.atoms[index]
    }
}

impl IndexMut<usize> for AtomicGroup {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.atoms[index]
    }
}

impl FromIterator<Atom> for AtomicGroup {
    fn from_iter<T: IntoIterator<Item = Atom>>(iter: T) -> Self {
        AtomicGroup::from_atoms(iter.into_iter().collect())
    }
}

/******************************/
/*         UNIT TESTS         */
/******************************/

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_n_atoms_indexed() {
        let group = AtomicGroup::with_n_atoms(5);
        assert_eq!(group.len(), 5);
        assert!(group.all_indexed());

        for (i, atom) in group.iter().enumerate() {
            assert_eq!(atom.get_index(), Some(i));
            assert_eq!(atom.get_id(), i + 1);
        }
    }

    #[test]
    fn index_atoms() {
        let mut group: AtomicGroup = (0..4)
            .map(|i| Atom::new(100 + 2 * i, "C", Vector3D::default()))
            .collect();
        assert!(!group.all_indexed());

        group.index_atoms();
        assert!(group.all_indexed());
        assert_eq!(group[3].get_index(), Some(3));
        assert_eq!(group[3].get_id(), 106);
    }

    #[test]
    fn box_handling() {
        let mut group = AtomicGroup::with_n_atoms(1).with_box([1.0, 2.0, 3.0].into());
        assert!(group.has_box());
        assert_eq!(group.get_box().unwrap().diagonal(), Vector3D::new(1.0, 2.0, 3.0));

        group.reset_box();
        assert!(!group.has_box());
    }

    #[test]
    fn subset_keeps_box() {
        let group = AtomicGroup::with_n_atoms(4).with_box([5.0, 5.0, 5.0].into());
        let subset = group.subset(&[3, 0]);
        assert!(subset.has_box());
        assert_eq!(subset[0].get_index(), Some(3));
        assert_eq!(subset[1].get_index(), Some(0));
    }
}
