//! Live Morton cell list with lazy, version-counted rebuilds.
//!
//! The list owns the particle positions in Morton-sorted order and keeps a
//! trie for cell lookups. Moving a particle only accumulates displacement;
//! the expensive re-binning happens when [`CellList::update`] finds that
//! some particle has eaten the drift headroom the inflated binning grid
//! left it. A version counter lets dependents detect rebuilds without any
//! observer wiring.

use glam::{DVec3, IVec3};
use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cells::{bin_points, cell_of};
use crate::morton::{Morton64, MortonCode};
use crate::octree::CellOctree;

/// Tunables for [`CellList`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CellListParams {
    /// Binning grid spacing as a multiple of the interaction cutoff.
    ///
    /// The excess over 1 is drift headroom: particles may move half of it
    /// in any direction before the list must re-bin.
    pub cell_factor: f64,
}

impl Default for CellListParams {
    fn default() -> Self {
        Self { cell_factor: 1.2 }
    }
}

/// Re-permute a parallel array with the map returned by
/// [`CellList::update`] or the constructors.
///
/// The physics layer owns arrays (velocity, density, ...) indexed like the
/// positions; after a rebuild it brings them back in sync with
/// `apply_index_map(&map, &values)`.
pub fn apply_index_map<T: Copy + Send + Sync>(index_map: &[u32], values: &[T]) -> Vec<T> {
    index_map
        .par_iter()
        .map(|&old| values[old as usize])
        .collect()
}

/// Morton-sorted particle positions with cell ranges and a lookup trie.
#[derive(Clone, Debug)]
pub struct CellList {
    params: CellListParams,
    cell_size: f64,
    points: Vec<DVec3>,
    cell_mortons: Vec<Morton64>,
    cell_starts: Vec<u32>,
    octree: CellOctree<Morton64>,
    version: u64,
    moved: Vec<f64>,
}

impl CellList {
    /// Build a list over `points` with interaction cutoff `cell_size`.
    ///
    /// Returns the permutation mapping sorted slots to original indices
    /// alongside the list, so the caller can sort its parallel arrays to
    /// match.
    pub fn new(cell_size: f64, points: Vec<DVec3>) -> (Vec<u32>, Self) {
        Self::with_params(CellListParams::default(), cell_size, points)
    }

    pub fn with_params(
        params: CellListParams,
        cell_size: f64,
        points: Vec<DVec3>,
    ) -> (Vec<u32>, Self) {
        Self::build(params, cell_size, points, 0)
    }

    fn build(
        params: CellListParams,
        cell_size: f64,
        points: Vec<DVec3>,
        version: u64,
    ) -> (Vec<u32>, Self) {
        let grid_size = params.cell_factor * cell_size;
        let binned = bin_points::<Morton64>(grid_size, &points);
        let sorted: Vec<DVec3> = binned
            .index_map
            .par_iter()
            .map(|&old| points[old as usize])
            .collect();
        let octree = CellOctree::build(&binned.cell_mortons);
        debug!(
            "cell list binned {} points into {} cells (version {})",
            sorted.len(),
            binned.cell_mortons.len(),
            version
        );
        let moved = vec![0.0; sorted.len()];
        (
            binned.index_map,
            Self {
                params,
                cell_size,
                points: sorted,
                cell_mortons: binned.cell_mortons,
                cell_starts: binned.cell_starts,
                octree,
                version,
                moved,
            },
        )
    }

    /// Move point `i`, accumulating its displacement.
    ///
    /// Never re-bins; until the next rebuild the point stays in its old
    /// cell, which the inflated binning grid tolerates up to the drift
    /// threshold.
    pub fn set_pos(&mut self, i: usize, p: DVec3) {
        self.moved[i] += (self.points[i] - p).length();
        self.points[i] = p;
    }

    /// True once any point's accumulated displacement reaches the drift
    /// headroom `0.5 * cell_size * (cell_factor - 1)`.
    pub fn needs_update(&self) -> bool {
        let max_moved = self.moved.par_iter().copied().reduce(|| 0.0, f64::max);
        max_moved >= 0.5 * self.cell_size * (self.params.cell_factor - 1.0)
    }

    /// Re-bin if accumulated drift requires it.
    ///
    /// On rebuild the version is bumped, displacement accumulators reset,
    /// and the new permutation is returned for the caller's parallel
    /// arrays. Otherwise nothing changes and `None` is returned.
    pub fn update(&mut self) -> Option<Vec<u32>> {
        if !self.needs_update() {
            return None;
        }
        let points = std::mem::take(&mut self.points);
        let (map, rebuilt) = Self::build(self.params, self.cell_size, points, self.version + 1);
        *self = rebuilt;
        Some(map)
    }

    /// Interaction cutoff the list was created with.
    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    pub fn cell_factor(&self) -> f64 {
        self.params.cell_factor
    }

    /// Binning grid spacing, `cell_factor * cell_size`; also the inflated
    /// candidate cutoff of the neighbor search.
    pub fn grid_size(&self) -> f64 {
        self.params.cell_factor * self.cell_size
    }

    /// Rebuild generation, bumped by every re-binning [`CellList::update`].
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn num_cells(&self) -> usize {
        self.cell_mortons.len()
    }

    #[inline]
    pub fn point(&self, i: usize) -> DVec3 {
        self.points[i]
    }

    /// Positions in Morton-sorted order.
    pub fn points(&self) -> &[DVec3] {
        &self.points
    }

    #[inline]
    pub fn cell_start(&self, cell: u32) -> usize {
        self.cell_starts[cell as usize] as usize
    }

    #[inline]
    pub fn cell_end(&self, cell: u32) -> usize {
        self.cell_starts[cell as usize + 1] as usize
    }

    pub(crate) fn cell_starts(&self) -> &[u32] {
        &self.cell_starts
    }

    /// Grid coordinates of an occupied cell.
    pub fn cell_coords(&self, cell: u32) -> IVec3 {
        self.cell_mortons[cell as usize].decode()
    }

    /// Grid coordinates of the cell point `i` was binned into.
    ///
    /// Computed from the current position, so a point moved past a cell
    /// boundary since the last rebuild reports its new coordinates.
    pub fn point_coords(&self, i: usize) -> IVec3 {
        cell_of(self.grid_size(), self.points[i])
    }

    /// Resolve grid coordinates to a cell id through the trie.
    ///
    /// `None` when no indexed cell matches; see [`CellOctree::get`] for
    /// the aliasing caveat on coordinates far outside the domain.
    #[inline]
    pub fn cell_id(&self, coords: IVec3) -> Option<u32> {
        self.octree.get(Morton64::encode(coords))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_list_is_valid_and_stable() {
        let (map, mut list) = CellList::new(0.1, Vec::new());
        assert!(map.is_empty());
        assert!(list.is_empty());
        assert_eq!(list.num_cells(), 0);
        assert!(!list.needs_update());
        assert_eq!(list.update(), None);
        assert_eq!(list.version(), 0);
    }

    #[test]
    fn set_pos_accumulates_displacement() {
        let points = vec![DVec3::ZERO, DVec3::new(1.0, 0.0, 0.0)];
        let (_, mut list) = CellList::new(1.0, points);
        assert!(!list.needs_update());

        // Back-and-forth moves accumulate even though the net motion is 0.
        let i = 0;
        let home = list.point(i);
        for _ in 0..10 {
            list.set_pos(i, home + DVec3::new(0.006, 0.0, 0.0));
            list.set_pos(i, home);
        }
        assert!(list.needs_update(), "0.12 accumulated > 0.1 threshold");
    }

    #[test]
    fn update_rebuilds_only_past_threshold() {
        let points: Vec<DVec3> = (0..30)
            .map(|i| DVec3::new(i as f64 * 0.3, (i % 5) as f64 * 0.3, 0.0))
            .collect();
        let (_, mut list) = CellList::new(1.0, points);
        assert_eq!(list.version(), 0);

        // Tiny drift: below 0.5 * 1.0 * 0.2 = 0.1.
        let p = list.point(3);
        list.set_pos(3, p + DVec3::new(0.05, 0.0, 0.0));
        assert_eq!(list.update(), None);
        assert_eq!(list.version(), 0);

        // Push one point past the threshold.
        let p = list.point(7);
        list.set_pos(7, p + DVec3::new(0.2, 0.0, 0.0));
        let map = list.update().expect("drift past threshold must rebuild");
        assert_eq!(list.version(), 1);
        assert_eq!(map.len(), list.len());
        assert!(list.update().is_none(), "fresh rebuild needs no update");
    }

    #[test]
    fn index_map_tracks_payload_through_rebuild() {
        let points: Vec<DVec3> = (0..40)
            .map(|i| DVec3::new((i % 7) as f64, (i % 3) as f64, i as f64 * 0.11))
            .collect();
        let (map, mut list) = CellList::new(0.5, points.clone());

        // Payload: each point's original index.
        let ids: Vec<u32> = (0..points.len() as u32).collect();
        let mut ids = apply_index_map(&map, &ids);
        for i in 0..list.len() {
            assert_eq!(points[ids[i] as usize], list.point(i));
        }

        let p = list.point(11);
        list.set_pos(11, p + DVec3::new(0.0, 0.31, 0.0));
        let map = list.update().expect("rebuild");
        ids = apply_index_map(&map, &ids);
        for i in 0..list.len() {
            let original = points[ids[i] as usize];
            let d = (original - list.point(i)).length();
            // Every point except the moved one is exactly where it started.
            assert!(d < 0.32, "payload desynced at slot {i}");
        }
    }
}
