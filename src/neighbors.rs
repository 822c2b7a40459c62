//! Cached candidate neighbors with cheap active-subset refresh.
//!
//! The table keeps, per source point, every target point within the
//! inflated candidate cutoff (the binning grid spacing). That superset is
//! expensive to build but survives sub-threshold particle drift, so most
//! steps only re-partition each list against the exact interaction cutoff
//! and remember how long the active prefix is. A stored copy of the cell
//! list versions decides which of the two is due.

use log::trace;
use rayon::prelude::*;
use thiserror::Error;

use crate::cell_list::CellList;
use crate::cells::{split_by_starts, NEIGHBOR_OFFSETS};

/// Fatal misuse of a neighbor query.
#[derive(Debug, Error)]
pub enum NeighborError {
    /// Source and target lists disagree on the interaction cutoff, so
    /// stencil cells resolved through the target grid cannot cover the
    /// source cutoff. The rebuild schedules of the two lists have
    /// desynchronized; this is a caller bug, not a recoverable state.
    #[error("neighbor query across mismatched cell sizes (source {src}, target {trg})")]
    CellSizeMismatch { src: f64, trg: f64 },
    /// Equal cutoffs but different binning factors: the two grids are
    /// incommensurate, so source cell coordinates mean nothing on the
    /// target grid.
    #[error("neighbor query across mismatched cell factors (source {src}, target {trg})")]
    CellFactorMismatch { src: f64, trg: f64 },
}

/// Per-point candidate lists with an active prefix.
#[derive(Clone, Debug, Default)]
pub struct NeighborTable {
    lists: Vec<Vec<u32>>,
    active: Vec<u32>,
    src_version: u64,
    trg_version: u64,
}

impl NeighborTable {
    /// Candidates among the points of `list` itself; a point is never its
    /// own neighbor.
    pub fn new(list: &CellList) -> Self {
        let mut table = Self::default();
        table.rebuild(true, list, list);
        table.refresh_active(list, list);
        table.src_version = list.version();
        table.trg_version = list.version();
        table
    }

    /// Candidates in `trg` for every point of `src`, e.g. boundary
    /// particles seen from the fluid.
    ///
    /// Fails fast if the lists were built with different cutoffs (unless
    /// the target is empty, which yields valid empty lists).
    pub fn between(src: &CellList, trg: &CellList) -> Result<Self, NeighborError> {
        check_compatible(src, trg)?;
        let mut table = Self::default();
        table.rebuild(false, src, trg);
        table.refresh_active(src, trg);
        table.src_version = src.version();
        table.trg_version = trg.version();
        Ok(table)
    }

    /// Target indices within the exact cutoff of point `i`.
    #[inline]
    pub fn neighbors(&self, i: usize) -> &[u32] {
        &self.lists[i][..self.active[i] as usize]
    }

    /// The full cached candidate list of point `i`, trimmed and untrimmed
    /// entries alike.
    #[inline]
    pub fn candidates(&self, i: usize) -> &[u32] {
        &self.lists[i]
    }

    /// Number of source points the table covers.
    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    /// Version-gated refresh against `list`.
    ///
    /// A version mismatch means the list re-binned since the candidates
    /// were gathered, so they are recomputed; otherwise only the active
    /// prefixes are re-partitioned.
    pub fn update(&mut self, list: &CellList) {
        if self.src_version != list.version() || self.trg_version != list.version() {
            self.rebuild(true, list, list);
            self.src_version = list.version();
            self.trg_version = list.version();
        } else {
            trace!("neighbor candidates still valid, trimming only");
        }
        self.refresh_active(list, list);
    }

    /// Version-gated refresh of an asymmetric query.
    pub fn update_between(&mut self, src: &CellList, trg: &CellList) -> Result<(), NeighborError> {
        check_compatible(src, trg)?;
        if self.src_version != src.version() || self.trg_version != trg.version() {
            self.rebuild(false, src, trg);
            self.src_version = src.version();
            self.trg_version = trg.version();
        } else {
            trace!("neighbor candidates still valid, trimming only");
        }
        self.refresh_active(src, trg);
        Ok(())
    }

    /// Gather candidates cell by cell through the target trie.
    ///
    /// Pairs are kept below the inflated cutoff (the binning grid
    /// spacing), deliberately a superset of the interaction radius;
    /// [`NeighborTable::refresh_active`] trims against the exact cutoff.
    /// Cells partition the sorted point range, so per-cell writers get
    /// disjoint rows of the per-point lists.
    fn rebuild(&mut self, same_list: bool, src: &CellList, trg: &CellList) {
        self.lists.resize_with(src.len(), Vec::new);
        self.lists.par_iter_mut().for_each(|list| list.clear());
        if src.is_empty() || trg.is_empty() {
            return;
        }

        let wide = src.grid_size();
        let wide2 = wide * wide;
        let rows = split_by_starts(&mut self.lists, src.cell_starts());
        rows.into_par_iter().enumerate().for_each(|(ci, row)| {
            let ci = ci as u32;
            let own_coords = src.cell_coords(ci);
            let mut cells = [0u32; 27];
            let mut ncells = 0;
            for off in NEIGHBOR_OFFSETS {
                if let Some(tc) = trg.cell_id(own_coords + off) {
                    cells[ncells] = tc;
                    ncells += 1;
                }
            }

            let own_start = src.cell_start(ci);
            for &tc in &cells[..ncells] {
                for ti in trg.cell_start(tc)..trg.cell_end(tc) {
                    let tp = trg.point(ti);
                    for (k, list) in row.iter_mut().enumerate() {
                        let si = own_start + k;
                        if same_list && si == ti {
                            continue;
                        }
                        if (src.point(si) - tp).length_squared() < wide2 {
                            list.push(ti as u32);
                        }
                    }
                }
            }
        });
    }

    /// Partition every candidate list in place against the exact cutoff.
    ///
    /// Failing entries swap to the tail; nothing is reallocated or
    /// resorted. Each point owns its sublist, so the parallel mutation
    /// needs no synchronization.
    pub(crate) fn refresh_active(&mut self, src: &CellList, trg: &CellList) {
        self.active.resize(src.len(), 0);
        let tight = src.cell_size();
        let tight2 = tight * tight;
        self.active
            .par_iter_mut()
            .zip(self.lists.par_iter_mut())
            .enumerate()
            .for_each(|(i, (active, list))| {
                let p = src.point(i);
                let mut j = 0;
                let mut end = list.len();
                while j != end {
                    if (p - trg.point(list[j] as usize)).length_squared() >= tight2 {
                        end -= 1;
                        list.swap(j, end);
                    } else {
                        j += 1;
                    }
                }
                *active = end as u32;
            });
    }
}

pub(crate) fn check_compatible(src: &CellList, trg: &CellList) -> Result<(), NeighborError> {
    if trg.is_empty() {
        return Ok(());
    }
    if src.cell_size() != trg.cell_size() {
        return Err(NeighborError::CellSizeMismatch {
            src: src.cell_size(),
            trg: trg.cell_size(),
        });
    }
    if src.cell_factor() != trg.cell_factor() {
        return Err(NeighborError::CellFactorMismatch {
            src: src.cell_factor(),
            trg: trg.cell_factor(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use glam::DVec3;

    use super::*;

    #[test]
    fn mismatched_cell_sizes_are_rejected() {
        let (_, a) = CellList::new(0.1, vec![DVec3::ZERO]);
        let (_, b) = CellList::new(0.2, vec![DVec3::new(0.05, 0.0, 0.0)]);
        assert!(matches!(
            NeighborTable::between(&a, &b),
            Err(NeighborError::CellSizeMismatch { .. })
        ));
    }

    #[test]
    fn mismatched_cell_factors_are_rejected() {
        use crate::cell_list::CellListParams;

        let (_, a) = CellList::new(0.1, vec![DVec3::ZERO]);
        let params = CellListParams { cell_factor: 1.5 };
        let (_, b) = CellList::with_params(params, 0.1, vec![DVec3::new(0.05, 0.0, 0.0)]);
        assert!(matches!(
            NeighborTable::between(&a, &b),
            Err(NeighborError::CellFactorMismatch { .. })
        ));
    }

    #[test]
    fn empty_target_is_not_an_error() {
        let (_, a) = CellList::new(0.1, vec![DVec3::ZERO, DVec3::new(1.0, 0.0, 0.0)]);
        let (_, b) = CellList::new(0.2, Vec::new());
        let table = NeighborTable::between(&a, &b).expect("empty target is fine");
        assert_eq!(table.len(), 2);
        assert!(table.neighbors(0).is_empty());
        assert!(table.candidates(1).is_empty());
    }

    #[test]
    fn self_table_skips_own_index() {
        let points = vec![
            DVec3::ZERO,
            DVec3::new(0.05, 0.0, 0.0),
            DVec3::new(0.0, 0.05, 0.0),
        ];
        let (_, list) = CellList::new(0.1, points);
        let table = NeighborTable::new(&list);
        for i in 0..list.len() {
            assert!(
                !table.candidates(i).contains(&(i as u32)),
                "point {i} listed itself"
            );
            assert_eq!(table.neighbors(i).len(), 2);
        }
    }
}
