//! Verlet-list policy over the cached neighbor table.
//!
//! The table already amortizes candidate gathering behind the cell list
//! version gate. This wrapper hands the remaining decision to the physics
//! driver: an integrator mid sub-step can force the cheap trim even when a
//! rebuild would be allowed, deferring the expensive recompute to the step
//! boundary it chooses.

use crate::cell_list::CellList;
use crate::neighbors::{check_compatible, NeighborError, NeighborTable};

/// Driver-controlled recompute-vs-trim neighbor list.
#[derive(Clone, Debug)]
pub struct VerletList {
    table: NeighborTable,
}

impl VerletList {
    /// Self-pair list over `list`.
    pub fn new(list: &CellList) -> Self {
        Self {
            table: NeighborTable::new(list),
        }
    }

    /// Asymmetric list, e.g. fluid sources against boundary targets.
    pub fn between(src: &CellList, trg: &CellList) -> Result<Self, NeighborError> {
        Ok(Self {
            table: NeighborTable::between(src, trg)?,
        })
    }

    /// Refresh the list.
    ///
    /// With `recompute` the version-gated path runs and may gather fresh
    /// candidates; without it only the active prefixes are re-partitioned,
    /// pinning the candidate sets regardless of list versions.
    pub fn update(&mut self, recompute: bool, list: &CellList) {
        if recompute {
            self.table.update(list);
        } else {
            self.table.refresh_active(list, list);
        }
    }

    /// Refresh an asymmetric list; see [`VerletList::update`].
    pub fn update_between(
        &mut self,
        recompute: bool,
        src: &CellList,
        trg: &CellList,
    ) -> Result<(), NeighborError> {
        if recompute {
            self.table.update_between(src, trg)
        } else {
            check_compatible(src, trg)?;
            self.table.refresh_active(src, trg);
            Ok(())
        }
    }

    /// Target indices within the exact cutoff of point `i`.
    #[inline]
    pub fn neighbors(&self, i: usize) -> &[u32] {
        self.table.neighbors(i)
    }

    /// Full cached candidate list of point `i`.
    #[inline]
    pub fn candidates(&self, i: usize) -> &[u32] {
        self.table.candidates(i)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
