//! Compact octree over sorted Morton codes.
//!
//! The trie maps a cell's Morton code to its cell id in O(depth). Nodes
//! are flat 8-slot arrays kept in one contiguous buffer; unset slots hold
//! a sentinel internally and surface as `None` at the public boundary.

use std::marker::PhantomData;

use crate::morton::MortonCode;

/// Flat trie node: one child slot per octal digit.
pub type Node = [u32; 8];

const INVALID: u32 = u32::MAX;
const EMPTY_NODE: Node = [INVALID; 8];

/// Layered 8-ary trie over a strictly increasing Morton code set.
#[derive(Clone, Debug)]
pub struct CellOctree<M: MortonCode> {
    depth: u32,
    nodes: Vec<Node>,
    marker: PhantomData<M>,
}

impl<M: MortonCode> CellOctree<M> {
    /// Build from strictly increasing cell codes.
    ///
    /// Layer 0 children are the cell ids themselves. Each pass groups the
    /// current layer by parent key (`code >> 3`) into one node per run and
    /// stops when a single run remains, which becomes the root; all codes
    /// collapse to one parent within `MAX_DEPTH` passes.
    pub fn build(sorted_codes: &[M]) -> Self {
        let mut nodes = vec![EMPTY_NODE];
        if sorted_codes.is_empty() {
            return Self {
                depth: 0,
                nodes,
                marker: PhantomData,
            };
        }

        let mut codes: Vec<u64> = sorted_codes.iter().map(|c| c.to_bits()).collect();
        // Global ids of the current child layer: cell ids at the bottom,
        // node ids above.
        let mut ids: Vec<u32> = (0..codes.len() as u32).collect();
        let mut depth = 0;

        for layer in 0..=M::MAX_DEPTH {
            // (parent key, first child) per contiguous run.
            let mut runs: Vec<(u64, usize)> = Vec::new();
            for (j, &code) in codes.iter().enumerate() {
                let parent = code >> 3;
                if runs.last().map(|&(key, _)| key) != Some(parent) {
                    runs.push((parent, j));
                }
            }

            if runs.len() == 1 {
                let mut root = EMPTY_NODE;
                for (j, &code) in codes.iter().enumerate() {
                    root[(code & 7) as usize] = ids[j];
                }
                nodes[0] = root;
                depth = layer;
                break;
            }

            let base = nodes.len() as u32;
            for (r, &(_, first)) in runs.iter().enumerate() {
                let end = runs.get(r + 1).map_or(codes.len(), |&(_, f)| f);
                let mut node = EMPTY_NODE;
                for j in first..end {
                    node[(codes[j] & 7) as usize] = ids[j];
                }
                nodes.push(node);
            }

            codes = runs.iter().map(|&(key, _)| key).collect();
            ids = (0..runs.len() as u32).map(|i| base + i).collect();
        }

        Self {
            depth,
            nodes,
            marker: PhantomData,
        }
    }

    /// Cell id stored for `code`, or `None` when the walk hits an unset
    /// slot.
    ///
    /// The walk consumes `depth + 1` octal digits, so only codes sharing
    /// the root prefix are fully checked: a code outside the indexed
    /// region can alias onto an unrelated cell. Callers needing exactness
    /// compare the returned cell's stored code or filter by distance, as
    /// the neighbor search does.
    #[inline]
    pub fn get(&self, code: M) -> Option<u32> {
        Self::walk(code.to_bits(), &self.nodes, self.depth)
    }

    /// Walk a raw node buffer without an octree instance.
    ///
    /// Agrees with [`CellOctree::get`] on the same `nodes`/`depth`.
    pub fn lookup_in(code: M, nodes: &[Node], depth: u32) -> Option<u32> {
        Self::walk(code.to_bits(), nodes, depth)
    }

    fn walk(mut m: u64, nodes: &[Node], depth: u32) -> Option<u32> {
        // Reverse the low digits so the descent consumes them top-down.
        let mut rev = 0u64;
        for _ in 0..depth {
            rev = (rev << 3) | (m & 7);
            m >>= 3;
        }
        let mut cur = nodes[0][(m & 7) as usize];
        for _ in 0..depth {
            if cur == INVALID {
                return None;
            }
            cur = nodes[cur as usize][(rev & 7) as usize];
            rev >>= 3;
        }
        (cur != INVALID).then_some(cur)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }
}

#[cfg(test)]
mod tests {
    use glam::DVec3;

    use super::*;
    use crate::cells::{bin_points, cell_of};
    use crate::morton::{Morton32, Morton64};

    fn mixed_cloud() -> Vec<DVec3> {
        // Near-origin cluster plus scattered far points, negatives included.
        vec![
            DVec3::new(2.0, 1.0, 1.0),
            DVec3::new(1.0, 1.0, 1.0),
            DVec3::new(1.0, 1.0, 2.0),
            DVec3::new(1.0, 2.0, 1.0),
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(-1.5, 0.5, -2.5),
            DVec3::new(0.1, 0.2, 0.3),
            DVec3::new(0.5, 0.4, 0.3),
            DVec3::new(-0.6, 0.7, 0.43),
            DVec3::new(44.0, 100.0, 234.0),
            DVec3::new(1.0, 400.0, 1.0),
            DVec3::new(346.0, 2.0, 0.0),
            DVec3::new(34.0, 3.0, 124.0),
            DVec3::new(65.0, 5.0, 3.0),
            DVec3::new(456.0, 50.0, -1.0),
            DVec3::new(0.32, 0.22, 0.33),
        ]
    }

    fn check_every_cell_found<M: MortonCode>() {
        let cell_size = 1.0;
        let points = mixed_cloud();
        let binned = bin_points::<M>(cell_size, &points);
        let octree = CellOctree::build(&binned.cell_mortons);

        for &p in &points {
            let code = M::encode(cell_of(cell_size, p));
            let cid = octree.get(code).expect("indexed cell not found") as usize;
            assert!(cid < binned.cell_mortons.len());
            assert_eq!(binned.cell_mortons[cid], code);
            assert_eq!(
                octree.get(code),
                CellOctree::<M>::lookup_in(code, octree.nodes(), octree.depth())
            );
        }
    }

    #[test]
    fn finds_every_indexed_cell_64() {
        check_every_cell_found::<Morton64>();
    }

    #[test]
    fn finds_every_indexed_cell_32() {
        check_every_cell_found::<Morton32>();
    }

    #[test]
    fn empty_octree_finds_nothing() {
        let octree = CellOctree::<Morton64>::build(&[]);
        assert_eq!(octree.depth(), 0);
        assert_eq!(octree.get(Morton64::encode(glam::IVec3::ZERO)), None);
    }

    #[test]
    fn single_cell_collapses_to_root() {
        let code = Morton64::encode(glam::IVec3::new(5, 6, 7));
        let octree = CellOctree::build(&[code]);
        assert_eq!(octree.depth(), 0);
        assert_eq!(octree.get(code), Some(0));
    }

    #[test]
    fn unset_sibling_slots_miss() {
        let cell_size = 1.0;
        let points = mixed_cloud();
        let binned = bin_points::<Morton64>(cell_size, &points);
        let octree = CellOctree::build(&binned.cell_mortons);

        // (3, 3, 3) is adjacent to the origin cluster but unoccupied; its
        // code shares the root prefix, so the walk must report a miss.
        let probe = Morton64::encode(glam::IVec3::new(3, 3, 3));
        assert!(!binned.cell_mortons.contains(&probe));
        assert_eq!(octree.get(probe), None);
    }
}
