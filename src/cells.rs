//! Cell coordinates and bulk spatial binning.
//!
//! Positions map to signed integer cell coordinates by flooring against a
//! grid spacing; [`CellBins`] sorts a whole point set into Morton order in
//! one shot and records the cells as CSR ranges over the sorted array.

use glam::{DVec3, IVec3, Vec3};
use rayon::prelude::*;

use crate::morton::{CodeIdx, MortonCode};

/// Offsets of the 3x3x3 neighborhood around a cell, own cell included.
pub const NEIGHBOR_OFFSETS: [IVec3; 27] = [
    IVec3::new(-1, -1, -1),
    IVec3::new(0, -1, -1),
    IVec3::new(1, -1, -1),
    IVec3::new(-1, 0, -1),
    IVec3::new(0, 0, -1),
    IVec3::new(1, 0, -1),
    IVec3::new(-1, 1, -1),
    IVec3::new(0, 1, -1),
    IVec3::new(1, 1, -1),
    IVec3::new(-1, -1, 0),
    IVec3::new(0, -1, 0),
    IVec3::new(1, -1, 0),
    IVec3::new(-1, 0, 0),
    IVec3::new(0, 0, 0),
    IVec3::new(1, 0, 0),
    IVec3::new(-1, 1, 0),
    IVec3::new(0, 1, 0),
    IVec3::new(1, 1, 0),
    IVec3::new(-1, -1, 1),
    IVec3::new(0, -1, 1),
    IVec3::new(1, -1, 1),
    IVec3::new(-1, 0, 1),
    IVec3::new(0, 0, 1),
    IVec3::new(1, 0, 1),
    IVec3::new(-1, 1, 1),
    IVec3::new(0, 1, 1),
    IVec3::new(1, 1, 1),
];

/// Cell coordinate of a position on a grid with `cell_size` spacing.
///
/// Floored, not truncated: positions just below zero land in cell -1
/// instead of collapsing onto cell 0.
#[inline]
pub fn cell_of(cell_size: f64, p: DVec3) -> IVec3 {
    (p / cell_size).floor().as_ivec3()
}

/// Sort/dedup core shared by [`CellBins`] and the live cell list.
pub(crate) struct BinnedPoints<M> {
    /// Maps each sorted slot to the point's original index; a permutation.
    pub index_map: Vec<u32>,
    /// Strictly increasing code per occupied cell.
    pub cell_mortons: Vec<M>,
    /// CSR ranges into the sorted point array; one sentinel past the cells.
    pub cell_starts: Vec<u32>,
}

pub(crate) fn bin_points<M: MortonCode>(grid_size: f64, points: &[DVec3]) -> BinnedPoints<M> {
    let mut pairs: Vec<CodeIdx<M>> = points
        .par_iter()
        .enumerate()
        .map(|(i, &p)| CodeIdx {
            code: M::encode(cell_of(grid_size, p)),
            idx: i as u32,
        })
        .collect();
    pairs.par_sort_unstable();

    let index_map: Vec<u32> = pairs.par_iter().map(|pair| pair.idx).collect();
    // Reuse the index slot for the sorted position, so after dedup each
    // surviving pair carries its cell's start.
    pairs
        .par_iter_mut()
        .enumerate()
        .for_each(|(i, pair)| pair.idx = i as u32);
    pairs.dedup_by_key(|pair| pair.code);

    let mut cell_mortons = Vec::with_capacity(pairs.len());
    let mut cell_starts = Vec::with_capacity(pairs.len() + 1);
    for pair in &pairs {
        cell_mortons.push(pair.code);
        cell_starts.push(pair.idx);
    }
    cell_starts.push(points.len() as u32);

    BinnedPoints {
        index_map,
        cell_mortons,
        cell_starts,
    }
}

/// Split a buffer into per-cell mutable rows along CSR boundaries.
///
/// The rows are disjoint, so parallel per-cell writers need no locks.
pub(crate) fn split_by_starts<'a, T>(buf: &'a mut [T], starts: &[u32]) -> Vec<&'a mut [T]> {
    let mut rows = Vec::with_capacity(starts.len().saturating_sub(1));
    let mut rest = buf;
    for w in starts.windows(2) {
        let (row, tail) = rest.split_at_mut((w[1] - w[0]) as usize);
        rows.push(row);
        rest = tail;
    }
    rows
}

/// One-shot binning of a point set into Morton-ordered cells.
///
/// The payload is stored at reduced precision: an `f32` offset from the
/// center of the owning cell. [`CellBins::positions`] reconstructs
/// absolute `f64` positions from the cell codes, accurate to f32 storage
/// epsilon regardless of where the domain sits in space.
#[derive(Clone, Debug)]
pub struct CellBins<M: MortonCode> {
    cell_size: f64,
    points: Vec<Vec3>,
    cell_mortons: Vec<M>,
    cell_starts: Vec<u32>,
}

impl<M: MortonCode> CellBins<M> {
    /// Bin `points` into cells of `cell_size` spacing.
    ///
    /// Returns the permutation mapping each sorted slot to the point's
    /// original index, and the bins. Order of points inside one cell is
    /// unspecified.
    pub fn build(cell_size: f64, points: &[DVec3]) -> (Vec<u32>, Self) {
        let binned = bin_points::<M>(cell_size, points);
        let packed: Vec<Vec3> = binned
            .index_map
            .par_iter()
            .map(|&old| {
                let p = points[old as usize];
                let center = (cell_of(cell_size, p).as_dvec3() + 0.5) * cell_size;
                (p - center).as_vec3()
            })
            .collect();
        (
            binned.index_map,
            Self {
                cell_size,
                points: packed,
                cell_mortons: binned.cell_mortons,
                cell_starts: binned.cell_starts,
            },
        )
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    pub fn num_cells(&self) -> usize {
        self.cell_mortons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    pub fn cell_mortons(&self) -> &[M] {
        &self.cell_mortons
    }

    pub fn cell_starts(&self) -> &[u32] {
        &self.cell_starts
    }

    /// Stored cell-center-relative offsets, Morton-sorted.
    pub fn packed_points(&self) -> &[Vec3] {
        &self.points
    }

    /// Reconstruct absolute positions from cell codes and stored offsets.
    pub fn positions(&self) -> Vec<DVec3> {
        let mut res = vec![DVec3::ZERO; self.points.len()];
        let rows = split_by_starts(&mut res, &self.cell_starts);
        rows.into_par_iter().enumerate().for_each(|(ci, row)| {
            let center = (self.cell_mortons[ci].decode().as_dvec3() + 0.5) * self.cell_size;
            let start = self.cell_starts[ci] as usize;
            for (j, out) in row.iter_mut().enumerate() {
                *out = center + self.points[start + j].as_dvec3();
            }
        });
        res
    }
}
