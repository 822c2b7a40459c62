//! Morton-keyed spatial index and Verlet neighbor lists for SPH particle
//! methods.
//!
//! A weakly-compressible SPH step evaluates pair interactions between
//! every particle and its neighbors within a cutoff radius. This crate
//! provides the machinery that keeps those queries cheap while the whole
//! point set moves every step:
//!
//! - [`Morton64`] / [`Morton32`]: Z-order codes over signed 3D cell
//!   coordinates
//! - [`CellBins`]: one-shot Morton binning with compact f32 payload
//! - [`CellOctree`]: O(depth) code-to-cell lookup trie
//! - [`CellList`]: the live index; accumulates drift, re-bins lazily
//!   behind a version counter
//! - [`NeighborTable`] / [`VerletList`]: wide candidate sets gathered
//!   rarely, trimmed to the exact cutoff cheaply every step
//!
//! # Example
//!
//! ```
//! use nsearch3d::{CellList, DVec3, VerletList};
//!
//! let cutoff = 0.1;
//! let points: Vec<DVec3> = (0..64)
//!     .map(|i| DVec3::new((i % 4) as f64, ((i / 4) % 4) as f64, (i / 16) as f64) * 0.05)
//!     .collect();
//!
//! let (_index_map, mut list) = CellList::new(cutoff, points);
//! let mut verlet = VerletList::new(&list);
//!
//! // Advance particles, then refresh the lists.
//! list.set_pos(0, list.point(0) + DVec3::new(0.001, 0.0, 0.0));
//! if let Some(map) = list.update() {
//!     // Re-permute velocity/density arrays with `map` here.
//!     let _ = map;
//! }
//! verlet.update(true, &list);
//!
//! for &j in verlet.neighbors(0) {
//!     assert!((list.point(0) - list.point(j as usize)).length() < cutoff);
//! }
//! ```

pub mod cell_list;
pub mod cells;
pub mod morton;
pub mod neighbors;
pub mod octree;
pub mod verlet;

pub use cell_list::{apply_index_map, CellList, CellListParams};
pub use cells::{cell_of, CellBins, NEIGHBOR_OFFSETS};
pub use morton::{CodeIdx, Morton32, Morton64, MortonCode};
pub use neighbors::{NeighborError, NeighborTable};
pub use octree::{CellOctree, Node};
pub use verlet::VerletList;

pub use glam::{DVec3, IVec3};
