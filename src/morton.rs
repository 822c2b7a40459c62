//! Morton (Z-order) codes for 3D cell coordinates.
//!
//! A Morton code interleaves the bits of the three cell coordinates into a
//! single integer, so sorting by code clusters spatially nearby cells.
//! Two widths are provided: [`Morton64`] with 21 bits per axis, and
//! [`Morton32`] with 10 bits per axis, which halves key memory and sort
//! bandwidth for domains small enough to fit.
//!
//! Cell coordinates are signed. Each axis is shifted by half the
//! representable range before interleaving, so cells at negative
//! coordinates encode without wraparound and decode back exactly.

use std::fmt;
use std::hash::Hash;
use std::ops::{BitAnd, BitOr, Shl, Shr};

use glam::IVec3;

/// Bit-interleaving codec over one key width.
///
/// `decode(encode(c)) == c` for every coordinate whose axes fit in
/// `AXIS_BITS` signed bits. Integer order of codes approximates 3D
/// locality; the Z-curve jumps at power-of-two boundaries, so the
/// approximation is not exact and consumers must not rely on adjacency
/// of consecutive codes.
pub trait MortonCode:
    Copy + Ord + Hash + fmt::Debug + Default + Send + Sync + 'static
{
    /// Bits per axis.
    const AXIS_BITS: u32;
    /// Number of 3-bit octal digits in a full key.
    const MAX_DEPTH: u32;

    fn encode(coords: IVec3) -> Self;
    fn decode(self) -> IVec3;

    /// Widen the key to `u64`; lossless for both widths.
    fn to_bits(self) -> u64;
    fn from_bits(bits: u64) -> Self;
}

/// 64-bit Morton code, 21 bits per axis.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Morton64(pub u64);

/// 32-bit Morton code, 10 bits per axis.
///
/// Half the per-axis range of [`Morton64`] in exchange for half the key
/// memory; use it when the simulation domain spans fewer than 1024 cells
/// per axis.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Morton32(pub u32);

/// A code paired with the index it was computed from.
///
/// Sorting a `Vec<CodeIdx>` orders points by cell; the index field first
/// carries the original point index and is then reused for the sorted
/// position during binning.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct CodeIdx<M> {
    pub code: M,
    pub idx: u32,
}

// Split-by-3 magic masks: each step doubles the gap between payload bits
// until every coordinate bit sits three positions apart.
const MASKS_64: [u64; 6] = [
    0x001f_ffff,
    0x001f_0000_0000_ffff,
    0x001f_0000_ff00_00ff,
    0x100f_00f0_0f00_f00f,
    0x10c3_0c30_c30c_30c3,
    0x1249_2492_4924_9249,
];

const MASKS_32: [u32; 5] = [
    0x0000_03ff,
    0x0300_00ff,
    0x0300_f00f,
    0x030c_30c3,
    0x0924_9249,
];

#[inline]
fn split_by_3_64(a: u32) -> u64 {
    let mut x = u64::from(a) & MASKS_64[0];
    x = (x | x << 32) & MASKS_64[1];
    x = (x | x << 16) & MASKS_64[2];
    x = (x | x << 8) & MASKS_64[3];
    x = (x | x << 4) & MASKS_64[4];
    x = (x | x << 2) & MASKS_64[5];
    x
}

#[inline]
fn compact_by_3_64(m: u64) -> u32 {
    let mut x = m & MASKS_64[5];
    x = (x ^ (x >> 2)) & MASKS_64[4];
    x = (x ^ (x >> 4)) & MASKS_64[3];
    x = (x ^ (x >> 8)) & MASKS_64[2];
    x = (x ^ (x >> 16)) & MASKS_64[1];
    x = (x ^ (x >> 32)) & MASKS_64[0];
    x as u32
}

#[inline]
fn split_by_3_32(a: u32) -> u32 {
    let mut x = a & MASKS_32[0];
    x = (x | x << 16) & MASKS_32[1];
    x = (x | x << 8) & MASKS_32[2];
    x = (x | x << 4) & MASKS_32[3];
    x = (x | x << 2) & MASKS_32[4];
    x
}

#[inline]
fn compact_by_3_32(m: u32) -> u32 {
    let mut x = m & MASKS_32[4];
    x = (x ^ (x >> 2)) & MASKS_32[3];
    x = (x ^ (x >> 4)) & MASKS_32[2];
    x = (x ^ (x >> 8)) & MASKS_32[1];
    x = (x ^ (x >> 16)) & MASKS_32[0];
    x
}

/// Shift a signed axis into the unsigned range `[0, 2^axis_bits)`.
#[inline]
fn to_axis(c: i32, axis_bits: u32) -> u32 {
    let half = 1i32 << (axis_bits - 1);
    debug_assert!(
        (-half..half).contains(&c),
        "cell coordinate {c} outside the signed {axis_bits}-bit axis range"
    );
    (c + half) as u32
}

#[inline]
fn from_axis(u: u32, axis_bits: u32) -> i32 {
    u as i32 - (1i32 << (axis_bits - 1))
}

impl MortonCode for Morton64 {
    const AXIS_BITS: u32 = 21;
    const MAX_DEPTH: u32 = 21;

    #[inline]
    fn encode(coords: IVec3) -> Self {
        let x = split_by_3_64(to_axis(coords.x, Self::AXIS_BITS));
        let y = split_by_3_64(to_axis(coords.y, Self::AXIS_BITS));
        let z = split_by_3_64(to_axis(coords.z, Self::AXIS_BITS));
        Morton64(x | y << 1 | z << 2)
    }

    #[inline]
    fn decode(self) -> IVec3 {
        IVec3::new(
            from_axis(compact_by_3_64(self.0), Self::AXIS_BITS),
            from_axis(compact_by_3_64(self.0 >> 1), Self::AXIS_BITS),
            from_axis(compact_by_3_64(self.0 >> 2), Self::AXIS_BITS),
        )
    }

    #[inline]
    fn to_bits(self) -> u64 {
        self.0
    }

    #[inline]
    fn from_bits(bits: u64) -> Self {
        Morton64(bits)
    }
}

impl MortonCode for Morton32 {
    const AXIS_BITS: u32 = 10;
    const MAX_DEPTH: u32 = 10;

    #[inline]
    fn encode(coords: IVec3) -> Self {
        let x = split_by_3_32(to_axis(coords.x, Self::AXIS_BITS));
        let y = split_by_3_32(to_axis(coords.y, Self::AXIS_BITS));
        let z = split_by_3_32(to_axis(coords.z, Self::AXIS_BITS));
        Morton32(x | y << 1 | z << 2)
    }

    #[inline]
    fn decode(self) -> IVec3 {
        IVec3::new(
            from_axis(compact_by_3_32(self.0), Self::AXIS_BITS),
            from_axis(compact_by_3_32(self.0 >> 1), Self::AXIS_BITS),
            from_axis(compact_by_3_32(self.0 >> 2), Self::AXIS_BITS),
        )
    }

    #[inline]
    fn to_bits(self) -> u64 {
        u64::from(self.0)
    }

    #[inline]
    fn from_bits(bits: u64) -> Self {
        Morton32(bits as u32)
    }
}

macro_rules! morton_ops {
    ($ty:ident) => {
        impl $ty {
            /// Lowest 3-bit digit, the key's position within its parent
            /// octant.
            #[inline]
            pub fn last_octal_digit(self) -> u32 {
                (self.0 & 7) as u32
            }
        }

        impl Shr<u32> for $ty {
            type Output = Self;
            #[inline]
            fn shr(self, s: u32) -> Self {
                $ty(self.0 >> s)
            }
        }

        impl Shl<u32> for $ty {
            type Output = Self;
            #[inline]
            fn shl(self, s: u32) -> Self {
                $ty(self.0 << s)
            }
        }

        impl BitOr for $ty {
            type Output = Self;
            #[inline]
            fn bitor(self, rhs: Self) -> Self {
                $ty(self.0 | rhs.0)
            }
        }

        impl BitAnd for $ty {
            type Output = Self;
            #[inline]
            fn bitand(self, rhs: Self) -> Self {
                $ty(self.0 & rhs.0)
            }
        }

        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($ty), "({:#o})"), self.0)
            }
        }
    };
}

morton_ops!(Morton64);
morton_ops!(Morton32);
