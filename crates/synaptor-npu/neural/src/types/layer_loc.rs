// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Layer locations and index arithmetic.
//!
//! Buffers are laid out feature-fastest: `k = (ky * nx + kx) * nf + kf`.
//! The *restricted* space covers interior neurons only; the *extended* space
//! adds a halo of `lt`/`rt` columns and `up`/`dn` rows.

/// Halo (margin) widths around the restricted region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub struct Halo {
    pub lt: usize,
    pub rt: usize,
    pub dn: usize,
    pub up: usize,
}

impl Halo {
    pub fn new(x_margin: usize, y_margin: usize) -> Self {
        Self {
            lt: x_margin,
            rt: x_margin,
            dn: y_margin,
            up: y_margin,
        }
    }

    pub fn uniform(margin: usize) -> Self {
        Self::new(margin, margin)
    }

    /// Raise each side to at least the given widths. Never lowers a side.
    pub fn raise_to(&mut self, x_margin: usize, y_margin: usize) {
        self.lt = self.lt.max(x_margin);
        self.rt = self.rt.max(x_margin);
        self.dn = self.dn.max(y_margin);
        self.up = self.up.max(y_margin);
    }
}

/// Grid dimensions of one layer on this process, plus its place in the global grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub struct LayerLoc {
    pub nx: usize,
    pub ny: usize,
    pub nf: usize,
    pub nbatch: usize,
    pub nx_global: usize,
    pub ny_global: usize,
    pub kx0: usize,
    pub ky0: usize,
    pub halo: Halo,
}

impl LayerLoc {
    /// Single-process layer: the local grid is the global grid.
    pub fn new(nx: usize, ny: usize, nf: usize, nbatch: usize) -> Self {
        Self {
            nx,
            ny,
            nf,
            nbatch,
            nx_global: nx,
            ny_global: ny,
            kx0: 0,
            ky0: 0,
            halo: Halo::default(),
        }
    }

    pub fn with_halo(mut self, halo: Halo) -> Self {
        self.halo = halo;
        self
    }

    pub fn with_global(mut self, nx_global: usize, ny_global: usize, kx0: usize, ky0: usize) -> Self {
        self.nx_global = nx_global;
        self.ny_global = ny_global;
        self.kx0 = kx0;
        self.ky0 = ky0;
        self
    }

    #[inline]
    pub fn nx_ext(&self) -> usize {
        self.nx + self.halo.lt + self.halo.rt
    }

    #[inline]
    pub fn ny_ext(&self) -> usize {
        self.ny + self.halo.dn + self.halo.up
    }

    #[inline]
    pub fn num_restricted(&self) -> usize {
        self.nx * self.ny * self.nf
    }

    #[inline]
    pub fn num_extended(&self) -> usize {
        self.nx_ext() * self.ny_ext() * self.nf
    }

    /// Same grid and feature count (halo and batch ignored).
    pub fn same_extent(&self, other: &LayerLoc) -> bool {
        self.nx == other.nx
            && self.ny == other.ny
            && self.nf == other.nf
            && self.nx_global == other.nx_global
            && self.ny_global == other.ny_global
    }

    /// Map a restricted index to the extended index of the same neuron.
    #[inline]
    pub fn extended_index(&self, k_restricted: usize) -> usize {
        let kx = kx_pos(k_restricted, self.nx, self.ny, self.nf);
        let ky = ky_pos(k_restricted, self.nx, self.ny, self.nf);
        let kf = feature_index(k_restricted, self.nf);
        k_index(
            kx + self.halo.lt,
            ky + self.halo.up,
            kf,
            self.nx_ext(),
            self.ny_ext(),
            self.nf,
        )
    }

    /// Map an extended index to restricted space; `None` for halo neurons.
    pub fn restricted_index(&self, k_extended: usize) -> Option<usize> {
        let nx_ext = self.nx_ext();
        let ny_ext = self.ny_ext();
        let kx = kx_pos(k_extended, nx_ext, ny_ext, self.nf);
        let ky = ky_pos(k_extended, nx_ext, ny_ext, self.nf);
        let kf = feature_index(k_extended, self.nf);
        let rx = kx.checked_sub(self.halo.lt).filter(|&x| x < self.nx)?;
        let ry = ky.checked_sub(self.halo.up).filter(|&y| y < self.ny)?;
        Some(k_index(rx, ry, kf, self.nx, self.ny, self.nf))
    }

    /// Index of a local extended neuron in the global extended grid.
    pub fn global_extended_index(&self, k_extended: usize) -> usize {
        let nx_ext = self.nx_ext();
        let ny_ext = self.ny_ext();
        let kx = kx_pos(k_extended, nx_ext, ny_ext, self.nf);
        let ky = ky_pos(k_extended, nx_ext, ny_ext, self.nf);
        let kf = feature_index(k_extended, self.nf);
        k_index(
            kx + self.kx0,
            ky + self.ky0,
            kf,
            self.nx_global + self.halo.lt + self.halo.rt,
            self.ny_global + self.halo.dn + self.halo.up,
            self.nf,
        )
    }

    /// Inverse of [`global_extended_index`](Self::global_extended_index) restricted to
    /// this process's interior. `None` when the neuron lies in the halo or on another process.
    pub fn local_restricted_from_global_extended(&self, k_global: usize) -> Option<usize> {
        let nx_gext = self.nx_global + self.halo.lt + self.halo.rt;
        let ny_gext = self.ny_global + self.halo.dn + self.halo.up;
        if k_global >= nx_gext * ny_gext * self.nf {
            return None;
        }
        let kx = kx_pos(k_global, nx_gext, ny_gext, self.nf);
        let ky = ky_pos(k_global, nx_gext, ny_gext, self.nf);
        let kf = feature_index(k_global, self.nf);
        let rx = kx
            .checked_sub(self.halo.lt + self.kx0)
            .filter(|&x| x < self.nx)?;
        let ry = ky
            .checked_sub(self.halo.up + self.ky0)
            .filter(|&y| y < self.ny)?;
        Some(k_index(rx, ry, kf, self.nx, self.ny, self.nf))
    }
}

#[inline]
pub fn k_index(kx: usize, ky: usize, kf: usize, nx: usize, _ny: usize, nf: usize) -> usize {
    (ky * nx + kx) * nf + kf
}

#[inline]
pub fn kx_pos(k: usize, nx: usize, _ny: usize, nf: usize) -> usize {
    (k / nf) % nx
}

#[inline]
pub fn ky_pos(k: usize, nx: usize, _ny: usize, nf: usize) -> usize {
    k / (nx * nf)
}

#[inline]
pub fn feature_index(k: usize, nf: usize) -> usize {
    k % nf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_loc() -> LayerLoc {
        LayerLoc::new(4, 3, 2, 1).with_halo(Halo::new(2, 1))
    }

    #[test]
    fn test_extended_sizes() {
        let loc = create_test_loc();
        assert_eq!(loc.nx_ext(), 8);
        assert_eq!(loc.ny_ext(), 5);
        assert_eq!(loc.num_restricted(), 24);
        assert_eq!(loc.num_extended(), 80);
    }

    #[test]
    fn test_restricted_extended_round_trip() {
        let loc = create_test_loc();
        for k in 0..loc.num_restricted() {
            let ext = loc.extended_index(k);
            assert_eq!(loc.restricted_index(ext), Some(k));
        }
    }

    #[test]
    fn test_halo_has_no_restricted_index() {
        let loc = create_test_loc();
        // first extended row is all halo
        for k in 0..loc.nx_ext() * loc.nf {
            assert_eq!(loc.restricted_index(k), None);
        }
    }

    #[test]
    fn test_global_mapping_on_offset_process() {
        let loc = LayerLoc::new(4, 4, 1, 1)
            .with_halo(Halo::uniform(1))
            .with_global(8, 8, 4, 0);
        let k_ext = k_index(1, 1, 0, loc.nx_ext(), loc.ny_ext(), 1);
        let global = loc.global_extended_index(k_ext);
        assert_eq!(global, k_index(5, 1, 0, 10, 10, 1));
        assert_eq!(loc.local_restricted_from_global_extended(global), Some(0));
        // a neuron owned by the left-hand process
        let left = k_index(2, 1, 0, 10, 10, 1);
        assert_eq!(loc.local_restricted_from_global_extended(left), None);
    }

    #[test]
    fn test_raise_never_lowers() {
        let mut halo = Halo::new(3, 1);
        halo.raise_to(2, 2);
        assert_eq!(halo, Halo { lt: 3, rt: 3, dn: 2, up: 2 });
    }
}
