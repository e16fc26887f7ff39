use std::f64::consts::PI;
use ndarray::{Array1, Array3, ArrayView3};
use num::complex::Complex64;
use crate::fields::TINY;
use crate::grid::Grid;
use crate::lookup_table::LookupTable;




/**
 * Restriction of an angular integral to a polar band around a
 * time-averaged scale-height profile: cells pass when their polar angle is
 * within `multiplier` scale heights of the midplane.
 */
pub struct PolarBand<'a> {
    pub profile: &'a LookupTable,
    pub multiplier: f64,
}


/**
 * Optional cell filters applied by the integrator. Filters are hard
 * restrictions (a cell is in or out); smooth region weighting is applied
 * through the separate mask argument.
 */
pub struct Filters<'a> {

    /// Keep only cells with negative radial transport velocity
    pub inflow_only: bool,

    /// Keep only cells whose magnetization lies in [lo, hi)
    pub sigma_band: Option<(f64, f64)>,

    /// Keep only cells near the time-averaged midplane
    pub polar_band: Option<PolarBand<'a>>,

    /// Keep only cells whose azimuth lies in [lo, hi); used to avoid
    /// contaminating measurements with warped-disk phase mixing
    pub phi_range: Option<(f64, f64)>,

    /// Radial transport velocity, required when `inflow_only` is set
    pub radial_velocity: Option<&'a Array3<f64>>,

    /// Magnetization, required when `sigma_band` is set
    pub sigma: Option<&'a Array3<f64>>,
}

impl<'a> Filters<'a> {
    pub fn none() -> Self {
        Self {
            inflow_only: false,
            sigma_band: None,
            polar_band: None,
            phi_range: None,
            radial_velocity: None,
            sigma: None,
        }
    }
}




/**
 * Integrates a 3D field over the two non-radial axes under a mask, with
 * the wedge-to-full-circle rescaling. Reduction modes: a radial profile, a
 * full-domain scalar, or an azimuthal-mode amplitude spectrum.
 */
pub struct AngularIntegrator<'g> {
    grid: &'g Grid,
}




// ============================================================================
impl<'g> AngularIntegrator<'g> {

    pub fn new(grid: &'g Grid) -> Self {
        Self { grid }
    }

    fn cell_passes(&self, filters: &Filters, i: usize, j: usize, k: usize) -> bool {
        if filters.inflow_only {
            match filters.radial_velocity {
                Some(vr) if vr[[i, j, k]] < 0.0 => {}
                _ => return false,
            }
        }
        if let Some((lo, hi)) = filters.sigma_band {
            match filters.sigma {
                Some(sigma) if sigma[[i, j, k]] >= lo && sigma[[i, j, k]] < hi => {}
                _ => return false,
            }
        }
        if let Some(band) = &filters.polar_band {
            let r = self.grid.r[[i, j, k]];
            let height = band.multiplier * band.profile.sample(r);
            if (self.grid.h[[i, j, k]] - PI / 2.0).abs() > height {
                return false
            }
        }
        if let Some((lo, hi)) = filters.phi_range {
            let ph = self.grid.ph[[i, j, k]];
            if ph < lo || ph >= hi {
                return false
            }
        }
        true
    }

    /**
     * The masked integral over solid angle, per radial zone, rescaled to
     * the full circle.
     */
    pub fn profile(&self, integrand: ArrayView3<f64>, mask: Option<ArrayView3<f64>>, filters: &Filters) -> Array1<f64> {
        let [n1, n2, n3] = self.grid.num_zones;
        let [_, dx2, dx3] = self.grid.cell_size;
        let rescale = self.grid.wedge_rescale();
        let mut out = Array1::zeros(n1);

        for i in 0..n1 {
            let mut sum = 0.0;
            for j in 0..n2 {
                for k in 0..n3 {
                    if !self.cell_passes(filters, i, j, k) {
                        continue
                    }
                    let weight = match &mask {
                        Some(m) => m[[i, j, k]],
                        None => 1.0,
                    };
                    sum += integrand[[i, j, k]] * weight * self.grid.gdet[[i, j, k]] * dx2 * dx3;
                }
            }
            out[i] = sum * rescale;
        }
        out
    }

    /**
     * The masked integral over the whole domain: the radial profile
     * further reduced with the radial cell size.
     */
    pub fn total(&self, integrand: ArrayView3<f64>, mask: Option<ArrayView3<f64>>, filters: &Filters) -> f64 {
        self.profile(integrand, mask, filters).sum() * self.grid.cell_size[0]
    }

    /**
     * Amplitudes of the azimuthal Fourier modes of the theta-integrated,
     * radially averaged distribution, over the radial zone range [i0, i1).
     * Mode 0 equals the mean of the distribution; a pure cosine of mode m
     * shows up at index m with half its peak amplitude. The distribution
     * is built from the simulated wedge, so mode numbers are harmonics of
     * the full circle only when the wedge covers it.
     */
    pub fn mode_spectrum(
        &self,
        integrand: ArrayView3<f64>,
        mask: Option<ArrayView3<f64>>,
        filters: &Filters,
        num_modes: usize,
        radial_range: (usize, usize)) -> Array1<f64>
    {
        let [_, n2, n3] = self.grid.num_zones;
        let [dx1, dx2, _] = self.grid.cell_size;
        let (i0, i1) = radial_range;
        let jm = n2 / 2;

        // theta- and radius-reduced azimuthal distribution
        let mut dist = vec![0.0; n3];
        let mut measure = 0.0;
        for k in 0..n3 {
            for i in i0..i1 {
                for j in 0..n2 {
                    if !self.cell_passes(filters, i, j, k) {
                        continue
                    }
                    let weight = match &mask {
                        Some(m) => m[[i, j, k]],
                        None => 1.0,
                    };
                    dist[k] += integrand[[i, j, k]] * weight * self.grid.gdet[[i, j, k]] * dx1 * dx2;
                }
            }
        }
        for i in i0..i1 {
            for j in 0..n2 {
                measure += self.grid.gdet[[i, j, 0]] * dx1 * dx2;
            }
        }

        let wedge = self.grid.wedge_angle();
        let mut spectrum = Array1::zeros(num_modes);
        for m in 0..num_modes.min(n3) {
            let mut coefficient = Complex64::new(0.0, 0.0);
            for k in 0..n3 {
                let phi = self.grid.ph[[i0, jm, k]];
                let phase = Complex64::new(0.0, -2.0 * PI * m as f64 * phi / wedge).exp();
                coefficient += Complex64::new(dist[k], 0.0) * phase;
            }
            spectrum[m] = coefficient.norm() / (measure.max(TINY) * n3 as f64);
        }
        spectrum
    }
}
