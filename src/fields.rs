use ndarray::{Array, Array3, Array4, Ix5};
use serde::{Serialize, Deserialize};
use crate::grid::Grid;
use crate::regions::RegimeConstants;
use crate::snapshots::Snapshot;


/// Additive guard against division by a vanishing denominator. Degenerate
/// ratios fall back to a huge-but-finite value rather than raising.
pub static TINY: f64 = 1e-30;


/**
 * The permutation symbol on four indices: every permutation of (0,1,2,3)
 * together with its parity. Contractions with the Levi-Civita tensor loop
 * over this table instead of all 256 index combinations.
 */
static PERMUTATIONS: [([usize; 4], f64); 24] = [
    ([0, 1, 2, 3],  1.0), ([0, 1, 3, 2], -1.0), ([0, 2, 1, 3], -1.0),
    ([0, 2, 3, 1],  1.0), ([0, 3, 1, 2],  1.0), ([0, 3, 2, 1], -1.0),
    ([1, 0, 2, 3], -1.0), ([1, 0, 3, 2],  1.0), ([1, 2, 0, 3],  1.0),
    ([1, 2, 3, 0], -1.0), ([1, 3, 0, 2], -1.0), ([1, 3, 2, 0],  1.0),
    ([2, 0, 1, 3],  1.0), ([2, 0, 3, 1], -1.0), ([2, 1, 0, 3], -1.0),
    ([2, 1, 3, 0],  1.0), ([2, 3, 0, 1],  1.0), ([2, 3, 1, 0], -1.0),
    ([3, 0, 1, 2], -1.0), ([3, 0, 2, 1],  1.0), ([3, 1, 0, 2],  1.0),
    ([3, 1, 2, 0], -1.0), ([3, 2, 0, 1], -1.0), ([3, 2, 1, 0],  1.0),
];




/**
 * Strategy for restoring the azimuthal velocity in floor-corrected cells.
 * `KeepVelocity` leaves the stored velocity untouched; `TrackStationary`
 * drives the cell's angular velocity toward the stationary axisymmetric
 * value by bounded fixed-point refinement, which keeps the time component
 * of the four-velocity consistent with the unit norm. The iteration cap is
 * an accuracy limitation, not an error condition.
 */
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "snake_case", tag = "mode")]
pub enum FloorFixup {
    KeepVelocity,
    TrackStationary { max_iterations: usize },
}

impl Default for FloorFixup {
    fn default() -> Self {
        FloorFixup::TrackStationary { max_iterations: 10 }
    }
}




/**
 * All per-cell fields derived from one snapshot under the grid's metric.
 * Derived strictly from (Grid, Snapshot); never persisted; recomputed for
 * every snapshot.
 */
pub struct ReconstructedFields {

    /// Floor-corrected primitives
    pub rho: Array3<f64>,
    pub ug: Array3<f64>,
    pub pg: Array3<f64>,

    /// Four-velocity, contravariant and covariant
    pub ucon: Array4<f64>,
    pub ucov: Array4<f64>,

    /// Comoving magnetic field, contravariant and covariant
    pub bcon: Array4<f64>,
    pub bcov: Array4<f64>,

    /// Comoving field strength squared (twice the magnetic pressure) and
    /// the magnetization bsq / rho
    pub bsq: Array3<f64>,
    pub sigma: Array3<f64>,

    /// Stress-energy decomposition: electromagnetic, matter, rest-mass and
    /// internal-energy parts, mixed indices T^m_n
    pub tud_em: Array<f64, Ix5>,
    pub tud_ma: Array<f64, Ix5>,
    pub tud_rm: Array<f64, Ix5>,
    pub tud_ie: Array<f64, Ix5>,

    /// Faraday tensor, covariant and contravariant
    pub fcov: Array<f64, Ix5>,
    pub fcon: Array<f64, Ix5>,

    /// Field-line angular velocity (physical units), two estimators
    pub omegaf1: Array3<f64>,
    pub omegaf2: Array3<f64>,

    /// 1.0 where the floor correction replaced the cell's thermodynamics
    pub floored: Array3<f64>,

    /// Normalized divergence of the face-centered flux, when the snapshot
    /// carries the face-flux columns
    pub divb: Option<Array3<f64>>,
}

impl ReconstructedFields {

    /// Radial transport velocity u^1 / u^0, used by the inflow filter.
    pub fn radial_velocity(&self) -> Array3<f64> {
        let [_, n1, n2, n3] = dim4(&self.ucon);
        let mut vr = Array3::zeros((n1, n2, n3));
        for i in 0..n1 {
            for j in 0..n2 {
                for k in 0..n3 {
                    vr[[i, j, k]] = self.ucon[[1, i, j, k]] / self.ucon[[0, i, j, k]];
                }
            }
        }
        vr
    }

    /// The Bernoulli parameter -u_t (rho + gamma u) / rho - 1; positive
    /// values mark unbound material.
    pub fn bernoulli(&self) -> Array3<f64> {
        let [_, n1, n2, n3] = dim4(&self.ucon);
        let mut be = Array3::zeros((n1, n2, n3));
        for i in 0..n1 {
            for j in 0..n2 {
                for k in 0..n3 {
                    let rho = self.rho[[i, j, k]];
                    let w = rho + self.ug[[i, j, k]] + self.pg[[i, j, k]];
                    be[[i, j, k]] = -self.ucov[[0, i, j, k]] * w / guarded(rho) - 1.0;
                }
            }
        }
        be
    }
}

fn dim4(a: &Array4<f64>) -> [usize; 4] {
    let (c, n1, n2, n3) = a.dim();
    [c, n1, n2, n3]
}

fn guarded(denominator: f64) -> f64 {
    if denominator.abs() < TINY {
        TINY
    } else {
        denominator
    }
}




/**
 * The magnetization ceiling applied by the floor pass, interpolated
 * geometrically between the inner and outer constants across the regime's
 * transition radius.
 */
pub fn floor_threshold(constants: &RegimeConstants, radius: f64) -> f64 {
    let w = constants.floor_transition_width.ln();
    let x = (radius / constants.floor_transition_radius).ln();
    let t = (0.5 + 0.5 * x / w).max(0.0).min(1.0);
    ((1.0 - t) * constants.floor_sigma_inner.ln() + t * constants.floor_sigma_outer.ln()).exp()
}


/// Angular velocity of the stationary axisymmetric solution the floor
/// fixup tracks, in physical units.
fn stationary_angular_velocity(radius: f64, spin: f64) -> f64 {
    1.0 / (radius.powf(1.5) + spin)
}




// ============================================================================
/**
 * Reconstruct the derived tensor fields for one snapshot. The steps run in
 * a fixed order: ZAMO four-velocity, floor correction, index lowering,
 * comoving field, stress-energy decomposition, Faraday tensor and the
 * field-line angular velocities.
 */
pub fn reconstruct(
    grid: &Grid,
    snapshot: &Snapshot,
    constants: &RegimeConstants,
    fixup: &FloorFixup) -> ReconstructedFields
{
    let [n1, n2, n3] = snapshot.dims();
    let gamma_law = grid.gamma_law;

    let mut rho = snapshot.rho.clone();
    let mut ug = snapshot.ug.clone();
    let mut ucon = Array4::zeros((4, n1, n2, n3));
    let mut ucov = Array4::zeros((4, n1, n2, n3));
    let mut bcon = Array4::zeros((4, n1, n2, n3));
    let mut bcov = Array4::zeros((4, n1, n2, n3));
    let mut bsq = Array3::zeros((n1, n2, n3));
    let mut floored = Array3::zeros((n1, n2, n3));

    for i in 0..n1 {
        for j in 0..n2 {
            for k in 0..n3 {
                let gcov = grid.gcov_at(i, j, k);
                let gcon = grid.gcon_at(i, j, k);
                let mut vtilde = [
                    snapshot.velocity[[1, i, j, k]],
                    snapshot.velocity[[2, i, j, k]],
                    snapshot.velocity[[3, i, j, k]],
                ];
                let bfield = [
                    snapshot.bfield[[1, i, j, k]],
                    snapshot.bfield[[2, i, j, k]],
                    snapshot.bfield[[3, i, j, k]],
                ];

                let mut u = zamo_four_velocity(&gcov, &gcon, &vtilde, constants.gamma_max);
                let (_, provisional_bsq) = comoving_field(&gcov, &u, &bfield);

                // floor pass: where magnetization exceeds the ceiling, the
                // cell's thermodynamics are replaced with tiny floor values
                // and the azimuthal velocity optionally re-anchored to the
                // stationary solution
                let radius = grid.r[[i, j, k]];
                let threshold = floor_threshold(constants, radius);
                if provisional_bsq / guarded(rho[[i, j, k]]) > threshold {
                    rho[[i, j, k]] = constants.rho_floor;
                    ug[[i, j, k]] = constants.ug_floor;
                    floored[[i, j, k]] = 1.0;

                    if let FloorFixup::TrackStationary { max_iterations } = fixup {
                        let omega = stationary_angular_velocity(radius, grid.spin);
                        let omega_internal = omega / grid.dxdxp[[3, 3, i, j, k]];
                        let alpha = 1.0 / f64::sqrt(-gcon[0][0]);

                        for _ in 0..*max_iterations {
                            let qsq = spatial_norm(&gcov, &vtilde);
                            let gamma = f64::sqrt(1.0 + qsq);
                            let u0 = gamma / alpha;
                            let next = omega_internal * u0 + gamma * alpha * gcon[0][3];
                            if !next.is_finite() {
                                break
                            }
                            vtilde[2] = next;
                        }
                        u = zamo_four_velocity(&gcov, &gcon, &vtilde, constants.gamma_max);
                    }
                }

                let (b, b2) = comoving_field(&gcov, &u, &bfield);
                let u_cov = lower(&gcov, &u);
                let b_cov = lower(&gcov, &b);

                for m in 0..4 {
                    ucon[[m, i, j, k]] = u[m];
                    ucov[[m, i, j, k]] = u_cov[m];
                    bcon[[m, i, j, k]] = b[m];
                    bcov[[m, i, j, k]] = b_cov[m];
                }
                bsq[[i, j, k]] = b2;
            }
        }
    }

    let pg = ug.mapv(|u| (gamma_law - 1.0) * u);
    let mut sigma = Array3::zeros((n1, n2, n3));
    for i in 0..n1 {
        for j in 0..n2 {
            for k in 0..n3 {
                sigma[[i, j, k]] = bsq[[i, j, k]] / guarded(rho[[i, j, k]]);
            }
        }
    }

    let mut tud_em = Array::zeros((4, 4, n1, n2, n3));
    let mut tud_ma = Array::zeros((4, 4, n1, n2, n3));
    let mut tud_rm = Array::zeros((4, 4, n1, n2, n3));
    let mut tud_ie = Array::zeros((4, 4, n1, n2, n3));
    let mut fcov = Array::zeros((4, 4, n1, n2, n3));
    let mut fcon = Array::zeros((4, 4, n1, n2, n3));
    let mut omegaf1 = Array3::zeros((n1, n2, n3));
    let mut omegaf2 = Array3::zeros((n1, n2, n3));

    for i in 0..n1 {
        for j in 0..n2 {
            for k in 0..n3 {
                let d = rho[[i, j, k]];
                let u_int = ug[[i, j, k]];
                let p = pg[[i, j, k]];
                let b2 = bsq[[i, j, k]];
                let gdet = grid.gdet[[i, j, k]];
                let mut u4 = [0.0; 4];
                let mut ud4 = [0.0; 4];
                let mut b4 = [0.0; 4];
                let mut bd4 = [0.0; 4];
                for m in 0..4 {
                    u4[m] = ucon[[m, i, j, k]];
                    ud4[m] = ucov[[m, i, j, k]];
                    b4[m] = bcon[[m, i, j, k]];
                    bd4[m] = bcov[[m, i, j, k]];
                }

                for m in 0..4 {
                    for n in 0..4 {
                        let delta = if m == n { 1.0 } else { 0.0 };
                        tud_em[[m, n, i, j, k]] = b2 * u4[m] * ud4[n] + 0.5 * b2 * delta - b4[m] * bd4[n];
                        tud_ma[[m, n, i, j, k]] = (d + u_int + p) * u4[m] * ud4[n] + p * delta;
                        tud_rm[[m, n, i, j, k]] = d * u4[m] * ud4[n];
                        tud_ie[[m, n, i, j, k]] = (u_int + p) * u4[m] * ud4[n] + p * delta;
                    }
                }

                // Faraday tensor from the ideal-MHD degeneracy:
                // F^{mn} = eps^{mnlk} u_l b_k, F_{mn} = eps_{mnlk} u^l b^k
                for &(perm, sign) in PERMUTATIONS.iter() {
                    let [m, n, l, q] = perm;
                    fcon[[m, n, i, j, k]] += -sign / gdet * ud4[l] * bd4[q];
                    fcov[[m, n, i, j, k]] += sign * gdet * u4[l] * b4[q];
                }

                // field-line angular velocity: component-ratio estimator
                // and the velocity-weighted poloidal estimator
                let jac33 = grid.dxdxp[[3, 3, i, j, k]];
                let ratio = fcov[[0, 2, i, j, k]] / guarded(fcov[[2, 3, i, j, k]]);
                omegaf1[[i, j, k]] = ratio * jac33;

                let gcov = grid.gcov_at(i, j, k);
                let bl = [
                    snapshot.bfield[[1, i, j, k]],
                    snapshot.bfield[[2, i, j, k]],
                    snapshot.bfield[[3, i, j, k]],
                ];
                let v1 = u4[1] / u4[0];
                let v2 = u4[2] / u4[0];
                let v3 = u4[3] / u4[0];
                let mut bp_cov = [0.0; 2];
                for s in 0..2 {
                    for a in 0..2 {
                        bp_cov[s] += gcov[s + 1][a + 1] * bl[a];
                    }
                }
                let bpsq = bl[0] * bp_cov[0] + bl[1] * bp_cov[1];
                let vdotbp = v1 * bp_cov[0] + v2 * bp_cov[1];
                omegaf2[[i, j, k]] = (v3 - bl[2] * vdotbp / guarded(bpsq)) * jac33;
            }
        }
    }

    let divb = face_flux_divergence(grid, snapshot, &bsq);

    ReconstructedFields {
        rho, ug, pg,
        ucon, ucov, bcon, bcov,
        bsq, sigma,
        tud_em, tud_ma, tud_rm, tud_ie,
        fcov, fcon,
        omegaf1, omegaf2,
        floored,
        divb,
    }
}




// ============================================================================
fn spatial_norm(gcov: &[[f64; 4]; 4], vtilde: &[f64; 3]) -> f64 {
    let mut qsq = 0.0;
    for a in 0..3 {
        for b in 0..3 {
            qsq += gcov[a + 1][b + 1] * vtilde[a] * vtilde[b];
        }
    }
    qsq
}


/**
 * Combine the ZAMO observer's four-velocity with the stored relative
 * spatial velocity into the physical four-velocity, with a Lorentz-factor
 * ceiling guarding against runaway floor cells. The result satisfies
 * u^a u_a = -1 to floating-point tolerance by construction.
 */
fn zamo_four_velocity(gcov: &[[f64; 4]; 4], gcon: &[[f64; 4]; 4], vtilde: &[f64; 3], gamma_max: f64) -> [f64; 4] {
    let mut v = *vtilde;
    let mut qsq = spatial_norm(gcov, &v);

    if qsq > gamma_max * gamma_max - 1.0 {
        let rescale = f64::sqrt((gamma_max * gamma_max - 1.0) / qsq);
        for a in 0..3 {
            v[a] *= rescale;
        }
        qsq = gamma_max * gamma_max - 1.0;
    }

    let alpha = 1.0 / f64::sqrt(-gcon[0][0]);
    let gamma = f64::sqrt(1.0 + qsq);
    let mut u = [gamma / alpha, 0.0, 0.0, 0.0];
    for a in 0..3 {
        u[a + 1] = v[a] - gamma * alpha * gcon[0][a + 1];
    }
    u
}

fn comoving_field(gcov: &[[f64; 4]; 4], ucon: &[f64; 4], bfield: &[f64; 3]) -> ([f64; 4], f64) {
    let ucov = lower(gcov, ucon);
    let mut b = [0.0; 4];
    for a in 0..3 {
        b[0] += bfield[a] * ucov[a + 1];
    }
    for a in 0..3 {
        b[a + 1] = (bfield[a] + b[0] * ucon[a + 1]) / ucon[0];
    }
    let bcov = lower(gcov, &b);
    let bsq = contract(&b, &bcov);
    (b, bsq)
}

fn lower(gcov: &[[f64; 4]; 4], vcon: &[f64; 4]) -> [f64; 4] {
    let mut vcov = [0.0; 4];
    for m in 0..4 {
        for n in 0..4 {
            vcov[m] += gcov[m][n] * vcon[n];
        }
    }
    vcov
}

fn contract(vcon: &[f64; 4], vcov: &[f64; 4]) -> f64 {
    let mut s = 0.0;
    for m in 0..4 {
        s += vcon[m] * vcov[m];
    }
    s
}




/**
 * Divergence of the face-centered flux, normalized by the local field
 * scale. Zero to rounding wherever the upstream solver's constrained
 * transport was not disturbed by flooring. Boundary cells are reported as
 * zero. `None` when the snapshot lacks the face-flux columns.
 */
pub fn face_flux_divergence(grid: &Grid, snapshot: &Snapshot, bsq: &Array3<f64>) -> Option<Array3<f64>> {
    let flux = snapshot.face_flux.as_ref()?;
    let [n1, n2, n3] = snapshot.dims();
    let [dx1, dx2, dx3] = grid.cell_size;
    let mut divb = Array3::zeros((n1, n2, n3));

    for i in 0..n1.saturating_sub(1) {
        for j in 0..n2.saturating_sub(1) {
            for k in 0..n3 {
                let kp = (k + 1) % n3;
                let div = (flux[[1, i + 1, j, k]] - flux[[1, i, j, k]]) / dx1
                        + (flux[[2, i, j + 1, k]] - flux[[2, i, j, k]]) / dx2
                        + if n3 > 1 {
                            (flux[[3, i, j, kp]] - flux[[3, i, j, k]]) / dx3
                        } else {
                            0.0
                        };
                let scale = grid.gdet[[i, j, k]] * f64::sqrt(bsq[[i, j, k]].max(0.0))
                          * (1.0 / dx1 + 1.0 / dx2 + 1.0 / dx3);
                divb[[i, j, k]] = div / guarded(scale);
            }
        }
    }
    Some(divb)
}
