//! Disk geometry, MRI resolution quality, region boundary angles, and the
//! numerical health monitors.

use std::f64::consts::PI;
use std::iter::FromIterator;
use ndarray::{Array1, Array3};
use crate::fields::TINY;
use crate::integrate::{AngularIntegrator, Filters, PolarBand};
use super::{EvaluationContext, Prepared, SlotWriter};




// ============================================================================
pub fn emit(ctx: &EvaluationContext, prepared: &Prepared, integrator: &AngularIntegrator, writer: &mut SlotWriter) {
    let grid = ctx.grid;
    let fields = ctx.fields;
    let masks = ctx.masks;
    let [n1, n2, n3] = grid.num_zones;
    let no_filters = Filters::none();

    // disk thickness: the first- and second-moment scale heights and the
    // two midplane estimators
    let mut hoverr2 = Array1::zeros(n1);
    let mut thetamid2 = Array1::zeros(n1);
    for i in 0..n1 {
        let mut weight = 0.0;
        let mut weight_sq = 0.0;
        let mut second = 0.0;
        let mut angle_sq = 0.0;
        for j in 0..n2 {
            for k in 0..n3 {
                let w = fields.rho[[i, j, k]] * grid.gdet[[i, j, k]];
                let wsq = fields.rho[[i, j, k]] * w;
                let dev = grid.h[[i, j, k]] - masks.thetamid[i];
                weight += w;
                weight_sq += wsq;
                second += w * dev * dev;
                angle_sq += wsq * grid.h[[i, j, k]];
            }
        }
        hoverr2[i] = f64::sqrt(second / (weight + TINY));
        thetamid2[i] = angle_sq / (weight_sq + TINY);
    }
    writer.group("thickness", vec![
        masks.hoverr.clone(),
        hoverr2,
        masks.thetamid.clone(),
        thetamid2,
    ]);

    // MRI quality: wavelength of the fastest-growing mode against the
    // local cell size, polar and azimuthal, density-weighted over the disk
    let mut lam_theta = Array3::zeros((n1, n2, n3));
    let mut lam_phi = Array3::zeros((n1, n2, n3));
    let mut q_theta = Array3::zeros((n1, n2, n3));
    let mut q_phi = Array3::zeros((n1, n2, n3));
    let [_, dx2, dx3] = grid.cell_size;
    for i in 0..n1 {
        for j in 0..n2 {
            for k in 0..n3 {
                let inertia = fields.rho[[i, j, k]] + fields.ug[[i, j, k]]
                    + fields.pg[[i, j, k]] + fields.bsq[[i, j, k]];
                let omega = prepared.omega[[i, j, k]].abs().max(TINY);
                let va_theta = f64::sqrt(
                    (fields.bcon[[2, i, j, k]] * fields.bcov[[2, i, j, k]]).max(0.0) / inertia);
                let va_phi = f64::sqrt(
                    (fields.bcon[[3, i, j, k]] * fields.bcov[[3, i, j, k]]).max(0.0) / inertia);
                lam_theta[[i, j, k]] = 2.0 * PI * va_theta / omega;
                lam_phi[[i, j, k]] = 2.0 * PI * va_phi / omega;
                let cell_theta = f64::sqrt(grid.gcov[[2, 2, i, j, k]].max(0.0)) * dx2;
                let cell_phi = f64::sqrt(grid.gcov[[3, 3, i, j, k]].max(0.0)) * dx3;
                q_theta[[i, j, k]] = lam_theta[[i, j, k]] / (cell_theta + TINY);
                q_phi[[i, j, k]] = lam_phi[[i, j, k]] / (cell_phi + TINY);
            }
        }
    }
    let disk_weighted = |q: &Array3<f64>| {
        let weighted = &fields.rho * q;
        integrator.profile(weighted.view(), Some(masks.disk.view()), &no_filters)
    };
    writer.group("mri_quality", vec![
        disk_weighted(&q_theta),
        disk_weighted(&q_phi),
        disk_weighted(&lam_theta),
        disk_weighted(&lam_phi),
    ]);

    // jet and corona boundary angles from the monotone threshold search
    let (jet_upper, jet_lower) = boundary_angles(
        grid, &fields.sigma, &masks.thetamid, ctx.constants.sigma_jet, ctx.constants.default_jet_angle);
    let (corona_upper, corona_lower) = boundary_angles(
        grid, &fields.sigma, &masks.thetamid, ctx.constants.disk_sigma_max, ctx.constants.default_jet_angle);
    writer.group("boundaries", vec![jet_upper, jet_lower, corona_upper, corona_lower]);

    // field-line angular velocity, volume-weighted in the jet and
    // density-weighted in the disk
    let omegaf1_disk = &fields.rho * &fields.omegaf1;
    let omegaf2_disk = &fields.rho * &fields.omegaf2;
    writer.group("omegaf", vec![
        integrator.profile(fields.omegaf1.view(), Some(masks.jet.view()), &no_filters),
        integrator.profile(fields.omegaf2.view(), Some(masks.jet.view()), &no_filters),
        integrator.profile(omegaf1_disk.view(), Some(masks.disk.view()), &no_filters),
        integrator.profile(omegaf2_disk.view(), Some(masks.disk.view()), &no_filters),
    ]);

    // divergence monitor; zeros when the snapshot lacks face fluxes
    let (divb_max, divb_mean) = match &fields.divb {
        Some(divb) => {
            let mut max_row = Array1::zeros(n1);
            let mut mean_row = Array1::zeros(n1);
            for i in 0..n1 {
                let mut worst = 0.0f64;
                let mut sum = 0.0;
                let mut volume = 0.0;
                for j in 0..n2 {
                    for k in 0..n3 {
                        worst = worst.max(divb[[i, j, k]].abs());
                        sum += divb[[i, j, k]].abs() * grid.gdet[[i, j, k]];
                        volume += grid.gdet[[i, j, k]];
                    }
                }
                max_row[i] = worst;
                mean_row[i] = sum / (volume + TINY);
            }
            (max_row, mean_row)
        }
        None => (Array1::zeros(n1), Array1::zeros(n1)),
    };
    writer.group("divb", vec![divb_max, divb_mean]);

    // floor activity as volume and mass fractions per shell
    let floored_volume = integrator.profile(fields.floored.view(), None, &no_filters);
    let shell_volume = integrator.profile(prepared.ones.view(), None, &no_filters);
    let floored_mass = {
        let weighted = &fields.rho * &fields.floored;
        integrator.profile(weighted.view(), None, &no_filters)
    };
    let shell_mass = integrator.profile(fields.rho.view(), None, &no_filters);
    let fraction = |num: &Array1<f64>, den: &Array1<f64>| {
        Array1::from_iter((0..n1).map(|i| num[i] / (den[i] + TINY)))
    };
    writer.group("floor_activity", vec![
        fraction(&floored_volume, &shell_volume),
        fraction(&floored_mass, &shell_mass),
    ]);

    // cooling-proxy luminosity, excluding floored cells whose pressure is
    // artificial
    let mut emissivity = Array3::zeros((n1, n2, n3));
    for i in 0..n1 {
        for j in 0..n2 {
            for k in 0..n3 {
                let rho = fields.rho[[i, j, k]];
                let pg = fields.pg[[i, j, k]];
                emissivity[[i, j, k]] = rho * rho * rho / (pg * pg + TINY);
            }
        }
    }
    writer.group("luminosity", vec![
        integrator.profile(emissivity.view(), Some(prepared.unfloored.view()), &no_filters),
    ]);

    // Maxwell stress and pressure for the effective viscosity; these two
    // are the warp-sensitive measurements, so they honor the configured
    // polar band and azimuthal sub-range
    let warp_filters = Filters {
        polar_band: ctx.scale_height.map(|profile| PolarBand {
            profile,
            multiplier: ctx.constants.scale_height_multiplier,
        }),
        phi_range: ctx.phi_range,
        ..Filters::none()
    };
    let mut stress = Array3::zeros((n1, n2, n3));
    let mut pressure = Array3::zeros((n1, n2, n3));
    for i in 0..n1 {
        for j in 0..n2 {
            for k in 0..n3 {
                stress[[i, j, k]] = -fields.bcon[[1, i, j, k]] * fields.bcov[[3, i, j, k]];
                pressure[[i, j, k]] = fields.pg[[i, j, k]] + 0.5 * fields.bsq[[i, j, k]];
            }
        }
    }
    writer.group("alpha_viscosity", vec![
        integrator.profile(stress.view(), Some(masks.disk.view()), &warp_filters),
        integrator.profile(pressure.view(), Some(masks.disk.view()), &warp_filters),
    ]);

    // plasma beta: the shell minimum and the disk-averaged numerator
    let mut beta_min = Array1::zeros(n1);
    let mut beta = Array3::zeros((n1, n2, n3));
    for i in 0..n1 {
        let mut lowest = f64::INFINITY;
        for j in 0..n2 {
            for k in 0..n3 {
                let value = 2.0 * fields.pg[[i, j, k]] / (fields.bsq[[i, j, k]] + TINY);
                beta[[i, j, k]] = value;
                lowest = lowest.min(value);
            }
        }
        beta_min[i] = lowest;
    }
    let beta_weighted = &fields.rho * &beta;
    writer.group("beta_plasma", vec![
        beta_min,
        integrator.profile(beta_weighted.view(), Some(masks.disk.view()), &no_filters),
    ]);

    // inflow equilibrium: mean radial drift in the disk and the viscous
    // inflow timescale it implies
    let vr_disk_weighted = &fields.rho * &prepared.vr;
    let vr_disk = integrator.profile(vr_disk_weighted.view(), Some(masks.disk.view()), &warp_filters);
    let vr_sphere = integrator.profile(vr_disk_weighted.view(), None, &no_filters);
    let rho_disk = integrator.profile(fields.rho.view(), Some(masks.disk.view()), &warp_filters);
    let radii = grid.radii();
    let mut inflow_time = Array1::zeros(n1);
    for i in 0..n1 {
        let mean_vr = vr_disk[i] / (rho_disk[i] + TINY);
        inflow_time[i] = radii[i] / mean_vr.abs().max(TINY);
    }
    writer.group("inflow_equilibrium", vec![vr_disk, vr_sphere, inflow_time]);

    // disk rotation against the stationary profile
    let omega_weighted = &fields.rho * &prepared.omega;
    let omega_disk = integrator.profile(omega_weighted.view(), Some(masks.disk.view()), &no_filters);
    let rho_disk_all = integrator.profile(fields.rho.view(), Some(masks.disk.view()), &no_filters);
    let mut kepler_ratio = Array1::zeros(n1);
    for i in 0..n1 {
        let mean = omega_disk[i] / (rho_disk_all[i] + TINY);
        let kepler = 1.0 / (radii[i].powf(1.5) + grid.spin);
        kepler_ratio[i] = mean / kepler;
    }
    writer.group("rotation", vec![omega_disk, kepler_ratio]);

    // comoving field component energies and the unsigned lab radial field
    let component_product = |m: usize| {
        let mut out = Array3::zeros((n1, n2, n3));
        for i in 0..n1 {
            for j in 0..n2 {
                for k in 0..n3 {
                    out[[i, j, k]] = fields.bcon[[m, i, j, k]] * fields.bcov[[m, i, j, k]];
                }
            }
        }
        out
    };
    let mut lab_b1_abs = Array3::zeros((n1, n2, n3));
    for i in 0..n1 {
        for j in 0..n2 {
            for k in 0..n3 {
                lab_b1_abs[[i, j, k]] = (fields.bcon[[1, i, j, k]] * fields.ucon[[0, i, j, k]]
                    - fields.bcon[[0, i, j, k]] * fields.ucon[[1, i, j, k]]).abs();
            }
        }
    }
    writer.group("field_shells", vec![
        integrator.profile(component_product(1).view(), None, &no_filters),
        integrator.profile(component_product(2).view(), None, &no_filters),
        integrator.profile(component_product(3).view(), None, &no_filters),
        integrator.profile(lab_b1_abs.view(), None, &no_filters),
    ]);

    // electrodynamic degeneracy monitors: F.(dual F) should vanish in
    // ideal MHD, and F.F tracks twice the magnetic energy
    let mut edotb = Array3::zeros((n1, n2, n3));
    let mut fsq = Array3::zeros((n1, n2, n3));
    for i in 0..n1 {
        for j in 0..n2 {
            for k in 0..n3 {
                let mut degeneracy = 0.0;
                let mut invariant = 0.0;
                for m in 0..4 {
                    for n in 0..4 {
                        degeneracy += fields.fcov[[m, n, i, j, k]]
                            * (fields.bcon[[m, i, j, k]] * fields.ucon[[n, i, j, k]]
                             - fields.bcon[[n, i, j, k]] * fields.ucon[[m, i, j, k]]);
                        invariant += fields.fcov[[m, n, i, j, k]] * fields.fcon[[m, n, i, j, k]];
                    }
                }
                edotb[[i, j, k]] = degeneracy.abs();
                fsq[[i, j, k]] = invariant;
            }
        }
    }
    writer.group("degeneracy", vec![
        integrator.profile(edotb.view(), None, &no_filters),
        integrator.profile(fsq.view(), None, &no_filters),
    ]);
}




/**
 * Find, per radial zone, the polar angles where the azimuthally averaged
 * magnetization crosses the threshold, one per hemisphere. The bracketing
 * cell pair nearest the equator on the correct side wins and the crossing
 * is linearly interpolated; with no sign change the regime's default angle
 * is used. A degenerate profile is a documented fallback, never an error.
 */
fn boundary_angles(
    grid: &crate::grid::Grid,
    sigma: &Array3<f64>,
    thetamid: &Array1<f64>,
    threshold: f64,
    default_angle: f64) -> (Array1<f64>, Array1<f64>)
{
    let [n1, n2, n3] = grid.num_zones;
    let mut upper = Array1::zeros(n1);
    let mut lower = Array1::zeros(n1);

    for i in 0..n1 {
        let mut averaged = vec![0.0; n2];
        for j in 0..n2 {
            let mut sum = 0.0;
            let mut volume = 0.0;
            for k in 0..n3 {
                sum += sigma[[i, j, k]] * grid.gdet[[i, j, k]];
                volume += grid.gdet[[i, j, k]];
            }
            averaged[j] = sum / (volume + TINY);
        }
        let split = thetamid[i];
        let theta = |j: usize| grid.h[[i, j, 0]];

        // upper hemisphere: magnetization falls away from the pole; take
        // the crossing nearest the equator
        let mut found_upper = None;
        for j in 0..n2 - 1 {
            if theta(j + 1) > split {
                break
            }
            if averaged[j] >= threshold && averaged[j + 1] < threshold {
                found_upper = Some(j);
            }
        }
        upper[i] = match found_upper {
            Some(j) => interpolate_crossing(theta(j), averaged[j], theta(j + 1), averaged[j + 1], threshold),
            None => default_angle,
        };

        let mut found_lower = None;
        for j in (0..n2 - 1).rev() {
            if theta(j) < split {
                break
            }
            if averaged[j + 1] >= threshold && averaged[j] < threshold {
                found_lower = Some(j);
            }
        }
        lower[i] = match found_lower {
            Some(j) => interpolate_crossing(theta(j), averaged[j], theta(j + 1), averaged[j + 1], threshold),
            None => PI - default_angle,
        };
    }
    (upper, lower)
}

fn interpolate_crossing(theta0: f64, value0: f64, theta1: f64, value1: f64, threshold: f64) -> f64 {
    theta0 + (theta1 - theta0) * (value0 - threshold) / (value0 - value1 + TINY)
}




// ============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;
    use crate::testutil;

    #[test]
    fn boundary_search_recovers_the_analytic_crossing_angle() {
        let grid = testutil::minkowski_grid([3, 32, 2], 2.0, 20.0, 2.0 * PI);
        let [n1, n2, n3] = grid.num_zones;
        let threshold = 1.0;

        // magnetization linear in the polar-angle distance from the nearer
        // pole, crossing the threshold exactly once per hemisphere
        let slope = 4.0;
        let peak = 3.0;
        let mut sigma = Array3::zeros((n1, n2, n3));
        for i in 0..n1 {
            for j in 0..n2 {
                for k in 0..n3 {
                    let theta = grid.h[[i, j, k]];
                    let from_pole = theta.min(PI - theta);
                    sigma[[i, j, k]] = peak - slope * from_pole;
                }
            }
        }
        let thetamid = Array1::from_elem(n1, PI / 2.0);
        let (upper, lower) = boundary_angles(&grid, &sigma, &thetamid, threshold, 0.123);

        // linear profile makes the interpolation exact, so the recovered
        // angle must match to well within one polar cell
        let analytic = (peak - threshold) / slope;
        let cell = PI / n2 as f64;
        for i in 0..n1 {
            assert!((upper[i] - analytic).abs() < cell, "upper {} vs {}", upper[i], analytic);
            assert!((lower[i] - (PI - analytic)).abs() < cell, "lower {} vs {}", lower[i], analytic);
        }
    }

    #[test]
    fn boundary_search_falls_back_to_the_default_angle() {
        let grid = testutil::minkowski_grid([2, 8, 1], 2.0, 20.0, 2.0 * PI);
        let sigma = Array3::from_elem((2, 8, 1), 0.01);
        let thetamid = Array1::from_elem(2, PI / 2.0);
        let (upper, lower) = boundary_angles(&grid, &sigma, &thetamid, 1.0, 0.4);

        for i in 0..2 {
            assert_eq!(upper[i], 0.4);
            assert_eq!(lower[i], PI - 0.4);
        }
    }
}
