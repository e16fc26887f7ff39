//! Stress-energy integrals, the mass / energy / angular-momentum flux
//! families, magnetic flux conventions, and the efficiency ratios.

use std::iter::FromIterator;
use ndarray::{Array, Array1, Array3, Axis, Ix5};
use crate::fields::TINY;
use crate::integrate::{AngularIntegrator, Filters};
use super::{EvaluationContext, Prepared, SlotWriter};




// ============================================================================
pub fn emit(ctx: &EvaluationContext, prepared: &Prepared, integrator: &AngularIntegrator, writer: &mut SlotWriter) {
    let fields = ctx.fields;
    let masks = ctx.masks;
    let no_filters = Filters::none();

    // the four stress-energy parts over the sphere and the disk, and the
    // dynamically interesting parts over jet and wind
    let parts = [&fields.tud_em, &fields.tud_ma, &fields.tud_rm, &fields.tud_ie];
    for (part, name) in parts.iter().zip(["tud_em_sphere", "tud_ma_sphere", "tud_rm_sphere", "tud_ie_sphere"].iter()) {
        writer.group(*name, tensor_rows(integrator, *part,None));
    }
    for (part, name) in parts.iter().zip(["tud_em_disk", "tud_ma_disk", "tud_rm_disk", "tud_ie_disk"].iter()) {
        writer.group(*name, tensor_rows(integrator, *part,Some(&masks.disk)));
    }
    for (part, name) in parts[..2].iter().zip(["tud_em_jet", "tud_ma_jet"].iter()) {
        writer.group(*name, tensor_rows(integrator, *part,Some(&masks.jet)));
    }
    for (part, name) in parts[..2].iter().zip(["tud_em_wind", "tud_ma_wind"].iter()) {
        writer.group(*name, tensor_rows(integrator, *part,Some(&masks.wind)));
    }

    // rest-mass flux four-vectors rho u^m and rho u_m
    let mut rest_mass_rows = Vec::with_capacity(8);
    for vector in [&fields.ucon, &fields.ucov].iter() {
        for m in 0..4 {
            let weighted = &fields.rho * &vector.index_axis(Axis(0), m);
            rest_mass_rows.push(integrator.profile(weighted.view(), None, &no_filters));
        }
    }
    writer.group("rest_mass_flux", rest_mass_rows);

    // mass flux through each radial shell, signed with u^1 (accretion is
    // negative), under the region and floor restrictions
    let mass_flux = &fields.rho * &fields.ucon.index_axis(Axis(0), 1);
    let inflow = Filters {
        inflow_only: true,
        radial_velocity: Some(&prepared.vr),
        ..Filters::none()
    };
    let mdot_total = integrator.profile(mass_flux.view(), None, &no_filters);
    writer.group("mdot", vec![
        mdot_total.clone(),
        integrator.profile(mass_flux.view(), None, &inflow),
        integrator.profile(mass_flux.view(), Some(masks.disk.view()), &no_filters),
        integrator.profile(mass_flux.view(), Some(masks.corona.view()), &no_filters),
        integrator.profile(mass_flux.view(), Some(masks.jet.view()), &no_filters),
        integrator.profile(mass_flux.view(), Some(masks.wind.view()), &no_filters),
        integrator.profile(mass_flux.view(), Some(prepared.unfloored.view()), &no_filters),
    ]);

    // energy and angular-momentum flux families from T^1_0 and T^1_3
    let edot_rows = flux_family(ctx, prepared, integrator, 0);
    let ldot_rows = flux_family(ctx, prepared, integrator, 3);
    let edot_total = edot_rows[0].clone();
    let edot_em = edot_rows[1].clone();
    let edot_ma = edot_rows[2].clone();
    let edot_jet = edot_rows[5].clone();
    let edot_wind = edot_rows[8].clone();
    let ldot_total = ldot_rows[0].clone();
    writer.group("edot", edot_rows);
    writer.group("ldot", ldot_rows);

    writer.group("magnetic_flux", magnetic_flux_rows(ctx));

    // efficiency ratios, normalized by the magnitude of the horizon mass
    // flux of this snapshot
    let ih = ctx.grid.radial_index_of(ctx.grid.horizon_radius());
    let mdot_h = mdot_total[ih];
    let denom = if mdot_h.abs() < TINY { TINY } else { mdot_h.abs() };
    let signed = if mdot_h.abs() < TINY { TINY } else { mdot_h };
    let spin = ctx.grid.spin;
    let num_radii = ctx.grid.num_zones[0];

    let ratio = |numerator: &dyn Fn(usize) -> f64| -> Array1<f64> {
        Array1::from_iter((0..num_radii).map(numerator))
    };
    writer.group("efficiency", vec![
        ratio(&|i| (mdot_total[i] - edot_total[i]) / denom),
        ratio(&|i| -edot_em[i] / denom),
        ratio(&|i| (mdot_total[i] - edot_ma[i]) / denom),
        ratio(&|i| -edot_jet[i] / denom),
        ratio(&|i| -edot_wind[i] / denom),
        ratio(&|i| ldot_total[i] / signed),
        ratio(&|i| (ldot_total[i] - 2.0 * spin * edot_total[i]) / signed),
    ]);

    // outgoing jet energy flux split by hemisphere
    let t10 = total_flux_component(fields, 0);
    let (upper, lower) = hemisphere_masks(ctx);
    let jet_upper = &masks.jet * &upper;
    let jet_lower = &masks.jet * &lower;
    let outgoing = t10.mapv(|x| -x);
    writer.group("jet_power_hemispheres", vec![
        integrator.profile(outgoing.view(), Some(jet_upper.view()), &no_filters),
        integrator.profile(outgoing.view(), Some(jet_lower.view()), &no_filters),
    ]);

    // cumulative rest mass inside each radius
    let shell_mass = integrator.profile(fields.rho.view(), None, &no_filters);
    let dx1 = ctx.grid.cell_size[0];
    let mut enclosed = Array1::zeros(num_radii);
    let mut running = 0.0;
    for i in 0..num_radii {
        running += shell_mass[i] * dx1;
        enclosed[i] = running;
    }
    writer.group("enclosed_mass", vec![enclosed]);
}




// ============================================================================
fn tensor_rows(integrator: &AngularIntegrator, tensor: &Array<f64, Ix5>, mask: Option<&Array3<f64>>) -> Vec<Array1<f64>> {
    let mut rows = Vec::with_capacity(16);
    for m in 0..4 {
        for n in 0..4 {
            let component = tensor.index_axis(Axis(0), m).index_axis_move(Axis(0), n);
            rows.push(integrator.profile(component, mask.map(|w| w.view()), &Filters::none()));
        }
    }
    rows
}


/// T^1_n of the electromagnetic plus matter parts.
fn total_flux_component(fields: &crate::fields::ReconstructedFields, n: usize) -> Array3<f64> {
    let em = fields.tud_em.index_axis(Axis(0), 1).index_axis_move(Axis(0), n);
    let ma = fields.tud_ma.index_axis(Axis(0), 1).index_axis_move(Axis(0), n);
    &em + &ma
}


/**
 * The nine members of the edot / ldot groups, in slot order: total,
 * electromagnetic, matter, inflow-restricted, disk, jet, jet
 * electromagnetic, jet matter, wind.
 */
fn flux_family(ctx: &EvaluationContext, prepared: &Prepared, integrator: &AngularIntegrator, n: usize) -> Vec<Array1<f64>> {
    let fields = ctx.fields;
    let masks = ctx.masks;
    let no_filters = Filters::none();
    let em = fields.tud_em.index_axis(Axis(0), 1).index_axis(Axis(0), n).to_owned();
    let ma = fields.tud_ma.index_axis(Axis(0), 1).index_axis(Axis(0), n).to_owned();
    let total = &em + &ma;
    let inflow = Filters {
        inflow_only: true,
        radial_velocity: Some(&prepared.vr),
        ..Filters::none()
    };

    vec![
        integrator.profile(total.view(), None, &no_filters),
        integrator.profile(em.view(), None, &no_filters),
        integrator.profile(ma.view(), None, &no_filters),
        integrator.profile(total.view(), None, &inflow),
        integrator.profile(total.view(), Some(masks.disk.view()), &no_filters),
        integrator.profile(total.view(), Some(masks.jet.view()), &no_filters),
        integrator.profile(em.view(), Some(masks.jet.view()), &no_filters),
        integrator.profile(ma.view(), Some(masks.jet.view()), &no_filters),
        integrator.profile(total.view(), Some(masks.wind.view()), &no_filters),
    ]
}


fn hemisphere_masks(ctx: &EvaluationContext) -> (Array3<f64>, Array3<f64>) {
    let [n1, n2, n3] = ctx.grid.num_zones;
    let mut upper = Array3::zeros((n1, n2, n3));
    let mut lower = Array3::zeros((n1, n2, n3));
    for i in 0..n1 {
        let split = ctx.masks.thetamid[i];
        for j in 0..n2 {
            for k in 0..n3 {
                if ctx.grid.h[[i, j, k]] < split {
                    upper[[i, j, k]] = 1.0;
                } else {
                    lower[[i, j, k]] = 1.0;
                }
            }
        }
    }
    (upper, lower)
}


/**
 * Magnetic flux through each radial shell under the catalogued sign
 * conventions: absolute (half the unsigned flux), hemisphere-restricted
 * signed fluxes, the largest signed latitude-cumulative flux, and the
 * dipole measure (upper minus lower hemisphere).
 */
fn magnetic_flux_rows(ctx: &EvaluationContext) -> Vec<Array1<f64>> {
    let grid = ctx.grid;
    let fields = ctx.fields;
    let [n1, n2, n3] = grid.num_zones;
    let [_, dx2, dx3] = grid.cell_size;
    let rescale = grid.wedge_rescale();

    let mut absolute = Array1::zeros(n1);
    let mut upper = Array1::zeros(n1);
    let mut lower = Array1::zeros(n1);
    let mut signed_max = Array1::zeros(n1);
    let mut dipole = Array1::zeros(n1);

    for i in 0..n1 {
        let split = ctx.masks.thetamid[i];
        let mut running = 0.0;
        let mut best = 0.0f64;
        for j in 0..n2 {
            let mut ring = 0.0;
            for k in 0..n3 {
                // lab-frame radial field from the comoving decomposition
                let b1 = fields.bcon[[1, i, j, k]] * fields.ucon[[0, i, j, k]]
                       - fields.bcon[[0, i, j, k]] * fields.ucon[[1, i, j, k]];
                let element = b1 * grid.gdet[[i, j, k]] * dx2 * dx3;
                ring += element;
                absolute[i] += 0.5 * element.abs();
                if grid.h[[i, j, k]] < split {
                    upper[i] += element;
                    dipole[i] += element;
                } else {
                    lower[i] += element;
                    dipole[i] -= element;
                }
            }
            running += ring;
            best = best.max(running.abs());
        }
        signed_max[i] = best;
    }

    for row in [&mut absolute, &mut upper, &mut lower, &mut signed_max, &mut dipole].iter_mut() {
        **row *= rescale;
    }
    vec![absolute, upper, lower, signed_max, dipole]
}
