//! Mask-weighted shell averages of the primitive and four-vector fields,
//! plus the normalizer slots their consumers divide by.

use ndarray::{Array1, Array3, ArrayView3, Axis};
use crate::integrate::{AngularIntegrator, Filters};
use super::{EvaluationContext, Prepared, SlotWriter};




/// The eight members of every `prim_*` group, in slot order: density,
/// internal energy, gas pressure, field strength squared, magnetization,
/// inverse plasma beta, Bernoulli parameter, Lorentz factor.
fn primitive_members<'a>(ctx: &'a EvaluationContext, prepared: &'a Prepared) -> [&'a Array3<f64>; 8] {
    [
        &ctx.fields.rho,
        &ctx.fields.ug,
        &ctx.fields.pg,
        &ctx.fields.bsq,
        &ctx.fields.sigma,
        &prepared.beta_inv,
        &prepared.bernoulli,
        &prepared.lorentz,
    ]
}




// ============================================================================
pub fn emit(ctx: &EvaluationContext, prepared: &Prepared, integrator: &AngularIntegrator, writer: &mut SlotWriter) {
    let fields = ctx.fields;
    let masks = ctx.masks;
    let no_filters = Filters::none();

    writer.group("shell_volume", vec![
        integrator.profile(prepared.ones.view(), None, &no_filters),
    ]);
    writer.group("norm_disk", vec![
        integrator.profile(prepared.ones.view(), Some(masks.disk.view()), &no_filters),
    ]);
    writer.group("norm_corona", vec![
        integrator.profile(prepared.ones.view(), Some(masks.corona.view()), &no_filters),
    ]);
    writer.group("norm_jet", vec![
        integrator.profile(prepared.ones.view(), Some(masks.jet.view()), &no_filters),
    ]);
    writer.group("norm_wind", vec![
        integrator.profile(prepared.ones.view(), Some(masks.wind.view()), &no_filters),
    ]);
    writer.group("norm_rho_disk", vec![
        integrator.profile(fields.rho.view(), Some(masks.disk.view()), &no_filters),
    ]);
    writer.group("norm_rho_wind", vec![
        integrator.profile(fields.rho.view(), Some(masks.wind.view()), &no_filters),
    ]);

    let members = primitive_members(ctx, prepared);

    // density-weighted numerators over the disk body
    writer.group("prim_disk", members.iter().map(|q| {
        let weighted = &fields.rho * *q;
        integrator.profile(weighted.view(), Some(masks.disk.view()), &no_filters)
    }).collect());

    // volume-weighted over the full sphere
    writer.group("prim_sphere", members.iter().map(|q| {
        integrator.profile(q.view(), None, &no_filters)
    }).collect());

    // volume-weighted over the corona and the jet (both too tenuous for a
    // meaningful density weighting)
    writer.group("prim_corona", members.iter().map(|q| {
        integrator.profile(q.view(), Some(masks.corona.view()), &no_filters)
    }).collect());
    writer.group("prim_jet", members.iter().map(|q| {
        integrator.profile(q.view(), Some(masks.jet.view()), &no_filters)
    }).collect());

    // density-weighted over the wind
    writer.group("prim_wind", members.iter().map(|q| {
        let weighted = &fields.rho * *q;
        integrator.profile(weighted.view(), Some(masks.wind.view()), &no_filters)
    }).collect());

    // the four-velocity and comoving field, all components, contravariant
    // then covariant
    let vectors = [&fields.ucon, &fields.ucov, &fields.bcon, &fields.bcov];

    writer.group("four_vectors_sphere", vector_rows(&vectors, |component| {
        integrator.profile(component, None, &no_filters)
    }));
    writer.group("four_vectors_disk", vector_rows(&vectors, |component| {
        let weighted = &fields.rho * &component;
        integrator.profile(weighted.view(), Some(masks.disk.view()), &no_filters)
    }));
    writer.group("four_vectors_jet", vector_rows(&vectors, |component| {
        integrator.profile(component, Some(masks.jet.view()), &no_filters)
    }));
    writer.group("four_vectors_wind", vector_rows(&vectors, |component| {
        let weighted = &fields.rho * &component;
        integrator.profile(weighted.view(), Some(masks.wind.view()), &no_filters)
    }));

    writer.group("extrema", vec![
        shell_maximum(ctx, &fields.rho),
        shell_maximum(ctx, &fields.pg),
        shell_maximum(ctx, &fields.bsq),
        shell_maximum(ctx, &fields.sigma),
    ]);

    let be_weighted = &fields.rho * &prepared.bernoulli;
    writer.group("bernoulli_profiles", vec![
        integrator.profile(be_weighted.view(), Some(masks.disk.view()), &no_filters),
        integrator.profile(be_weighted.view(), Some(masks.wind.view()), &no_filters),
    ]);
}




// ============================================================================
fn vector_rows<'a, F>(vectors: &[&'a ndarray::Array4<f64>; 4], mut reduce: F) -> Vec<Array1<f64>>
where
    F: FnMut(ArrayView3<'a, f64>) -> Array1<f64>
{
    let mut rows = Vec::with_capacity(16);
    for vector in vectors.iter() {
        for m in 0..4 {
            rows.push(reduce(vector.index_axis(Axis(0), m)));
        }
    }
    rows
}

fn shell_maximum(ctx: &EvaluationContext, field: &Array3<f64>) -> Array1<f64> {
    let [n1, n2, n3] = ctx.grid.num_zones;
    let mut out = Array1::zeros(n1);
    for i in 0..n1 {
        let mut best = f64::NEG_INFINITY;
        for j in 0..n2 {
            for k in 0..n3 {
                best = best.max(field[[i, j, k]]);
            }
        }
        out[i] = best;
    }
    out
}
