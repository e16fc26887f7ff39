//! Azimuthal-mode power of the density, field, and flux distributions
//! through the inner disk. These slots reuse the radial axis as the mode
//! number axis: entry m holds the amplitude of mode m, zeros beyond the
//! configured mode count.

use ndarray::{Array1, Array3, Axis};
use crate::integrate::{AngularIntegrator, Filters};
use super::{EvaluationContext, Prepared, SlotWriter};




// ============================================================================
pub fn emit(ctx: &EvaluationContext, _prepared: &Prepared, integrator: &AngularIntegrator, writer: &mut SlotWriter) {
    let grid = ctx.grid;
    let fields = ctx.fields;
    let num_radii = grid.num_zones[0];
    let no_filters = Filters::none();

    // the inner disk body, from the horizon out to thirty gravitational
    // radii or the grid edge
    let i0 = grid.radial_index_of(grid.horizon_radius());
    let i1 = grid.radial_index_of(30.0_f64.min(grid.r_outer)).max(i0 + 1);
    let num_modes = ctx.num_modes.min(num_radii);

    let mass_flux = &fields.rho * &fields.ucon.index_axis(Axis(0), 1);
    let [n1, n2, n3] = grid.num_zones;
    let mut lab_b1 = Array3::zeros((n1, n2, n3));
    for i in 0..n1 {
        for j in 0..n2 {
            for k in 0..n3 {
                lab_b1[[i, j, k]] = fields.bcon[[1, i, j, k]] * fields.ucon[[0, i, j, k]]
                    - fields.bcon[[0, i, j, k]] * fields.ucon[[1, i, j, k]];
            }
        }
    }

    let mut rows = Vec::with_capacity(6);
    for integrand in [
        fields.rho.view(),
        fields.bsq.view(),
        mass_flux.view(),
        lab_b1.view(),
        fields.sigma.view(),
        fields.pg.view(),
    ].iter() {
        let spectrum = integrator.mode_spectrum(
            integrand.clone(), None, &no_filters, num_modes, (i0, i1));
        let mut row = Array1::zeros(num_radii);
        for m in 0..spectrum.len() {
            row[m] = spectrum[m];
        }
        rows.push(row);
    }
    writer.group("mode_spectra", rows);
}
