mod averages;
mod fluxes;
mod quality;
mod spectra;

use ndarray::{Array1, Array2, Array3, s};
use crate::fields::{ReconstructedFields, TINY};
use crate::grid::Grid;
use crate::integrate::AngularIntegrator;
use crate::lookup_table::LookupTable;
use crate::regions::{RegimeConstants, RegionMasks};




/**
 * The fixed slot catalogue: every diagnostic group in evaluation order,
 * with the number of consecutive slots it occupies. Slot 0 is the buffer's
 * metadata row. Averaged diagnostics store mask-weighted numerators; their
 * denominators live in the `norm_*` and `shell_volume` slots, so that time
 * averaging downstream commutes with the division. The `mode_spectra`
 * group reuses the radial axis as the mode-number axis.
 */
pub static CATALOGUE: &[(&str, usize)] = &[
    ("meta", 1),
    ("shell_volume", 1),
    ("norm_disk", 1),
    ("norm_corona", 1),
    ("norm_jet", 1),
    ("norm_wind", 1),
    ("norm_rho_disk", 1),
    ("norm_rho_wind", 1),
    ("prim_disk", 8),
    ("prim_sphere", 8),
    ("prim_corona", 8),
    ("prim_jet", 8),
    ("prim_wind", 8),
    ("four_vectors_sphere", 16),
    ("four_vectors_disk", 16),
    ("four_vectors_jet", 16),
    ("four_vectors_wind", 16),
    ("extrema", 4),
    ("bernoulli_profiles", 2),
    ("tud_em_sphere", 16),
    ("tud_ma_sphere", 16),
    ("tud_rm_sphere", 16),
    ("tud_ie_sphere", 16),
    ("tud_em_disk", 16),
    ("tud_ma_disk", 16),
    ("tud_rm_disk", 16),
    ("tud_ie_disk", 16),
    ("tud_em_jet", 16),
    ("tud_ma_jet", 16),
    ("tud_em_wind", 16),
    ("tud_ma_wind", 16),
    ("rest_mass_flux", 8),
    ("mdot", 7),
    ("edot", 9),
    ("ldot", 9),
    ("magnetic_flux", 5),
    ("efficiency", 7),
    ("jet_power_hemispheres", 2),
    ("enclosed_mass", 1),
    ("thickness", 4),
    ("mri_quality", 4),
    ("boundaries", 4),
    ("omegaf", 4),
    ("divb", 2),
    ("floor_activity", 2),
    ("luminosity", 1),
    ("alpha_viscosity", 2),
    ("beta_plasma", 2),
    ("inflow_equilibrium", 3),
    ("rotation", 2),
    ("field_shells", 4),
    ("degeneracy", 2),
    ("mode_spectra", 6),
];


pub fn num_slots() -> usize {
    CATALOGUE.iter().map(|(_, len)| len).sum()
}


/**
 * Resolve a group name to its [start, end) slot range. Collaborators
 * address the buffer through this accessor rather than raw indices.
 */
pub fn slot_range(name: &str) -> Option<(usize, usize)> {
    let mut start = 0;
    for (group, len) in CATALOGUE.iter() {
        if *group == name {
            return Some((start, start + len))
        }
        start += len;
    }
    None
}




/**
 * Everything a diagnostic group may read: the grid, the reconstructed
 * fields and region masks for one snapshot, the regime constants, and the
 * integrator options resolved at startup.
 */
pub struct EvaluationContext<'a> {
    pub grid: &'a Grid,
    pub fields: &'a ReconstructedFields,
    pub masks: &'a RegionMasks,
    pub constants: &'a RegimeConstants,

    /// Time-averaged scale-height profile for the polar-band filter, when
    /// one was supplied
    pub scale_height: Option<&'a LookupTable>,

    /// Number of azimuthal modes retained by the spectra group
    pub num_modes: usize,

    /// Azimuthal sub-range restriction for the warp-sensitive groups
    pub phi_range: Option<(f64, f64)>,
}


/**
 * Per-snapshot quantities shared by several groups, computed once.
 */
pub struct Prepared {
    pub ones: Array3<f64>,
    pub vr: Array3<f64>,
    pub bernoulli: Array3<f64>,
    pub lorentz: Array3<f64>,
    pub beta_inv: Array3<f64>,
    pub omega: Array3<f64>,
    pub unfloored: Array3<f64>,
}

impl Prepared {
    fn compute(ctx: &EvaluationContext) -> Self {
        let grid = ctx.grid;
        let fields = ctx.fields;
        let [n1, n2, n3] = grid.num_zones;
        let mut lorentz = Array3::zeros((n1, n2, n3));
        let mut beta_inv = Array3::zeros((n1, n2, n3));
        let mut omega = Array3::zeros((n1, n2, n3));

        for i in 0..n1 {
            for j in 0..n2 {
                for k in 0..n3 {
                    let alpha = 1.0 / f64::sqrt(-grid.gcon[[0, 0, i, j, k]]);
                    lorentz[[i, j, k]] = alpha * fields.ucon[[0, i, j, k]];
                    beta_inv[[i, j, k]] = fields.bsq[[i, j, k]]
                        / (2.0 * fields.pg[[i, j, k]] + TINY);
                    omega[[i, j, k]] = fields.ucon[[3, i, j, k]] / fields.ucon[[0, i, j, k]]
                        * grid.dxdxp[[3, 3, i, j, k]];
                }
            }
        }

        Self {
            ones: Array3::ones((n1, n2, n3)),
            vr: fields.radial_velocity(),
            bernoulli: fields.bernoulli(),
            lorentz,
            beta_inv,
            omega,
            unfloored: fields.floored.mapv(|f| 1.0 - f),
        }
    }
}




/**
 * Collects the group rows in catalogue order and enforces that every group
 * emits exactly its declared number of slots.
 */
pub struct SlotWriter {
    rows: Vec<Array1<f64>>,
    num_radii: usize,
}

impl SlotWriter {
    fn new(num_radii: usize) -> Self {
        Self { rows: Vec::with_capacity(num_slots()), num_radii }
    }

    pub fn group(&mut self, name: &str, rows: Vec<Array1<f64>>) {
        let expected = slot_range(name)
            .map(|(start, end)| (start, end - start))
            .unwrap_or_else(|| panic!("unknown diagnostic group '{}'", name));
        assert_eq!(self.rows.len(), expected.0, "group '{}' emitted out of order", name);
        assert_eq!(rows.len(), expected.1, "group '{}' emitted {} rows", name, rows.len());
        for row in rows {
            assert_eq!(row.len(), self.num_radii);
            self.rows.push(row);
        }
    }

    fn into_matrix(self) -> Array2<f64> {
        assert_eq!(self.rows.len(), num_slots());
        let mut out = Array2::zeros((self.rows.len(), self.num_radii));
        for (slot, row) in self.rows.into_iter().enumerate() {
            out.slice_mut(s![slot, ..]).assign(&row);
        }
        out
    }
}




// ============================================================================
/**
 * Evaluate the whole catalogue for one snapshot, producing the buffer
 * matrix [slot, radial zone]. Every group is a pure function of the
 * context and writes only its own rows.
 */
pub fn evaluate(ctx: &EvaluationContext) -> Array2<f64> {
    let num_radii = ctx.grid.num_zones[0];
    let prepared = Prepared::compute(ctx);
    let integrator = AngularIntegrator::new(ctx.grid);
    let mut writer = SlotWriter::new(num_radii);

    writer.group("meta", vec![Array1::zeros(num_radii)]);
    averages::emit(ctx, &prepared, &integrator, &mut writer);
    fluxes::emit(ctx, &prepared, &integrator, &mut writer);
    quality::emit(ctx, &prepared, &integrator, &mut writer);
    spectra::emit(ctx, &prepared, &integrator, &mut writer);

    writer.into_matrix()
}




// ============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{reconstruct, FloorFixup};
    use crate::regions::{classify, ModelRegime};
    use crate::testutil;

    #[test]
    fn catalogue_holds_four_hundred_slots() {
        assert_eq!(num_slots(), 400);
    }

    #[test]
    fn slot_ranges_are_contiguous_and_named() {
        assert_eq!(slot_range("meta"), Some((0, 1)));
        assert_eq!(slot_range("shell_volume"), Some((1, 2)));
        assert_eq!(slot_range("mode_spectra"), Some((394, 400)));
        assert_eq!(slot_range("no_such_group"), None);

        let mut end = 0;
        for (name, _) in CATALOGUE.iter() {
            let (lo, hi) = slot_range(name).unwrap();
            assert_eq!(lo, end);
            end = hi;
        }
        assert_eq!(end, num_slots());
    }

    #[test]
    fn evaluation_fills_every_slot_row() {
        let grid = testutil::minkowski_grid([6, 8, 4], 2.0, 20.0, 2.0 * std::f64::consts::PI);
        let snapshot = testutil::uniform_snapshot(grid.num_zones, 1.0, 1.0, -0.1, [0.01, 0.0, 0.0], true);
        let constants = ModelRegime::ThickDisk.constants();
        let fields = reconstruct(&grid, &snapshot, &constants, &FloorFixup::KeepVelocity);
        let masks = classify(&grid, &fields, &constants);

        let ctx = EvaluationContext {
            grid: &grid,
            fields: &fields,
            masks: &masks,
            constants: &constants,
            scale_height: None,
            num_modes: 4,
            phi_range: None,
        };
        let matrix = evaluate(&ctx);
        assert_eq!(matrix.dim(), (400, 6));

        // the uniform density snapshot must produce a positive shell volume
        // and a negative total mass flux (all material inflowing)
        let (volume_slot, _) = slot_range("shell_volume").unwrap();
        let (mdot_slot, _) = slot_range("mdot").unwrap();
        for i in 0..6 {
            assert!(matrix[[volume_slot, i]] > 0.0);
            assert!(matrix[[mdot_slot, i]] < 0.0);
        }
        for value in matrix.iter() {
            assert!(value.is_finite());
        }
    }
}
