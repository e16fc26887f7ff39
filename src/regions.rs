use ndarray::{Array1, Array3};
use serde::{Serialize, Deserialize};
use crate::fields::{ReconstructedFields, TINY};
use crate::grid::Grid;




/**
 * Threshold and window constants for one physical model regime. The values
 * are configuration data with no derivation; each named regime resolves to
 * one table at startup, and the `custom` regime accepts a full table from
 * the configuration file.
 */
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegimeConstants {

    /// Magnetization ceiling of the floor pass at small radius
    pub floor_sigma_inner: f64,

    /// Magnetization ceiling of the floor pass at large radius
    pub floor_sigma_outer: f64,

    /// Radius where the floor ceiling transitions between its two values
    pub floor_transition_radius: f64,

    /// Multiplicative half-width of the transition
    pub floor_transition_width: f64,

    /// Density and internal energy assigned to floored cells
    pub rho_floor: f64,
    pub ug_floor: f64,

    /// Lorentz factor ceiling applied when assembling the four-velocity
    pub gamma_max: f64,

    /// Magnetization above which material counts as jet
    pub sigma_jet: f64,

    /// Magnetization below which material can count as disk
    pub disk_sigma_max: f64,

    /// Polar band half-width for the disk, in scale heights
    pub scale_height_multiplier: f64,

    /// Bernoulli parameter above which non-jet material counts as wind
    pub wind_bernoulli_min: f64,

    /// Blending width of the Bernoulli threshold
    pub bernoulli_blend: f64,

    /// Blending width of magnetization thresholds, in decades
    pub blend_decades: f64,

    /// Fallback jet opening angle when the boundary search finds no
    /// threshold crossing
    pub default_jet_angle: f64,

    /// Fraction of the run used for steady-state time averages by the
    /// downstream consumers
    pub averaging_window: [f64; 2],
}


/**
 * Named physical model regimes. Resolved once at startup; the threshold
 * tables differ between regimes and are not derived from one another.
 */
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "snake_case", tag = "regime")]
pub enum ModelRegime {
    ThickDisk,
    ThinDisk,
    MagneticallyArrested,
    Custom(RegimeConstants),
}




// ============================================================================
impl ModelRegime {

    pub fn constants(&self) -> RegimeConstants {
        match self {
            ModelRegime::ThickDisk => RegimeConstants {
                floor_sigma_inner: 30.0,
                floor_sigma_outer: 10.0,
                floor_transition_radius: 15.0,
                floor_transition_width: 2.0,
                rho_floor: 1e-6,
                ug_floor: 1e-8,
                gamma_max: 50.0,
                sigma_jet: 1.0,
                disk_sigma_max: 0.1,
                scale_height_multiplier: 2.0,
                wind_bernoulli_min: 0.0,
                bernoulli_blend: 0.05,
                blend_decades: 0.25,
                default_jet_angle: 0.5,
                averaging_window: [0.5, 1.0],
            },
            ModelRegime::ThinDisk => RegimeConstants {
                floor_sigma_inner: 10.0,
                floor_sigma_outer: 5.0,
                floor_transition_radius: 10.0,
                floor_transition_width: 2.0,
                rho_floor: 1e-7,
                ug_floor: 1e-9,
                gamma_max: 20.0,
                sigma_jet: 0.5,
                disk_sigma_max: 0.05,
                scale_height_multiplier: 3.0,
                wind_bernoulli_min: 0.0,
                bernoulli_blend: 0.02,
                blend_decades: 0.2,
                default_jet_angle: 0.3,
                averaging_window: [0.6, 1.0],
            },
            ModelRegime::MagneticallyArrested => RegimeConstants {
                floor_sigma_inner: 50.0,
                floor_sigma_outer: 25.0,
                floor_transition_radius: 20.0,
                floor_transition_width: 2.0,
                rho_floor: 1e-6,
                ug_floor: 1e-8,
                gamma_max: 50.0,
                sigma_jet: 2.0,
                disk_sigma_max: 0.3,
                scale_height_multiplier: 1.5,
                wind_bernoulli_min: 0.05,
                bernoulli_blend: 0.05,
                blend_decades: 0.3,
                default_jet_angle: 0.7,
                averaging_window: [0.5, 1.0],
            },
            ModelRegime::Custom(constants) => constants.clone(),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let c = self.constants();
        if c.floor_sigma_inner <= 0.0 || c.floor_sigma_outer <= 0.0 {
            anyhow::bail!("floor magnetization ceilings must be positive")
        }
        if c.floor_transition_width <= 1.0 {
            anyhow::bail!("floor_transition_width must exceed 1")
        }
        if c.gamma_max <= 1.0 {
            anyhow::bail!("gamma_max must exceed 1")
        }
        if c.sigma_jet <= c.disk_sigma_max {
            anyhow::bail!("sigma_jet must exceed disk_sigma_max")
        }
        if !(c.default_jet_angle > 0.0 && c.default_jet_angle < std::f64::consts::FRAC_PI_2) {
            anyhow::bail!("default_jet_angle must lie in (0, pi/2)")
        }
        if c.averaging_window[0] < 0.0 || c.averaging_window[1] > 1.0
            || c.averaging_window[0] >= c.averaging_window[1] {
            anyhow::bail!("averaging_window must be an increasing pair within [0, 1]")
        }
        Ok(())
    }
}




/**
 * Smoothly blended region weights derived from the reconstructed fields,
 * together with the per-radius scale height statistics they are built on.
 * The weights vary continuously across the threshold boundaries so that
 * diagnostics do not oscillate between adjacent radii.
 */
pub struct RegionMasks {
    pub disk: Array3<f64>,
    pub corona: Array3<f64>,
    pub jet: Array3<f64>,
    pub wind: Array3<f64>,

    /// Density-weighted midplane angle per radius
    pub thetamid: Array1<f64>,

    /// Density-weighted polar-angle deviation from the midplane per radius
    pub hoverr: Array1<f64>,
}




// ============================================================================
fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + f64::exp(-x.max(-40.0).min(40.0)))
}


/**
 * Classify every cell into smooth disk / corona / jet / wind weights using
 * the regime's thresholds on magnetization, scale height and boundedness.
 */
pub fn classify(grid: &Grid, fields: &ReconstructedFields, constants: &RegimeConstants) -> RegionMasks {
    let [n1, n2, n3] = grid.num_zones;
    let sigma_width = constants.blend_decades * std::f64::consts::LN_10;

    // density-weighted midplane angle and scale height per radius
    let mut thetamid = Array1::zeros(n1);
    let mut hoverr = Array1::zeros(n1);
    for i in 0..n1 {
        let mut weight = 0.0;
        let mut angle = 0.0;
        for j in 0..n2 {
            for k in 0..n3 {
                let w = fields.rho[[i, j, k]] * grid.gdet[[i, j, k]];
                weight += w;
                angle += w * grid.h[[i, j, k]];
            }
        }
        thetamid[i] = angle / (weight + TINY);

        let mut deviation = 0.0;
        for j in 0..n2 {
            for k in 0..n3 {
                let w = fields.rho[[i, j, k]] * grid.gdet[[i, j, k]];
                deviation += w * (grid.h[[i, j, k]] - thetamid[i]).abs();
            }
        }
        hoverr[i] = deviation / (weight + TINY);
    }

    let bernoulli = fields.bernoulli();
    let mut disk = Array3::zeros((n1, n2, n3));
    let mut corona = Array3::zeros((n1, n2, n3));
    let mut jet = Array3::zeros((n1, n2, n3));
    let mut wind = Array3::zeros((n1, n2, n3));

    for i in 0..n1 {
        let band = constants.scale_height_multiplier * hoverr[i];
        let band_width = 0.25 * hoverr[i] + TINY;
        for j in 0..n2 {
            for k in 0..n3 {
                let sigma = fields.sigma[[i, j, k]].max(TINY);
                let w_jet = logistic((sigma / constants.sigma_jet).ln() / sigma_width);
                let w_lowmag = logistic((constants.disk_sigma_max / sigma).ln() / sigma_width);
                let w_band = logistic((band - (grid.h[[i, j, k]] - thetamid[i]).abs()) / band_width);
                let w_disk = w_lowmag * w_band;
                let w_wind = (1.0 - w_jet) * (1.0 - w_disk)
                    * logistic((bernoulli[[i, j, k]] - constants.wind_bernoulli_min) / constants.bernoulli_blend);
                let w_corona = (1.0 - w_jet) * (1.0 - w_disk) - w_wind;

                disk[[i, j, k]] = w_disk;
                jet[[i, j, k]] = w_jet;
                wind[[i, j, k]] = w_wind;
                corona[[i, j, k]] = w_corona.max(0.0);
            }
        }
    }

    RegionMasks { disk, corona, jet, wind, thetamid, hoverr }
}
