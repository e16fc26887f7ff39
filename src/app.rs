pub static DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
pub static VERSION_AND_BUILD: &str = git_version::git_version!(
    prefix = concat!("v", env!("CARGO_PKG_VERSION"), " "),
    fallback = concat!("v", env!("CARGO_PKG_VERSION"), " untracked"));


use std::ffi::OsStr;
use std::fs::read_to_string;
use std::path::Path;
use serde::{Serialize, Deserialize};

use crate::fields::FloorFixup;
use crate::io;
use crate::lookup_table::LookupTable;
use crate::regions::ModelRegime;


// ============================================================================
#[derive(thiserror::Error, Debug)]
pub enum Error {

    #[error("{0}")]
    IO(#[from] std::io::Error),

    #[error("{0}")]
    SerdeYaml(#[from] serde_yaml::Error),

    #[error("{0}")]
    AppIO(#[from] io::Error),

    #[error("unknown input file type '{0}'")]
    UnknownInputType(String),

    #[error("malformed scale-height profile {0}")]
    ScaleHeightProfile(String),
}


/**
 * Run control: reporting cadence and the integrator options resolved at
 * startup.
 */
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Control {

    /// Print a progress line every this many snapshots
    pub progress_interval: usize,

    /// Azimuthal modes retained by the spectra diagnostics
    pub num_modes: usize,

    /// Two-column ASCII file with the time-averaged scale-height profile
    /// consumed by the polar-band filter
    #[serde(default)]
    pub scale_height_profile: Option<String>,

    /// Azimuthal sub-range restriction for the warp-sensitive diagnostics
    #[serde(default)]
    pub phi_range: Option<(f64, f64)>,
}


/**
 * User configuration
 */
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    pub grid_path: String,
    pub snapshot_dir: String,
    pub output_dir: String,
    pub regime: ModelRegime,

    #[serde(default)]
    pub floor_fixup: FloorFixup,

    pub control: Control,
}


/**
 * App state
 */
#[derive(Clone, Serialize, Deserialize)]
pub struct App {
    pub config: Configuration,
    pub version: String,
}




// ============================================================================
impl Control {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.progress_interval == 0 {
            anyhow::bail!("progress_interval must be positive")
        }
        if self.num_modes == 0 {
            anyhow::bail!("num_modes must be positive")
        }
        if let Some((lo, hi)) = self.phi_range {
            if lo >= hi {
                anyhow::bail!("phi_range must be an increasing pair")
            }
        }
        Ok(())
    }
}

impl Configuration {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.regime.validate()?;
        self.control.validate()?;
        Ok(())
    }
}




// ============================================================================
impl App {

    /**
     * Return self as a result, which will be in an error state if any of
     * the configuration items did not pass validation.
     */
    pub fn validate(self) -> anyhow::Result<Self> {
        self.config.validate()?;
        Ok(self)
    }

    /**
     * Construct a new App instance from a user configuration.
     */
    pub fn from_config(config: Configuration) -> Result<Self, Error> {
        Ok(Self {
            config,
            version: VERSION_AND_BUILD.to_string(),
        })
    }

    /**
     * Construct a new App instance from a config.yaml file.
     */
    pub fn from_file(filename: &str) -> Result<Self, Error> {
        match Path::new(&filename).extension().and_then(OsStr::to_str) {
            Some("yaml") => Self::from_config(serde_yaml::from_str(&read_to_string(filename)?)?),
            _ => Err(Error::UnknownInputType(filename.to_string())),
        }
    }

    /**
     * Construct a new App instance from a preset (hard-coded)
     * configuration name, or otherwise an input file if no matching preset
     * is found.
     */
    pub fn from_preset_or_file(input: &str) -> Result<Self, Error> {
        match input {
            "thick_disk" => Self::from_config(serde_yaml::from_str(std::include_str!("../setups/thick_disk.yaml"))?),
            _ => Self::from_file(input),
        }
    }

    /**
     * Load the optional time-averaged scale-height profile named by the
     * configuration.
     */
    pub fn load_scale_height(&self) -> Result<Option<LookupTable>, Error> {
        match &self.config.control.scale_height_profile {
            None => Ok(None),
            Some(path) => {
                let contents = read_to_string(path)?;
                LookupTable::from_ascii(&contents)
                    .map(Some)
                    .map_err(|_| Error::ScaleHeightProfile(path.clone()))
            }
        }
    }
}
