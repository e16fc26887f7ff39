use ndarray::{Array3, Array4, Axis};
use crate::io::{self, FileHeader};




/**
 * Per-cell field slots in the snapshot payload, by position: density,
 * internal energy, four velocity slots (the stored time component and the
 * three ZAMO-relative spatial components), three lab-frame magnetic field
 * components, and, in the newer format, three face-centered flux components
 * (the field components pre-multiplied by the volume element).
 */
pub static FIELD_COUNT_BASE:      usize = 9;
pub static FIELD_COUNT_FACE_FLUX: usize = 12;

static SLOT_RHO:       usize = 0;
static SLOT_UG:        usize = 1;
static SLOT_VELOCITY:  usize = 2;
static SLOT_BFIELD:    usize = 6;
static SLOT_FACE_FLUX: usize = 9;


/**
 * One decoded snapshot: the header scalars and the named field arrays, all
 * shaped by the snapshot's own header dimensions. Vector fields carry a
 * leading length-4 component axis; the magnetic field's time component is
 * identically zero.
 */
pub struct Snapshot {
    pub header: FileHeader,
    pub rho: Array3<f64>,
    pub ug: Array3<f64>,
    pub velocity: Array4<f64>,
    pub bfield: Array4<f64>,
    pub face_flux: Option<Array4<f64>>,
}




// ============================================================================
impl Snapshot {

    /**
     * Decode one snapshot file: a single ASCII header line followed by a
     * flat f32 payload, field-major, axis 1 fastest. The format variant
     * (with or without the face-centered flux columns) is detected from the
     * payload size.
     */
    pub fn decode(path_str: &str) -> Result<Self, io::Error> {
        let (tokens, offset) = io::read_header_line(path_str)?;
        let header = FileHeader::parse(&tokens, path_str)?;
        let flat: Vec<f64> = io::read_f32_payload(path_str, offset)?
            .into_iter()
            .map(|x| x as f64)
            .collect();

        let num_cells = header.num_cells();
        let num_fields = if flat.len() == FIELD_COUNT_BASE * num_cells {
            FIELD_COUNT_BASE
        } else if flat.len() == FIELD_COUNT_FACE_FLUX * num_cells {
            FIELD_COUNT_FACE_FLUX
        } else {
            return Err(io::Error::UnsupportedFieldCount {
                path: path_str.to_string(),
                supported: format!("{} or {}", FIELD_COUNT_BASE, FIELD_COUNT_FACE_FLUX),
                actual: if num_cells > 0 { flat.len() / num_cells } else { 0 },
            })
        };

        let columns = io::reshape_field_major(flat, num_fields, header.dims);
        Ok(Self::from_columns(header, &columns))
    }

    /**
     * Assemble a snapshot from its header and column array. Also the entry
     * point for synthetic snapshots.
     */
    pub fn from_columns(header: FileHeader, columns: &Array4<f64>) -> Self {
        let [n1, n2, n3] = header.dims;
        let num_fields = columns.dim().0;
        let cell = |c: usize| columns.index_axis(Axis(0), c).to_owned();

        let mut velocity = Array4::zeros((4, n1, n2, n3));
        for m in 0..4 {
            velocity.index_axis_mut(Axis(0), m).assign(&columns.index_axis(Axis(0), SLOT_VELOCITY + m));
        }

        let mut bfield = Array4::zeros((4, n1, n2, n3));
        for m in 1..4 {
            bfield.index_axis_mut(Axis(0), m).assign(&columns.index_axis(Axis(0), SLOT_BFIELD + m - 1));
        }

        let face_flux = if num_fields == FIELD_COUNT_FACE_FLUX {
            let mut flux = Array4::zeros((4, n1, n2, n3));
            for m in 1..4 {
                flux.index_axis_mut(Axis(0), m).assign(&columns.index_axis(Axis(0), SLOT_FACE_FLUX + m - 1));
            }
            Some(flux)
        } else {
            None
        };

        Self {
            rho: cell(SLOT_RHO),
            ug: cell(SLOT_UG),
            velocity,
            bfield,
            face_flux,
            header,
        }
    }

    pub fn time(&self) -> f64 {
        self.header.time
    }

    pub fn dims(&self) -> [usize; 3] {
        self.header.dims
    }
}




// ============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    #[test]
    fn snapshot_round_trip_with_face_flux() {
        let snapshot = testutil::uniform_snapshot([4, 4, 2], 3.5, 1.0, 0.1, [0.5, 0.0, 0.2], true);
        let path = testutil::scratch_file("snap_with_flux.bin");
        testutil::write_snapshot_file(&snapshot, &path);

        let loaded = Snapshot::decode(&path).unwrap();
        assert_eq!(loaded.dims(), [4, 4, 2]);
        assert!((loaded.time() - 3.5).abs() < 1e-12);
        assert!((loaded.rho[[2, 1, 1]] - 1.0).abs() < 1e-6);
        assert!((loaded.velocity[[1, 0, 0, 0]] - 0.1).abs() < 1e-6);
        assert!((loaded.bfield[[1, 0, 0, 0]] - 0.5).abs() < 1e-6);
        assert_eq!(loaded.bfield[[0, 0, 0, 0]], 0.0);
        assert!(loaded.face_flux.is_some());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn snapshot_round_trip_without_face_flux() {
        let snapshot = testutil::uniform_snapshot([4, 2, 1], 0.0, 1.0, 0.0, [0.0, 0.0, 0.0], false);
        let path = testutil::scratch_file("snap_no_flux.bin");
        testutil::write_snapshot_file(&snapshot, &path);

        let loaded = Snapshot::decode(&path).unwrap();
        assert!(loaded.face_flux.is_none());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn snapshot_shapes_follow_its_own_header() {
        // dims legitimately differ from any previously loaded file
        let snapshot = testutil::uniform_snapshot([3, 5, 2], 0.0, 1.0, 0.0, [0.0, 0.0, 0.0], true);
        let path = testutil::scratch_file("snap_own_dims.bin");
        testutil::write_snapshot_file(&snapshot, &path);

        let loaded = Snapshot::decode(&path).unwrap();
        assert_eq!(loaded.rho.dim(), (3, 5, 2));
        assert_eq!(loaded.velocity.dim(), (4, 3, 5, 2));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn unsupported_field_count_is_an_error() {
        let snapshot = testutil::uniform_snapshot([4, 2, 1], 0.0, 1.0, 0.0, [0.0, 0.0, 0.0], false);
        let path = testutil::scratch_file("snap_bad_columns.bin");
        testutil::write_snapshot_file_with_extra_column(&snapshot, &path);
        assert!(matches!(
            Snapshot::decode(&path),
            Err(io::Error::UnsupportedFieldCount{actual: 10, ..})
        ));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn truncated_payload_is_an_error() {
        let snapshot = testutil::uniform_snapshot([4, 2, 1], 0.0, 1.0, 0.0, [0.0, 0.0, 0.0], false);
        let path = testutil::scratch_file("snap_truncated.bin");
        testutil::write_snapshot_file(&snapshot, &path);
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 2]).unwrap();
        assert!(matches!(Snapshot::decode(&path), Err(io::Error::PayloadAlignment{..})));
        std::fs::remove_file(&path).unwrap();
    }
}
