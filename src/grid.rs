use std::f64::consts::PI;
use std::iter::FromIterator;
use ndarray::{s, ArcArray, Array, Array1, Array3, Array4, Ix3, Ix5};
use crate::io::{self, FileHeader};




/**
 * Column layout of the grid file payload. Per cell, in order: internal cell
 * centers x1..x3, physical coordinates (r, theta, phi), the covariant metric
 * (16, row-major), the contravariant metric (16), the metric determinant
 * root, and the internal-to-physical Jacobian (16). The payload is f64.
 */
pub static COLS_INTERNAL: usize = 0;
pub static COLS_PHYSICAL: usize = 3;
pub static COLS_GCOV:     usize = 6;
pub static COLS_GCON:     usize = 22;
pub static COLS_GDET:     usize = 38;
pub static COLS_DXDXP:    usize = 39;
pub static NUM_COLUMNS:   usize = 55;


/**
 * The static grid and metric description: cell-center and cell-face
 * coordinates in internal and physical coordinate systems, the Jacobian
 * between them, the metric tensors, and the volume element. Constructed once
 * per run and read-only thereafter.
 */
#[derive(Clone)]
pub struct Grid {
    pub num_zones: [usize; 3],
    pub cell_size: [f64; 3],
    pub gamma_law: f64,
    pub spin: f64,
    pub r_inner: f64,
    pub r_outer: f64,

    /// Internal (uniform) cell-center coordinates
    pub x1: ArcArray<f64, Ix3>,
    pub x2: ArcArray<f64, Ix3>,
    pub x3: ArcArray<f64, Ix3>,

    /// Physical cell-center coordinates: radius, polar angle, azimuth
    pub r:  ArcArray<f64, Ix3>,
    pub h:  ArcArray<f64, Ix3>,
    pub ph: ArcArray<f64, Ix3>,

    /// Face-centered physical coordinates, one larger along their own axis
    pub r_face:  ArcArray<f64, Ix3>,
    pub h_face:  ArcArray<f64, Ix3>,
    pub ph_face: ArcArray<f64, Ix3>,

    /// Metric tensors [m, n, i, j, k] and sqrt(-det g)
    pub gcov: ArcArray<f64, Ix5>,
    pub gcon: ArcArray<f64, Ix5>,
    pub gdet: ArcArray<f64, Ix3>,

    /// Jacobian d x_phys^m / d x_int^n; identity time component, spatial
    /// block from the coordinate map
    pub dxdxp: ArcArray<f64, Ix5>,
}




// ============================================================================
impl Grid {

    /**
     * Load the grid description from a file: one ASCII header line followed
     * by an f64 binary payload with [`NUM_COLUMNS`] per-cell columns.
     */
    pub fn load(path_str: &str) -> Result<Self, io::Error> {
        let (tokens, offset) = io::read_header_line(path_str)?;
        let header = FileHeader::parse(&tokens, path_str)?;
        let flat = io::read_f64_payload(path_str, offset)?;

        let expected = NUM_COLUMNS * header.num_cells();
        if flat.len() != expected {
            return Err(io::Error::PayloadSize {
                path: path_str.to_string(),
                expected,
                actual: flat.len(),
            })
        }
        let columns = io::reshape_field_major(flat, NUM_COLUMNS, header.dims);
        Ok(Self::from_columns(&header, &columns))
    }

    /**
     * Assemble a grid from a parsed header and the column array. Also the
     * entry point for synthetically generated grids.
     */
    pub fn from_columns(header: &FileHeader, columns: &Array4<f64>) -> Self {
        let [n1, n2, n3] = header.dims;
        let cell = |c: usize| -> Array3<f64> {
            columns.index_axis(ndarray::Axis(0), c).to_owned()
        };
        let tensor = |c0: usize| -> Array<f64, Ix5> {
            let mut out = Array::zeros((4, 4, n1, n2, n3));
            for m in 0..4 {
                for n in 0..4 {
                    out.slice_mut(s![m, n, .., .., ..])
                       .assign(&columns.index_axis(ndarray::Axis(0), c0 + 4 * m + n));
                }
            }
            out
        };

        let r  = cell(COLS_PHYSICAL + 0);
        let h  = cell(COLS_PHYSICAL + 1);
        let ph = cell(COLS_PHYSICAL + 2);
        let r_face  = face_coordinates(&r,  ndarray::Axis(0), FaceAverage::Geometric);
        let h_face  = face_coordinates(&h,  ndarray::Axis(1), FaceAverage::Arithmetic);
        let ph_face = face_coordinates(&ph, ndarray::Axis(2), FaceAverage::Arithmetic);

        Self {
            num_zones: header.dims,
            cell_size: header.cell_size,
            gamma_law: header.gamma_law,
            spin: header.spin,
            r_inner: header.r_inner,
            r_outer: header.r_outer,
            x1: cell(COLS_INTERNAL + 0).to_shared(),
            x2: cell(COLS_INTERNAL + 1).to_shared(),
            x3: cell(COLS_INTERNAL + 2).to_shared(),
            r: r.to_shared(),
            h: h.to_shared(),
            ph: ph.to_shared(),
            r_face: r_face.to_shared(),
            h_face: h_face.to_shared(),
            ph_face: ph_face.to_shared(),
            gcov: tensor(COLS_GCOV).to_shared(),
            gcon: tensor(COLS_GCON).to_shared(),
            gdet: cell(COLS_GDET).to_shared(),
            dxdxp: tensor(COLS_DXDXP).to_shared(),
        }
    }

    /**
     * Check the structural invariants: the physical radius increases
     * monotonically along the radial axis, and the two metric tensors are
     * inverses of one another to numerical tolerance.
     */
    pub fn validate(&self) -> anyhow::Result<()> {
        let [n1, n2, n3] = self.num_zones;

        for k in 0..n3 {
            for j in 0..n2 {
                for i in 1..n1 {
                    if self.r[[i, j, k]] <= self.r[[i - 1, j, k]] {
                        anyhow::bail!(
                            "radius is not monotonically increasing at zone ({}, {}, {})", i, j, k)
                    }
                }
            }
        }

        let mut worst = 0.0f64;
        for k in 0..n3 {
            for j in 0..n2 {
                for i in 0..n1 {
                    for m in 0..4 {
                        for n in 0..4 {
                            let mut product = 0.0;
                            for a in 0..4 {
                                product += self.gcon[[m, a, i, j, k]] * self.gcov[[a, n, i, j, k]];
                            }
                            let delta = if m == n { 1.0 } else { 0.0 };
                            worst = worst.max((product - delta).abs());
                        }
                    }
                }
            }
        }
        if worst > 1e-8 {
            anyhow::bail!("metric tensors are not mutual inverses (worst deviation {:.3e})", worst)
        }
        Ok(())
    }

    /**
     * The outer event horizon radius for the grid's spin parameter, in
     * gravitational radii.
     */
    pub fn horizon_radius(&self) -> f64 {
        1.0 + f64::sqrt(1.0 - self.spin * self.spin)
    }

    /**
     * Representative radial coordinate per radial zone, sampled along the
     * midplane.
     */
    pub fn radii(&self) -> Array1<f64> {
        let j = self.num_zones[1] / 2;
        Array1::from_iter((0..self.num_zones[0]).map(|i| self.r[[i, j, 0]]))
    }

    /**
     * The first radial index whose midplane radius is at or outside the
     * given radius; the outermost index if the radius is off the grid.
     */
    pub fn radial_index_of(&self, radius: f64) -> usize {
        let radii = self.radii();
        for i in 0..radii.len() {
            if radii[i] >= radius {
                return i
            }
        }
        radii.len() - 1
    }

    /**
     * The azimuthal extent actually covered by the simulation.
     */
    pub fn wedge_angle(&self) -> f64 {
        let [_, n2, n3] = self.num_zones;
        let j = n2 / 2;

        if n3 > 1 {
            self.ph_face[[0, j, n3]] - self.ph_face[[0, j, 0]]
        } else {
            self.cell_size[2] * self.dxdxp[[3, 3, 0, j, 0]]
        }
    }

    /**
     * Multiplicative correction converting an integral over the simulated
     * wedge to a full-circle equivalent.
     */
    pub fn wedge_rescale(&self) -> f64 {
        2.0 * PI / self.wedge_angle()
    }

    pub fn gcov_at(&self, i: usize, j: usize, k: usize) -> [[f64; 4]; 4] {
        let mut g = [[0.0; 4]; 4];
        for m in 0..4 {
            for n in 0..4 {
                g[m][n] = self.gcov[[m, n, i, j, k]];
            }
        }
        g
    }

    pub fn gcon_at(&self, i: usize, j: usize, k: usize) -> [[f64; 4]; 4] {
        let mut g = [[0.0; 4]; 4];
        for m in 0..4 {
            for n in 0..4 {
                g[m][n] = self.gcon[[m, n, i, j, k]];
            }
        }
        g
    }

}




/**
 * Averaging rule for constructing face coordinates from adjacent cell
 * centers: geometric for the (logarithmically spaced) radial axis,
 * arithmetic for the angular axes.
 */
enum FaceAverage {
    Geometric,
    Arithmetic,
}


// ============================================================================
fn face_coordinates(centers: &Array3<f64>, axis: ndarray::Axis, rule: FaceAverage) -> Array3<f64> {
    let dim = centers.dim();
    let sizes = [dim.0, dim.1, dim.2];
    let n = sizes[axis.0];
    let mut face_dim = sizes;
    face_dim[axis.0] = n + 1;
    let mut faces = Array3::zeros((face_dim[0], face_dim[1], face_dim[2]));

    let get = |idx: [usize; 3]| centers[[idx[0], idx[1], idx[2]]];

    for a in 0..face_dim[0] {
        for b in 0..face_dim[1] {
            for c in 0..face_dim[2] {
                let idx = [a, b, c];
                if idx[axis.0] == 0 || idx[axis.0] == n {
                    continue
                }
                let mut lo = idx;
                lo[axis.0] -= 1;
                let (xl, xr) = (get(lo), get(idx));
                faces[[a, b, c]] = match rule {
                    FaceAverage::Geometric  => f64::sqrt(xl * xr),
                    FaceAverage::Arithmetic => 0.5 * (xl + xr),
                };
            }
        }
    }

    // boundary extrapolation: reflect the first interior face about the
    // first/last cell center, with the matching averaging rule
    for a in 0..face_dim[0] {
        for b in 0..face_dim[1] {
            for c in 0..face_dim[2] {
                let mut idx = [a, b, c];
                if idx[axis.0] != 0 {
                    continue
                }
                let first_center = get(idx);
                idx[axis.0] = 1;
                let first_face = if n > 1 {
                    faces[[idx[0], idx[1], idx[2]]]
                } else {
                    first_center
                };
                idx[axis.0] = 0;
                faces[[idx[0], idx[1], idx[2]]] = match rule {
                    FaceAverage::Geometric  => first_center * first_center / first_face,
                    FaceAverage::Arithmetic => 2.0 * first_center - first_face,
                };

                let mut last = [a, b, c];
                last[axis.0] = n - 1;
                let last_center = get(last);
                last[axis.0] = n - 1;
                let last_face = if n > 1 {
                    let mut f = [a, b, c];
                    f[axis.0] = n - 1;
                    faces[[f[0], f[1], f[2]]]
                } else {
                    last_center
                };
                let mut outer = [a, b, c];
                outer[axis.0] = n;
                faces[[outer[0], outer[1], outer[2]]] = match rule {
                    FaceAverage::Geometric  => last_center * last_center / last_face,
                    FaceAverage::Arithmetic => 2.0 * last_center - last_face,
                };
            }
        }
    }
    faces
}
