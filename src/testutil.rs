//! Synthetic grids, snapshots, and fixture files shared by the unit tests.

use std::f64::consts::PI;
use std::io::Write;
use ndarray::{Array3, Array4, Axis};
use crate::grid::{self, Grid};
use crate::io::FileHeader;
use crate::snapshots::Snapshot;


pub fn scratch_file(name: &str) -> String {
    let mut path = std::env::temp_dir();
    path.push(format!("diskdiag_{}_{}", std::process::id(), name));
    path.to_str().unwrap().to_string()
}




// ============================================================================
pub fn det_4x4(m: &[[f64; 4]; 4]) -> f64 {
    let mut det = 0.0;
    for c in 0..4 {
        det += m[0][c] * cofactor(m, 0, c);
    }
    det
}

pub fn invert_4x4(m: &[[f64; 4]; 4]) -> [[f64; 4]; 4] {
    let det = det_4x4(m);
    let mut inv = [[0.0; 4]; 4];
    for r in 0..4 {
        for c in 0..4 {
            inv[c][r] = cofactor(m, r, c) / det;
        }
    }
    inv
}

fn cofactor(m: &[[f64; 4]; 4], row: usize, col: usize) -> f64 {
    let mut sub = [[0.0; 3]; 3];
    let mut sr = 0;
    for r in 0..4 {
        if r == row {
            continue
        }
        let mut sc = 0;
        for c in 0..4 {
            if c == col {
                continue
            }
            sub[sr][sc] = m[r][c];
            sc += 1;
        }
        sr += 1;
    }
    let d3 = sub[0][0] * (sub[1][1] * sub[2][2] - sub[1][2] * sub[2][1])
           - sub[0][1] * (sub[1][0] * sub[2][2] - sub[1][2] * sub[2][0])
           + sub[0][2] * (sub[1][0] * sub[2][1] - sub[1][1] * sub[2][0]);
    if (row + col) % 2 == 0 { d3 } else { -d3 }
}




// ============================================================================
fn grid_from_metric<F>(dims: [usize; 3], spin: f64, r_inner: f64, r_outer: f64, wedge: f64, metric: F) -> Grid
where
    F: Fn(f64, f64) -> [[f64; 4]; 4]
{
    let [n1, n2, n3] = dims;
    let dx1 = (r_outer.ln() - r_inner.ln()) / n1 as f64;
    let dx2 = 1.0 / n2 as f64;
    let dx3 = 1.0 / n3 as f64;
    let mut columns = Array4::zeros((grid::NUM_COLUMNS, n1, n2, n3));

    for i in 0..n1 {
        for j in 0..n2 {
            for k in 0..n3 {
                let x1 = r_inner.ln() + (i as f64 + 0.5) * dx1;
                let x2 = (j as f64 + 0.5) * dx2;
                let x3 = (k as f64 + 0.5) * dx3;
                let r = x1.exp();
                let h = PI * x2;
                let ph = wedge * x3;

                let jac = [1.0, r, PI, wedge];
                let phys = metric(r, h);
                let mut gcov = [[0.0; 4]; 4];
                for m in 0..4 {
                    for n in 0..4 {
                        gcov[m][n] = phys[m][n] * jac[m] * jac[n];
                    }
                }
                let gcon = invert_4x4(&gcov);
                let gdet = (-det_4x4(&gcov)).sqrt();

                columns[[grid::COLS_INTERNAL + 0, i, j, k]] = x1;
                columns[[grid::COLS_INTERNAL + 1, i, j, k]] = x2;
                columns[[grid::COLS_INTERNAL + 2, i, j, k]] = x3;
                columns[[grid::COLS_PHYSICAL + 0, i, j, k]] = r;
                columns[[grid::COLS_PHYSICAL + 1, i, j, k]] = h;
                columns[[grid::COLS_PHYSICAL + 2, i, j, k]] = ph;
                for m in 0..4 {
                    for n in 0..4 {
                        columns[[grid::COLS_GCOV + 4 * m + n, i, j, k]] = gcov[m][n];
                        columns[[grid::COLS_GCON + 4 * m + n, i, j, k]] = gcon[m][n];
                    }
                }
                columns[[grid::COLS_GDET, i, j, k]] = gdet;
                columns[[grid::COLS_DXDXP + 0, i, j, k]] = 1.0;
                columns[[grid::COLS_DXDXP + 5, i, j, k]] = r;
                columns[[grid::COLS_DXDXP + 10, i, j, k]] = PI;
                columns[[grid::COLS_DXDXP + 15, i, j, k]] = wedge;
            }
        }
    }

    let header = FileHeader {
        time: 0.0,
        dims,
        cell_size: [dx1, dx2, dx3],
        gamma_law: 4.0 / 3.0,
        spin,
        r_inner,
        r_outer,
    };
    Grid::from_columns(&header, &columns)
}


/**
 * Flat spacetime in spherical coordinates, on the same logarithmic-radial
 * internal mapping the production grids use.
 */
pub fn minkowski_grid(dims: [usize; 3], r_inner: f64, r_outer: f64, wedge: f64) -> Grid {
    grid_from_metric(dims, 0.0, r_inner, r_outer, wedge, |r, h| {
        let s = h.sin();
        [
            [-1.0, 0.0, 0.0,     0.0        ],
            [ 0.0, 1.0, 0.0,     0.0        ],
            [ 0.0, 0.0, r * r,   0.0        ],
            [ 0.0, 0.0, 0.0,     r * r * s * s],
        ]
    })
}


/**
 * The Kerr metric in spherical Kerr-Schild form, which is regular on the
 * horizon and has the nonzero g_tr, g_tphi components that exercise the
 * ZAMO decomposition.
 */
pub fn kerr_schild_grid(dims: [usize; 3], spin: f64, r_inner: f64, r_outer: f64, wedge: f64) -> Grid {
    let a = spin;
    grid_from_metric(dims, spin, r_inner, r_outer, wedge, move |r, h| {
        let s2 = h.sin() * h.sin();
        let sigma = r * r + a * a * h.cos() * h.cos();
        let f = 2.0 * r / sigma;
        let g_tt = f - 1.0;
        let g_tr = f;
        let g_tp = -a * f * s2;
        let g_rr = 1.0 + f;
        let g_rp = -a * s2 * (1.0 + f);
        let g_hh = sigma;
        let g_pp = s2 * (sigma + a * a * (1.0 + f) * s2);
        [
            [g_tt, g_tr, 0.0,  g_tp],
            [g_tr, g_rr, 0.0,  g_rp],
            [0.0,  0.0,  g_hh, 0.0 ],
            [g_tp, g_rp, 0.0,  g_pp],
        ]
    })
}




// ============================================================================
fn header_line(header: &FileHeader) -> String {
    format!(
        "{} {} {} {} {} {} {} {} {} {} {}\n",
        header.time,
        header.dims[0], header.dims[1], header.dims[2],
        header.cell_size[0], header.cell_size[1], header.cell_size[2],
        header.gamma_law, header.spin, header.r_inner, header.r_outer,
    )
}

fn grid_columns(grid: &Grid) -> Array4<f64> {
    let [n1, n2, n3] = grid.num_zones;
    let mut columns = Array4::zeros((grid::NUM_COLUMNS, n1, n2, n3));
    columns.index_axis_mut(Axis(0), grid::COLS_INTERNAL + 0).assign(&grid.x1);
    columns.index_axis_mut(Axis(0), grid::COLS_INTERNAL + 1).assign(&grid.x2);
    columns.index_axis_mut(Axis(0), grid::COLS_INTERNAL + 2).assign(&grid.x3);
    columns.index_axis_mut(Axis(0), grid::COLS_PHYSICAL + 0).assign(&grid.r);
    columns.index_axis_mut(Axis(0), grid::COLS_PHYSICAL + 1).assign(&grid.h);
    columns.index_axis_mut(Axis(0), grid::COLS_PHYSICAL + 2).assign(&grid.ph);
    for m in 0..4 {
        for n in 0..4 {
            columns.index_axis_mut(Axis(0), grid::COLS_GCOV + 4 * m + n)
                .assign(&grid.gcov.index_axis(Axis(0), m).index_axis(Axis(0), n));
            columns.index_axis_mut(Axis(0), grid::COLS_GCON + 4 * m + n)
                .assign(&grid.gcon.index_axis(Axis(0), m).index_axis(Axis(0), n));
            columns.index_axis_mut(Axis(0), grid::COLS_DXDXP + 4 * m + n)
                .assign(&grid.dxdxp.index_axis(Axis(0), m).index_axis(Axis(0), n));
        }
    }
    columns.index_axis_mut(Axis(0), grid::COLS_GDET).assign(&grid.gdet);
    columns
}

pub fn write_grid_file(grid: &Grid, path_str: &str) {
    let header = FileHeader {
        time: 0.0,
        dims: grid.num_zones,
        cell_size: grid.cell_size,
        gamma_law: grid.gamma_law,
        spin: grid.spin,
        r_inner: grid.r_inner,
        r_outer: grid.r_outer,
    };
    let flat = crate::io::flatten_field_major(&grid_columns(grid).view());
    let mut file = std::fs::File::create(path_str).unwrap();
    file.write_all(header_line(&header).as_bytes()).unwrap();
    for value in flat {
        file.write_all(&value.to_le_bytes()).unwrap();
    }
}

pub fn write_grid_file_truncated(grid: &Grid, path_str: &str, drop_values: usize) {
    let header = FileHeader {
        time: 0.0,
        dims: grid.num_zones,
        cell_size: grid.cell_size,
        gamma_law: grid.gamma_law,
        spin: grid.spin,
        r_inner: grid.r_inner,
        r_outer: grid.r_outer,
    };
    let flat = crate::io::flatten_field_major(&grid_columns(grid).view());
    let mut file = std::fs::File::create(path_str).unwrap();
    file.write_all(header_line(&header).as_bytes()).unwrap();
    for value in &flat[..flat.len() - drop_values] {
        file.write_all(&value.to_le_bytes()).unwrap();
    }
}




// ============================================================================
pub fn header_for_dims(dims: [usize; 3], time: f64) -> FileHeader {
    FileHeader {
        time,
        dims,
        cell_size: [0.1, 1.0 / dims[1] as f64, 1.0 / dims[2] as f64],
        gamma_law: 4.0 / 3.0,
        spin: 0.0,
        r_inner: 2.0,
        r_outer: 20.0,
    }
}

pub fn header_for_grid(grid: &Grid, time: f64) -> FileHeader {
    FileHeader {
        time,
        dims: grid.num_zones,
        cell_size: grid.cell_size,
        gamma_law: grid.gamma_law,
        spin: grid.spin,
        r_inner: grid.r_inner,
        r_outer: grid.r_outer,
    }
}


/**
 * A spatially uniform snapshot: constant density, a constant radial
 * relative velocity, and a constant lab-frame field.
 */
pub fn uniform_snapshot(dims: [usize; 3], time: f64, rho: f64, vtilde1: f64, b: [f64; 3], with_face_flux: bool) -> Snapshot {
    let [n1, n2, n3] = dims;
    let mut velocity = Array4::zeros((4, n1, n2, n3));
    velocity.index_axis_mut(Axis(0), 0).fill(1.0);
    velocity.index_axis_mut(Axis(0), 1).fill(vtilde1);

    let mut bfield = Array4::zeros((4, n1, n2, n3));
    for m in 1..4 {
        bfield.index_axis_mut(Axis(0), m).fill(b[m - 1]);
    }

    let face_flux = if with_face_flux {
        Some(bfield.clone())
    } else {
        None
    };

    Snapshot {
        header: header_for_dims(dims, time),
        rho: Array3::from_elem((n1, n2, n3), rho),
        ug: Array3::from_elem((n1, n2, n3), 0.05 * rho),
        velocity,
        bfield,
        face_flux,
    }
}

fn snapshot_columns(snapshot: &Snapshot) -> Array4<f64> {
    let [n1, n2, n3] = snapshot.dims();
    let num_fields = if snapshot.face_flux.is_some() {
        crate::snapshots::FIELD_COUNT_FACE_FLUX
    } else {
        crate::snapshots::FIELD_COUNT_BASE
    };
    let mut columns = Array4::zeros((num_fields, n1, n2, n3));
    columns.index_axis_mut(Axis(0), 0).assign(&snapshot.rho);
    columns.index_axis_mut(Axis(0), 1).assign(&snapshot.ug);
    for m in 0..4 {
        columns.index_axis_mut(Axis(0), 2 + m).assign(&snapshot.velocity.index_axis(Axis(0), m));
    }
    for m in 1..4 {
        columns.index_axis_mut(Axis(0), 5 + m).assign(&snapshot.bfield.index_axis(Axis(0), m));
    }
    if let Some(flux) = &snapshot.face_flux {
        for m in 1..4 {
            columns.index_axis_mut(Axis(0), 8 + m).assign(&flux.index_axis(Axis(0), m));
        }
    }
    columns
}

pub fn write_snapshot_file(snapshot: &Snapshot, path_str: &str) {
    let flat = crate::io::flatten_field_major(&snapshot_columns(snapshot).view());
    let mut file = std::fs::File::create(path_str).unwrap();
    file.write_all(header_line(&snapshot.header).as_bytes()).unwrap();
    for value in flat {
        file.write_all(&(value as f32).to_le_bytes()).unwrap();
    }
}

pub fn write_snapshot_file_with_extra_column(snapshot: &Snapshot, path_str: &str) {
    let columns = snapshot_columns(snapshot);
    let [n1, n2, n3] = snapshot.dims();
    let mut padded = Array4::zeros((columns.dim().0 + 1, n1, n2, n3));
    for c in 0..columns.dim().0 {
        padded.index_axis_mut(Axis(0), c).assign(&columns.index_axis(Axis(0), c));
    }
    let flat = crate::io::flatten_field_major(&padded.view());
    let mut file = std::fs::File::create(path_str).unwrap();
    file.write_all(header_line(&snapshot.header).as_bytes()).unwrap();
    for value in flat {
        file.write_all(&(value as f32).to_le_bytes()).unwrap();
    }
}
