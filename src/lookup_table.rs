use std::num::ParseFloatError;


/**
 * A piecewise-linear table over a monotonically increasing abscissa. Used for
 * the time-averaged scale-height profile consumed by the polar-band filter,
 * and for radius-keyed threshold ramps.
 */
pub struct LookupTable {
    data: Vec<(f64, f64)>,
}

impl LookupTable {
    pub fn new(data: Vec<(f64, f64)>) -> Self {
        // ensure the table's left-column is ordered increasing monotonically.
        if data.len() < 2 {
            panic!("the table must have at least two entries");
        }

        let mut x_prev = data.first().unwrap().0;
        for &(x, _) in &data[1..] {
            if x <= x_prev {
                panic!("the table left column is not monotonically increasing");
            }
            x_prev = x;
        }
        Self { data }
    }

    /**
     * Build a table from whitespace-separated ASCII text with two columns
     * per row.
     */
    pub fn from_ascii(contents: &str) -> Result<Self, ParseFloatError> {
        let values: Result<Vec<f64>, _> = contents.split_whitespace().map(|x| x.parse()).collect();
        let data = values?
            .chunks(2)
            .filter(|chunk| chunk.len() == 2)
            .map(|chunk| (chunk[0], chunk[1]))
            .collect();
        Ok(Self::new(data))
    }

    /**
     * Sample the table at x, clamping to the end values outside the
     * tabulated range. Out-of-range samples are a documented fallback, not
     * an error: the profiles this table holds are slowly varying at both
     * ends of the grid.
     */
    pub fn sample(&self, x: f64) -> f64 {
        let v = &self.data;

        if x <= v[0].0 {
            return v[0].1
        }
        if x >= v[v.len() - 1].0 {
            return v[v.len() - 1].1
        }
        let (i0, i1) = self.indexes_straddling(x);
        let x0 = v[i0].0;
        let y0 = v[i0].1;
        let x1 = v[i1].0;
        let y1 = v[i1].1;
        y0 + (x - x0) * (y1 - y0) / (x1 - x0)
    }

    fn indexes_straddling(&self, x: f64) -> (usize, usize) {
        let index = match self.data.binary_search_by(|&(xi, _)| Self::compare_f64(xi, x)) {
            Ok(index) => index,
            Err(index) => index,
        };
        (index - 1, index)
    }

    fn compare_f64(a: f64, b: f64) -> std::cmp::Ordering {
        if a < b {
            std::cmp::Ordering::Less
        } else if a > b {
            std::cmp::Ordering::Greater
        } else {
            std::cmp::Ordering::Equal
        }
    }
}
