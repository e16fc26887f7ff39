use ndarray::{Array2, Array3, ArrayView1, s};
use serde::{Serialize, Deserialize};


/**
 * The radial index columns of metadata slot 0 holding, per snapshot, the
 * (start-time, end-time, item-count) triplet. The count doubles as the
 * computed-column marker and makes the merge's strided addition carry the
 * metadata with no special casing.
 */
pub static META_SLOT: usize = 0;
static META_START: usize = 0;
static META_END:   usize = 1;
static META_COUNT: usize = 2;


/**
 * The persistent diagnostic buffer: a dense array indexed by
 * [diagnostic slot, snapshot, radial zone]. Slot 0 is reserved for the
 * per-snapshot metadata triplets; the remaining slots hold one radial
 * profile per snapshot each. The snapshot axis grows append-only.
 */
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimeSeriesBuffer {
    data: Array3<f64>,
}




// ============================================================================
impl TimeSeriesBuffer {

    pub fn new(num_slots: usize, num_radii: usize) -> Self {
        Self { data: Array3::zeros((num_slots, 0, num_radii)) }
    }

    pub fn num_slots(&self) -> usize {
        self.data.dim().0
    }

    pub fn num_snapshots(&self) -> usize {
        self.data.dim().1
    }

    pub fn num_radii(&self) -> usize {
        self.data.dim().2
    }

    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }

    /**
     * Grow the snapshot axis to at least the given length, preserving the
     * existing rows. Shrinking never happens.
     */
    pub fn ensure_snapshots(&mut self, num_snapshots: usize) {
        let (ns, nt, nr) = self.data.dim();
        if num_snapshots <= nt {
            return
        }
        let mut grown = Array3::zeros((ns, num_snapshots, nr));
        grown.slice_mut(s![.., ..nt, ..]).assign(&self.data);
        self.data = grown;
    }

    /**
     * Write one snapshot's diagnostic matrix [slot, radius] into its
     * column and stamp the metadata triplet.
     */
    pub fn write_snapshot(&mut self, index: usize, time: f64, row: &Array2<f64>) {
        assert_eq!(row.dim(), (self.num_slots(), self.num_radii()));
        assert!(index < self.num_snapshots());
        self.data.slice_mut(s![.., index, ..]).assign(row);
        self.data[[META_SLOT, index, META_START]] = time;
        self.data[[META_SLOT, index, META_END]] = time;
        self.data[[META_SLOT, index, META_COUNT]] = 1.0;
    }

    pub fn is_computed(&self, index: usize) -> bool {
        index < self.num_snapshots() && self.data[[META_SLOT, index, META_COUNT]] > 0.0
    }

    pub fn computed_count(&self) -> usize {
        (0..self.num_snapshots()).filter(|&j| self.is_computed(j)).count()
    }

    pub fn time_of(&self, index: usize) -> f64 {
        self.data[[META_SLOT, index, META_START]]
    }

    pub fn row(&self, slot: usize, snapshot: usize) -> ArrayView1<f64> {
        self.data.slice(s![slot, snapshot, ..])
    }

    /**
     * Add the columns owned by the given shard coordinates from another
     * buffer into this one. Disjoint ownership makes repeated application
     * commutative; the caller checks slot-count compatibility.
     */
    pub fn merge_stride(&mut self, other: &Self, shard_index: usize, shard_count: usize) {
        assert_eq!(self.num_slots(), other.num_slots());
        assert_eq!(self.num_radii(), other.num_radii());

        let nt = self.num_snapshots().min(other.num_snapshots());
        let mut j = shard_index;
        while j < nt {
            let mut column = self.data.slice_mut(s![.., j, ..]);
            column += &other.data.slice(s![.., j, ..]);
            j += shard_count;
        }
    }
}
