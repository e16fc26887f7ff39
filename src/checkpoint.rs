use std::path::Path;
use serde::{Serialize, Deserialize};
use crate::io;
use crate::timeseries::TimeSeriesBuffer;


/// Bumped whenever the container layout or the slot catalogue changes
/// incompatibly; resumes across a bump recompute rather than misread.
pub static FORMAT_VERSION: u32 = 1;




// ============================================================================
#[derive(thiserror::Error, Debug)]
pub enum Error {

    #[error("{0}")]
    AppIO(#[from] io::Error),

    #[error("missing shard checkpoint {0}")]
    MissingShard(String),

    #[error("shard files disagree on diagnostic slot count: {0} vs {1}")]
    MergeSlotCount(usize, usize),

    #[error("shard file {path} was written for {found} shards, expected {expected}")]
    MergeShardCount {
        path: String,
        found: usize,
        expected: usize,
    },

    #[error("shard file {path} carries container format {found}, expected {expected}")]
    MergeFormatVersion {
        path: String,
        found: u32,
        expected: u32,
    },
}




/**
 * Which slice of the snapshot list a run owns: everything, or the
 * round-robin residue class of one worker among `count`.
 */
#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "snake_case", tag = "kind")]
pub enum ShardCoords {
    Full,
    Shard { index: usize, count: usize },
}

impl ShardCoords {

    pub fn filename(&self) -> String {
        match self {
            ShardCoords::Full => "qty_full.cbor".to_string(),
            ShardCoords::Shard { index, count } => format!("qty_{:03}_{:03}.cbor", index, count),
        }
    }

    pub fn owns(&self, snapshot_index: usize) -> bool {
        match self {
            ShardCoords::Full => true,
            ShardCoords::Shard { index, count } => snapshot_index % count == *index,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if let ShardCoords::Shard { index, count } = self {
            if *count == 0 || index >= count {
                anyhow::bail!("shard index {} is not valid for {} shards", index, count)
            }
        }
        Ok(())
    }
}




/**
 * The versioned on-disk container: one buffer plus its shard coordinates,
 * the slot count, and the code version that wrote it.
 */
#[derive(Serialize, Deserialize)]
pub struct Checkpoint {
    pub format_version: u32,
    pub code_version: String,
    pub num_slots: usize,
    pub shard: ShardCoords,
    pub buffer: TimeSeriesBuffer,
}




// ============================================================================
impl Checkpoint {

    pub fn package(buffer: TimeSeriesBuffer, shard: ShardCoords) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            code_version: crate::app::VERSION_AND_BUILD.to_string(),
            num_slots: buffer.num_slots(),
            shard,
            buffer,
        }
    }

    pub fn path_in(outdir: &str, shard: &ShardCoords) -> String {
        format!("{}/{}", outdir, shard.filename())
    }

    /**
     * Persist the container under its shard-coded filename. The write is
     * a full-file atomic replace.
     */
    pub fn write(&self, outdir: &str) -> Result<(), io::Error> {
        io::write_cbor(self, &Self::path_in(outdir, &self.shard))
    }

    /**
     * Try to load a previously written buffer for the given shard
     * coordinates. A missing file yields `None`; so does a stale one
     * (format-version or slot-count skew), with a warning, since resumed
     * runs across a catalogue change must recompute rather than extend.
     */
    pub fn load(outdir: &str, shard: &ShardCoords, expected_slots: usize) -> Result<Option<TimeSeriesBuffer>, io::Error> {
        let path = Self::path_in(outdir, shard);
        if !Path::new(&path).exists() {
            return Ok(None)
        }
        let checkpoint: Checkpoint = io::read_cbor(&path)?;

        if checkpoint.format_version != FORMAT_VERSION {
            eprintln!(
                "warning: stale checkpoint {} (container format {}, current {}); recomputing",
                path, checkpoint.format_version, FORMAT_VERSION);
            return Ok(None)
        }
        if checkpoint.num_slots != expected_slots {
            eprintln!(
                "warning: stale checkpoint {} ({} diagnostic slots, current catalogue has {}); recomputing",
                path, checkpoint.num_slots, expected_slots);
            return Ok(None)
        }
        Ok(Some(checkpoint.buffer))
    }
}




/**
 * Combine the shard checkpoint files of one snapshot list into a single
 * consolidated buffer by strided interleaving. All shard files must exist
 * and agree on the slot count and shard count.
 */
pub fn merge_shards(outdir: &str, shard_count: usize) -> Result<TimeSeriesBuffer, Error> {
    let mut merged: Option<TimeSeriesBuffer> = None;

    for index in 0..shard_count {
        let shard = ShardCoords::Shard { index, count: shard_count };
        let path = Checkpoint::path_in(outdir, &shard);
        if !Path::new(&path).exists() {
            return Err(Error::MissingShard(path))
        }
        let checkpoint: Checkpoint = io::read_cbor(&path)?;

        if checkpoint.format_version != FORMAT_VERSION {
            return Err(Error::MergeFormatVersion {
                path,
                found: checkpoint.format_version,
                expected: FORMAT_VERSION,
            })
        }
        match checkpoint.shard {
            ShardCoords::Shard { count, .. } if count == shard_count => {}
            ShardCoords::Shard { count, .. } => {
                return Err(Error::MergeShardCount { path, found: count, expected: shard_count })
            }
            ShardCoords::Full => {
                return Err(Error::MergeShardCount { path, found: 1, expected: shard_count })
            }
        }

        let target = merged.get_or_insert_with(|| {
            TimeSeriesBuffer::new(checkpoint.buffer.num_slots(), checkpoint.buffer.num_radii())
        });
        if target.num_slots() != checkpoint.buffer.num_slots() {
            return Err(Error::MergeSlotCount(target.num_slots(), checkpoint.buffer.num_slots()))
        }
        target.ensure_snapshots(checkpoint.buffer.num_snapshots());
        target.merge_stride(&checkpoint.buffer, index, shard_count);
    }
    Ok(merged.expect("shard_count is positive"))
}
