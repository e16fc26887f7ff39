use anyhow::Context;
use crate::checkpoint::{Checkpoint, ShardCoords};
use crate::diagnostics::{self, EvaluationContext};
use crate::fields::{self, FloorFixup};
use crate::grid::Grid;
use crate::lookup_table::LookupTable;
use crate::regions::{self, RegimeConstants};
use crate::snapshots::Snapshot;
use crate::tasks::Tasks;
use crate::timeseries::TimeSeriesBuffer;




/**
 * Drives one run over the ordered snapshot list: decode, reconstruct,
 * classify, evaluate the catalogue, and append rows into the persistent
 * buffer. States: empty, loaded from checkpoint, extending, persisted.
 * Resuming a complete shard is a no-op; resuming a shorter checkpoint
 * reuses its rows and computes only the missing snapshot indices.
 */
pub struct TimeSeriesAccumulator<'a> {
    pub grid: &'a Grid,
    pub constants: &'a RegimeConstants,
    pub fixup: &'a FloorFixup,
    pub scale_height: Option<&'a LookupTable>,
    pub num_modes: usize,
    pub phi_range: Option<(f64, f64)>,
    pub progress_interval: usize,
}




// ============================================================================
impl<'a> TimeSeriesAccumulator<'a> {

    pub fn run(&self, snapshot_paths: &[String], outdir: &str, shard: ShardCoords) -> anyhow::Result<TimeSeriesBuffer> {
        let num_slots = diagnostics::num_slots();
        let num_radii = self.grid.num_zones[0];
        let total = snapshot_paths.len();

        let mut buffer = match Checkpoint::load(outdir, &shard, num_slots)? {
            Some(buffer) => {
                println!(
                    "loaded checkpoint {} ({} of {} snapshots computed)",
                    shard.filename(), buffer.computed_count(), total);
                buffer
            }
            None => TimeSeriesBuffer::new(num_slots, num_radii),
        };

        let owned: Vec<usize> = (0..total).filter(|&j| shard.owns(j)).collect();
        let complete = buffer.num_snapshots() >= total
            && owned.iter().all(|&j| buffer.is_computed(j));
        if complete {
            println!("checkpoint already covers every assigned snapshot; nothing to do");
            return Ok(buffer)
        }

        buffer.ensure_snapshots(total);
        let mut tasks = Tasks::new();

        for &j in owned.iter() {
            if buffer.is_computed(j) {
                continue
            }
            let path = &snapshot_paths[j];
            let snapshot = Snapshot::decode(path)
                .with_context(|| format!("while decoding snapshot {}", path))?;
            if snapshot.dims() != self.grid.num_zones {
                anyhow::bail!(
                    "snapshot {} has dimensions {:?}, but the grid is {:?}",
                    path, snapshot.dims(), self.grid.num_zones)
            }
            let fields = fields::reconstruct(self.grid, &snapshot, self.constants, self.fixup);
            let masks = regions::classify(self.grid, &fields, self.constants);
            let ctx = EvaluationContext {
                grid: self.grid,
                fields: &fields,
                masks: &masks,
                constants: self.constants,
                scale_height: self.scale_height,
                num_modes: self.num_modes,
                phi_range: self.phi_range,
            };
            let matrix = diagnostics::evaluate(&ctx);
            buffer.write_snapshot(j, snapshot.time(), &matrix);
            tasks.record_snapshot();
            tasks.report_progress(self.progress_interval, j + 1, total, snapshot.time());
        }

        Checkpoint::package(buffer.clone(), shard).write(outdir)?;
        Ok(buffer)
    }
}




/**
 * List the snapshot files of a directory in natural numeric order: the
 * ordering key is the last run of digits embedded in the file name, so
 * inconsistently zero-padded sequences still sort correctly. Checkpoint
 * containers and hidden files are excluded.
 */
pub fn natural_sorted_snapshots(dir: &str) -> anyhow::Result<Vec<String>> {
    let mut entries = Vec::new();

    for entry in std::fs::read_dir(dir).with_context(|| format!("while listing {}", dir))? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') || name.ends_with(".cbor") || name.ends_with(".tmp") {
            continue
        }
        let key = last_digit_run(&name);
        entries.push((key, name, entry.path().to_string_lossy().to_string()));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    Ok(entries.into_iter().map(|(_, _, path)| path).collect())
}

fn last_digit_run(name: &str) -> u64 {
    let mut value: u64 = 0;
    let mut current: Option<u64> = None;

    for ch in name.chars() {
        match ch.to_digit(10) {
            Some(d) => {
                current = Some(current.unwrap_or(0).saturating_mul(10).saturating_add(d as u64));
            }
            None => {
                if let Some(run) = current.take() {
                    value = run;
                }
            }
        }
    }
    current.unwrap_or(value)
}




// ============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::regions::ModelRegime;
    use crate::testutil;

    fn scratch_dir(name: &str) -> String {
        let mut path = std::env::temp_dir();
        path.push(format!("diskdiag_acc_{}_{}", std::process::id(), name));
        std::fs::create_dir_all(&path).unwrap();
        path.to_str().unwrap().to_string()
    }

    fn write_snapshots(dir: &str, grid: &Grid, times: &[f64], vtilde1: f64) -> Vec<String> {
        let mut paths = Vec::new();
        for (index, &time) in times.iter().enumerate() {
            let snapshot = testutil::uniform_snapshot(
                grid.num_zones, time, 1.0, vtilde1, [1e-4, 0.0, 0.0], true);
            let path = format!("{}/dump{}", dir, index);
            testutil::write_snapshot_file(&snapshot, &path);
            paths.push(path);
        }
        paths
    }

    fn accumulator<'a>(grid: &'a Grid, constants: &'a RegimeConstants, fixup: &'a FloorFixup) -> TimeSeriesAccumulator<'a> {
        TimeSeriesAccumulator {
            grid,
            constants,
            fixup,
            scale_height: None,
            num_modes: 4,
            phi_range: None,
            progress_interval: 100,
        }
    }

    #[test]
    fn digit_runs_order_inconsistently_padded_names() {
        let dir = scratch_dir("ordering");
        for name in ["dump10", "dump2.bin", "dump0003", "run5_dump1"].iter() {
            std::fs::write(format!("{}/{}", dir, name), b"x").unwrap();
        }
        let sorted = natural_sorted_snapshots(&dir).unwrap();
        let names: Vec<_> = sorted.iter().map(|p| p.rsplit('/').next().unwrap()).collect();
        assert_eq!(names, vec!["run5_dump1", "dump2.bin", "dump0003", "dump10"]);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[cfg(feature = "serde_cbor")]
    #[test]
    fn uniform_snapshots_yield_the_analytic_mass_flux() {
        let dir = scratch_dir("massflux");
        let grid = testutil::minkowski_grid([6, 8, 4], 2.0, 20.0, std::f64::consts::PI);
        let vtilde1 = -0.05;
        let paths = write_snapshots(&dir, &grid, &[0.0, 10.0, 20.0], vtilde1);

        let constants = ModelRegime::ThickDisk.constants();
        let fixup = FloorFixup::KeepVelocity;
        let buffer = accumulator(&grid, &constants, &fixup)
            .run(&paths, &dir, ShardCoords::Full)
            .unwrap();

        // on this metric the radial four-velocity equals the stored
        // relative velocity, so the flux integral is exactly
        // rho * vtilde1 * sum(gdet dx2 dx3) * rescale, for every row
        let (mdot_slot, _) = diagnostics::slot_range("mdot").unwrap();
        let (floor_slot, _) = diagnostics::slot_range("floor_activity").unwrap();
        let [_, dx2, dx3] = grid.cell_size;
        for snapshot in 0..3 {
            assert_eq!(buffer.time_of(snapshot), 10.0 * snapshot as f64);
            for i in 0..6 {
                let mut shell = 0.0;
                for j in 0..8 {
                    for k in 0..4 {
                        shell += grid.gdet[[i, j, k]] * dx2 * dx3;
                    }
                }
                let expected = 1.0 * vtilde1 * shell * grid.wedge_rescale();
                let actual = buffer.row(mdot_slot, snapshot)[i];
                assert!(
                    (actual - expected).abs() < 1e-6 * expected.abs(),
                    "row {} zone {}: {} vs {}", snapshot, i, actual, expected);
                // no cell crosses the magnetization threshold, so the floor
                // pass must not touch the result
                assert_eq!(buffer.row(floor_slot, snapshot)[i], 0.0);
            }
        }
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[cfg(feature = "serde_cbor")]
    #[test]
    fn resumed_run_matches_a_from_scratch_run() {
        let dir_resumed = scratch_dir("resume_a");
        let dir_fresh = scratch_dir("resume_b");
        let grid = testutil::minkowski_grid([4, 6, 2], 2.0, 20.0, 2.0 * std::f64::consts::PI);
        let paths = write_snapshots(&dir_resumed, &grid, &[0.0, 5.0, 10.0, 15.0], -0.1);

        let constants = ModelRegime::ThickDisk.constants();
        let fixup = FloorFixup::KeepVelocity;
        let acc = accumulator(&grid, &constants, &fixup);

        // first pass over a prefix, then resume over the full list
        acc.run(&paths[..2], &dir_resumed, ShardCoords::Full).unwrap();
        let resumed = acc.run(&paths, &dir_resumed, ShardCoords::Full).unwrap();
        let fresh = acc.run(&paths, &dir_fresh, ShardCoords::Full).unwrap();

        assert_eq!(resumed.data(), fresh.data());
        std::fs::remove_dir_all(&dir_resumed).unwrap();
        std::fs::remove_dir_all(&dir_fresh).unwrap();
    }

    #[cfg(feature = "serde_cbor")]
    #[test]
    fn complete_checkpoint_short_circuits_recomputation() {
        let dir = scratch_dir("idempotent");
        let grid = testutil::minkowski_grid([4, 6, 2], 2.0, 20.0, 2.0 * std::f64::consts::PI);
        let paths = write_snapshots(&dir, &grid, &[0.0, 5.0], -0.1);

        let constants = ModelRegime::ThickDisk.constants();
        let fixup = FloorFixup::KeepVelocity;
        let acc = accumulator(&grid, &constants, &fixup);
        let first = acc.run(&paths, &dir, ShardCoords::Full).unwrap();

        // deleting the snapshot files proves the second run never decodes
        for path in paths.iter() {
            std::fs::remove_file(path).unwrap();
        }
        let second = acc.run(&paths, &dir, ShardCoords::Full).unwrap();
        assert_eq!(first.data(), second.data());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[cfg(feature = "serde_cbor")]
    #[test]
    fn sharded_runs_merge_into_the_unsharded_result() {
        let dir = scratch_dir("shards");
        let grid = testutil::minkowski_grid([4, 6, 2], 2.0, 20.0, 2.0 * std::f64::consts::PI);
        let paths = write_snapshots(&dir, &grid, &[0.0, 5.0, 10.0, 15.0, 20.0], -0.1);

        let constants = ModelRegime::ThickDisk.constants();
        let fixup = FloorFixup::KeepVelocity;
        let acc = accumulator(&grid, &constants, &fixup);

        let count = 2;
        for index in 0..count {
            acc.run(&paths, &dir, ShardCoords::Shard { index, count }).unwrap();
        }
        let merged = crate::checkpoint::merge_shards(&dir, count).unwrap();

        let dir_full = scratch_dir("shards_full");
        let paths_full = write_snapshots(&dir_full, &grid, &[0.0, 5.0, 10.0, 15.0, 20.0], -0.1);
        let full = acc.run(&paths_full, &dir_full, ShardCoords::Full).unwrap();

        assert_eq!(merged.data(), full.data());
        std::fs::remove_dir_all(&dir).unwrap();
        std::fs::remove_dir_all(&dir_full).unwrap();
    }

    #[test]
    fn missing_snapshot_aborts_with_the_file_path() {
        let dir = scratch_dir("missing_file");
        let grid = testutil::minkowski_grid([4, 6, 2], 2.0, 20.0, 2.0 * std::f64::consts::PI);
        let constants = ModelRegime::ThickDisk.constants();
        let fixup = FloorFixup::KeepVelocity;
        let paths = vec![format!("{}/dump0", dir)];

        let error = accumulator(&grid, &constants, &fixup)
            .run(&paths, &dir, ShardCoords::Full)
            .unwrap_err();
        assert!(format!("{:#}", error).contains("dump0"));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
