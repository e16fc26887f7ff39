/**
 * Relativistic disk diagnostics pipeline
 */




// ============================================================================
mod accumulator;
mod app;
mod checkpoint;
mod diagnostics;
mod fields;
mod grid;
mod integrate;
mod io;
mod lookup_table;
mod regions;
mod snapshots;
mod tasks;
mod timeseries;

#[cfg(test)]
mod testutil;




// ============================================================================
use accumulator::TimeSeriesAccumulator;
use app::App;
use checkpoint::{Checkpoint, ShardCoords};
use grid::Grid;




// ============================================================================
fn parse_shard(args: &[String]) -> anyhow::Result<ShardCoords> {
    match args {
        [] => Ok(ShardCoords::Full),
        [index, count] => {
            let shard = ShardCoords::Shard {
                index: index.parse()?,
                count: count.parse()?,
            };
            shard.validate()?;
            Ok(shard)
        }
        _ => anyhow::bail!("expected either no shard arguments or an index-count pair"),
    }
}




// ============================================================================
fn run(input: &str, shard_args: &[String]) -> anyhow::Result<()> {
    let app = App::from_preset_or_file(input)?.validate()?;
    let scale_height = app.load_scale_height()?;
    let config = app.config;
    let shard = parse_shard(shard_args)?;
    let constants = config.regime.constants();

    println!();
    println!("\t{}", app::DESCRIPTION);
    println!("\t{}", app::VERSION_AND_BUILD);
    println!();
    println!("\tinput file ........ {}", input);
    println!("\tgrid .............. {}", config.grid_path);
    println!("\tsnapshots ......... {}", config.snapshot_dir);
    println!("\toutput directory .. {}", config.output_dir);
    println!("\tshard ............. {}", shard.filename());
    println!("\taveraging window .. [{}, {}]", constants.averaging_window[0], constants.averaging_window[1]);
    println!();

    let grid = Grid::load(&config.grid_path)?;
    grid.validate()?;

    let snapshot_paths = accumulator::natural_sorted_snapshots(&config.snapshot_dir)?;
    if snapshot_paths.is_empty() {
        anyhow::bail!("no snapshot files in {}", config.snapshot_dir)
    }
    println!("\tfound {} snapshot files", snapshot_paths.len());

    std::fs::create_dir_all(&config.output_dir)?;

    let pipeline = TimeSeriesAccumulator {
        grid: &grid,
        constants: &constants,
        fixup: &config.floor_fixup,
        scale_height: scale_height.as_ref(),
        num_modes: config.control.num_modes,
        phi_range: config.control.phi_range,
        progress_interval: config.control.progress_interval,
    };
    pipeline.run(&snapshot_paths, &config.output_dir, shard)?;
    Ok(())
}




// ============================================================================
fn merge(input: &str, count_arg: &str) -> anyhow::Result<()> {
    let App { config, .. } = App::from_preset_or_file(input)?.validate()?;
    let shard_count: usize = count_arg.parse()?;
    if shard_count == 0 {
        anyhow::bail!("shard count must be positive")
    }

    let merged = checkpoint::merge_shards(&config.output_dir, shard_count)?;
    println!(
        "merged {} shard files covering {} snapshots",
        shard_count, merged.computed_count());
    Checkpoint::package(merged, ShardCoords::Full).write(&config.output_dir)?;
    Ok(())
}




// ============================================================================
fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.as_slice() {
        [] => anyhow::bail!("usage: diskdiag <config.yaml|preset> [shard_index shard_count] | diskdiag merge <config.yaml|preset> <shard_count>"),
        [command, input, count] if command == "merge" => merge(input, count),
        [input, rest @ ..] => run(input, rest),
    }
}
