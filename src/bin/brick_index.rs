//! Brick index inspector - loads a tilebase manifest and summarizes or queries it.
//!
//! Usage: cargo run --release --bin brick_index -- --manifest <PATH> [OPTIONS]
//!
//! Options:
//!   --manifest <PATH>      Manifest file (tilebase.cache.yml)
//!   --resolution <UM>      Resolution level to query (default: finest)
//!   --nearest <X,Y,Z>      Report the brick nearest to a stage position in micrometers
//!   --containing           With --nearest, only consider bricks containing the point
//!   --load                 With --nearest, load the brick payload and print its stats
//!   --channel <N>          Channel to load (default: from config)
//!   --no-check-base        Do not require the base path to exist
//!   --json                 Print the summary as JSON
//!
//! Environment: VOLBRICK_RESOLUTION_TOLERANCE, VOLBRICK_COMPRESSED and
//! VOLBRICK_PATH_REMAP override the build configuration.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use serde_json::json;

use volbrick::core::types::DVec3;
use volbrick::core::{logging, SourceConfig};
use volbrick::streaming::{LoadState, SourceLoader};
use volbrick::volume::{BrickDescriptor, BrickIndex, VolumeBrickSource, VoxelData};

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    let args: Vec<String> = std::env::args().collect();
    let Some(manifest) = parse_str_arg(&args, "--manifest").map(PathBuf::from) else {
        eprintln!("Usage: brick_index --manifest <PATH> [--resolution <UM>] [--nearest <X,Y,Z>] [--json]");
        return ExitCode::FAILURE;
    };
    let resolution = parse_f64_arg(&args, "--resolution");
    let nearest = parse_str_arg(&args, "--nearest").map(|s| parse_point(&s));
    let containing = has_flag(&args, "--containing");
    let load = has_flag(&args, "--load");
    let as_json = has_flag(&args, "--json");

    let mut config = SourceConfig::from_env();
    if has_flag(&args, "--no-check-base") {
        config.check_base_path = false;
    }
    let channel = parse_usize_arg(&args, "--channel").unwrap_or(config.default_channel);

    let start = Instant::now();
    let loader = SourceLoader::spawn(&manifest, config);
    let mut states = loader.subscribe();
    while states.changed().await.is_ok() {
        if let LoadState::Parsing(p) = *states.borrow_and_update() {
            log::debug!("Loading manifest: {}%", p);
        }
    }
    let source = match loader.wait().await {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Failed to load {}: {}", manifest.display(), e);
            return ExitCode::FAILURE;
        }
    };
    let load_time = start.elapsed();

    let bounds = source.bounding_volume();
    let levels: Vec<_> = source
        .available_resolutions()
        .into_iter()
        .filter_map(|r| source.brick_index_for_resolution(r).map(|index| (r, index)))
        .collect();

    if as_json {
        let summary = json!({
            "manifest": manifest.display().to_string(),
            "base_path": source.base_path().display().to_string(),
            "tiles": source.tile_count(),
            "load_ms": load_time.as_millis() as u64,
            "bounds": {
                "min": bounds.min.to_array(),
                "max": bounds.max.to_array(),
            },
            "levels": levels.iter().map(|(r, index)| json!({
                "resolution_um": r,
                "bricks": index.member_count(),
                "indexed": index.len(),
            })).collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Failed to serialize summary: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        println!("=== Volume Brick Index ===");
        println!("Manifest: {}", manifest.display());
        println!("Base:     {}", source.base_path().display());
        println!("Tiles:    {} (loaded in {:.2}s)", source.tile_count(), load_time.as_secs_f32());
        println!("Bounds:   {:?} .. {:?} um", bounds.min, bounds.max);
        for (r, index) in &levels {
            println!("  {:>10.4} um/voxel  {:>7} bricks", r, index.member_count());
        }
    }

    let Some(query) = nearest else {
        return ExitCode::SUCCESS;
    };
    let Some(point) = query else {
        eprintln!("--nearest expects X,Y,Z");
        return ExitCode::FAILURE;
    };

    let level = resolution.or_else(|| levels.first().map(|(r, _)| *r));
    let Some(index) = level.and_then(|r| source.brick_index_for_resolution(r)) else {
        eprintln!("No resolution level matches {:?}", level);
        return ExitCode::FAILURE;
    };

    match report_nearest(index, point, containing, load.then_some(channel)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn report_nearest(index: &BrickIndex, point: DVec3, containing: bool, load_channel: Option<usize>) -> volbrick::core::Result<()> {
    let hit = if containing {
        index.nearest_containing(point)
    } else {
        index.nearest_brick(point)
    };
    let Some(brick) = hit else {
        println!("No brick near {:?}", point);
        return Ok(());
    };

    let centroid = brick.centroid();
    println!();
    println!("Nearest brick: {}", brick.key());
    println!("  centroid {:?} ({:.2} um away)", centroid, centroid.distance(point));
    println!("  raster   {:?} x {} channels", brick.raster_dimensions(), brick.channel_count());

    let Some(channel) = load_channel else {
        return Ok(());
    };
    let start = Instant::now();
    let buffer = brick.load_payload(10.0, channel)?;
    let (mean, max) = match &buffer.data {
        VoxelData::U8(v) => intensity_stats(v.iter().map(|&s| s as u16)),
        VoxelData::U16(v) => intensity_stats(v.iter().copied()),
    };
    println!(
        "  channel {}: {} voxels, mean {:.1}, max {}, padding {:?} ({:.1}ms)",
        channel,
        buffer.voxel_count(),
        mean,
        max,
        buffer.edge_padding,
        start.elapsed().as_secs_f32() * 1000.0
    );
    Ok(())
}

fn intensity_stats(samples: impl Iterator<Item = u16>) -> (f64, u16) {
    let (count, sum, max) = samples.fold((0usize, 0f64, 0u16), |(n, sum, max), v| (n + 1, sum + v as f64, max.max(v)));
    (sum / count.max(1) as f64, max)
}

fn parse_point(text: &str) -> Option<DVec3> {
    let parts: Vec<f64> = text.split(',').map(|s| s.trim().parse().ok()).collect::<Option<_>>()?;
    match parts.as_slice() {
        [x, y, z] => Some(DVec3::new(*x, *y, *z)),
        _ => None,
    }
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn parse_f64_arg(args: &[String], flag: &str) -> Option<f64> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_usize_arg(args: &[String], flag: &str) -> Option<usize> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
