//! Replays a tracker dump through the counting engine.
//!
//! Each line of the dump is `<frame_index>:<json array of detections>`, e.g.
//! `12:[{"id":3,"x":560.0,"y":400.0,"w":40.0,"h":90.0,"p":0.87}]`.

use std::collections::HashSet;
use std::io::BufRead;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use crossline::{
    CalibrationConfig, ConfigStore, CountPolicy, CountingEngine, CurveModel, Detection,
    EngineConfig, Frame,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "crossline=info,replay=info";

#[derive(Parser, Debug)]
#[command(author, version, about = "Count curve crossings in a tracker dump", long_about = None)]
struct Args {
    /// Tracker dump, one frame per line
    dump: PathBuf,

    /// Curve config; created on first run
    #[arg(short, long, default_value = "config/curve_config.json")]
    config: PathBuf,

    /// Curve points used when the config does not exist yet: "x,y;x,y;..."
    #[arg(long)]
    curve: Option<String>,

    /// Samples collected before orientation is decided
    #[arg(long, default_value_t = 300)]
    max_samples: usize,

    /// Crossings needed to trust the automatic orientation
    #[arg(long, default_value_t = 1)]
    min_crossings: usize,

    /// Refuse to calibrate on one-directional traffic
    #[arg(long)]
    require_balance: bool,

    /// Distance past the curve needed to switch sides (0 disables)
    #[arg(long, default_value_t = 0.0)]
    dead_band: f32,

    /// Count every track at most once
    #[arg(long)]
    once: bool,
}

fn parse_curve(s: &str) -> Result<CurveModel> {
    let mut pairs: Vec<[f32; 2]> = Vec::new();
    for pt in s.split(';').filter(|p| !p.trim().is_empty()) {
        let (x, y) = pt
            .split_once(',')
            .with_context(|| format!("bad curve point `{}`", pt))?;
        pairs.push([x.trim().parse::<f32>()?, y.trim().parse::<f32>()?]);
    }

    Ok(CurveModel::from_pairs(&pairs)?)
}

fn parse_line(line: &str) -> Result<Frame> {
    let (idx, dets) = line.split_once(':').context("expected `:`")?;
    let frame_index: u64 = idx.trim().parse().context("parse frame index failed")?;
    let dets: Vec<Detection> = serde_json::from_str(dets).context("parse json failed")?;

    Ok(Frame::from_detections(frame_index, &dets))
}

/// `RUST_LOG` when set and valid, otherwise the default filter.
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn main() -> Result<()> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(rust_log.as_deref()))
        .init();

    let args = Args::parse();

    let config = EngineConfig {
        calibration: CalibrationConfig {
            max_samples: args.max_samples,
            min_crossings: args.min_crossings,
            require_balance: args.require_balance,
            ..Default::default()
        },
        dead_band: args.dead_band,
        policy: if args.once {
            CountPolicy::Once
        } else {
            CountPolicy::EveryCrossing
        },
        ..Default::default()
    };

    let store = ConfigStore::new(&args.config);
    let mut engine = match args.curve.as_deref() {
        Some(curve) => CountingEngine::from_store_or_new(&store, parse_curve(curve)?, config)?,
        None if !store.exists() => {
            bail!("{} does not exist, pass --curve", args.config.display())
        }
        None => CountingEngine::from_store(&store, config)?,
    };

    let file = std::fs::File::open(&args.dump)
        .with_context(|| format!("failed to open {}", args.dump.display()))?;

    let mut active: HashSet<u64> = HashSet::new();

    for (lineno, line) in std::io::BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let frame = match parse_line(&line) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(line = lineno + 1, "wrong file format: {:#}", e);
                continue;
            }
        };

        // tracks missing from this frame are gone
        let seen: HashSet<u64> = frame.track_ids().collect();
        for gone in active.difference(&seen) {
            engine.remove_track(*gone);
        }
        active = seen;

        for event in engine.process_frame(&frame) {
            info!(
                frame = frame.frame_index,
                track = event.track_id,
                "{}",
                event.direction.as_str()
            );
        }

        if engine.persist(&store)? {
            info!(status = ?engine.status(), "orientation saved");
        }
    }

    let counters = engine.counters();
    println!("IN: {}", counters.in_count);
    println!("OUT: {}", counters.out_count);

    if !engine.status().is_counting() {
        warn!(status = ?engine.status(), "orientation was never determined, nothing counted");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter() {
        assert_eq!(
            log_filter(None).to_string(),
            EnvFilter::new(DEFAULT_LOG_FILTER).to_string()
        );
        assert!(log_filter(Some("crossline=debug"))
            .to_string()
            .contains("crossline=debug"));
    }

    #[test]
    fn test_parse_curve() {
        let curve = parse_curve("0,0; 10,0;").unwrap();
        assert_eq!(curve.to_pairs(), vec![[0.0, 0.0], [10.0, 0.0]]);
        assert!(parse_curve("0,0").is_err());
        assert!(parse_curve("0;1,1").is_err());
    }
}
