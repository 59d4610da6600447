//! demo - end-to-end synthetic run with scripted detectors

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;

use firewatch::detect::ScriptedBackend;
use firewatch::evidence::EvidenceSettings;
use firewatch::{
    open_source, BoundingBox, CancelToken, Detectors, EventPolicy, FilesystemEvidenceStore,
    FusionEngine, Orchestrator, PipelineContext, PolicyMode, PolicyModeKind, RawDetection,
    SourceSettings, TaxonomyPolicy,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Number of synthetic frames.
    #[arg(long, default_value_t = 20)]
    frames: u64,
    /// Policy mode: single_shot or continuous.
    #[arg(long, default_value = "continuous", value_name = "MODE")]
    mode: PolicyModeKind,
    /// Critical threshold in percent (continuous mode).
    #[arg(long, default_value_t = 80)]
    threshold: u8,
    /// Output directory for cap.txt and captures/.
    #[arg(long, default_value = "demo_out")]
    out: String,
}

fn scripted(class_id: u32, confidence: f32, x: f32, y: f32) -> RawDetection {
    RawDetection {
        class_id,
        confidence,
        bbox: BoundingBox::new(x, y, x + 96.0, y + 72.0),
    }
}

/// Fire at frame 5 (both models), low-confidence smoke at 8, a stray
/// non-fire class at 12 and strong smoke at 15.
fn demo_detectors() -> Detectors {
    let primary = ScriptedBackend::new(["fire", "smoke", "person"])
        .with_frame(5, vec![scripted(0, 0.92, 120.0, 80.0)])
        .with_frame(8, vec![scripted(1, 0.41, 300.0, 40.0)])
        .with_frame(12, vec![scripted(2, 0.95, 40.0, 200.0)])
        .with_frame(
            15,
            vec![
                scripted(1, 0.83, 280.0, 60.0),
                scripted(0, 0.79, 130.0, 90.0),
            ],
        );
    let thermal = ScriptedBackend::new(["fire_thermal"])
        .with_frame(5, vec![scripted(0, 0.5, 118.0, 84.0)]);
    Detectors {
        primary: Box::new(primary),
        thermal: Some(Box::new(thermal)),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.threshold > 100 {
        return Err(anyhow!("threshold must be within 0-100"));
    }

    let out_dir = PathBuf::from(&args.out);
    let evidence = EvidenceSettings {
        dir: out_dir.join("captures"),
        log_path: out_dir.join("cap.txt"),
    };
    let store = FilesystemEvidenceStore::open(&evidence).context("open demo evidence store")?;

    let mut detectors = demo_detectors();
    let fusion = FusionEngine::bind(
        &detectors,
        &TaxonomyPolicy::default_primary(),
        &TaxonomyPolicy::default_thermal(),
    )?;
    let mode = match args.mode {
        PolicyModeKind::SingleShot => PolicyMode::SingleShot,
        PolicyModeKind::Continuous => PolicyMode::Continuous {
            critical_threshold: args.threshold,
            cooldown: None,
        },
    };

    let mut source = open_source(&SourceSettings {
        uri: "stub://demo".to_string(),
        max_frames: Some(args.frames),
        ..SourceSettings::default()
    })?;

    let mut orchestrator = Orchestrator::new(PipelineContext::new(
        fusion,
        EventPolicy::new(mode),
        store,
        CancelToken::new(),
    ));
    let summary = orchestrator.run(source.as_mut(), &mut detectors)?;

    println!("demo summary:");
    println!("  frames processed: {}", summary.frames_processed);
    println!("  log records written: {}", summary.log_records);
    println!("  captures written: {}", summary.captures.len());
    for key in &summary.captures {
        println!("    {}", key);
    }
    println!("  stop reason: {:?}", summary.stop_reason);
    println!("  output: {}", out_dir.display());
    Ok(())
}
