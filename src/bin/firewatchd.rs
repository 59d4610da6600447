//! firewatchd - fire/smoke/thermal monitoring daemon
//!
//! This daemon:
//! 1. Loads configuration (file named by FIREWATCH_CONFIG, then env overrides)
//! 2. Loads the primary detector and, if present, the thermal detector
//! 3. Binds each detector's class list to its taxonomy
//! 4. Runs the frame loop until the policy stops, the stream ends, or Ctrl-C
//! 5. Appends log lines and writes capture images to the evidence store

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use firewatch::{
    load_detectors, open_source, CancelToken, EventPolicy, FilesystemEvidenceStore,
    FirewatchConfig, FusionEngine, Orchestrator, PipelineContext, PipelineError, PolicyModeKind,
    RunSummary,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (JSON, or TOML by extension).
    #[arg(long, env = "FIREWATCH_CONFIG")]
    config: Option<PathBuf>,
    /// Frame source: stub://name, an image directory, or a camera device.
    #[arg(long)]
    source: Option<String>,
    /// Policy mode: single_shot or continuous.
    #[arg(long, value_name = "MODE")]
    mode: Option<PolicyModeKind>,
    /// Critical threshold in percent (continuous mode).
    #[arg(long)]
    critical_threshold: Option<u8>,
    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,
}

impl Args {
    fn apply(&self, cfg: &mut FirewatchConfig) {
        if let Some(source) = &self.source {
            cfg.source.uri = source.clone();
        }
        if let Some(mode) = self.mode {
            cfg.policy.mode = mode;
        }
        if let Some(threshold) = self.critical_threshold {
            cfg.policy.critical_threshold = threshold;
        }
        if let Some(max_frames) = self.max_frames {
            cfg.source.max_frames = Some(max_frames);
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let cfg = load_config(&args).map_err(report)?;

    log::info!(
        "firewatchd {} starting: source={} mode={:?} evidence={}",
        env!("CARGO_PKG_VERSION"),
        cfg.source.uri,
        cfg.policy.policy_mode(),
        cfg.evidence.dir.display()
    );

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        handler_token.cancel();
    })
    .expect("error setting Ctrl-C handler");

    let summary = run(&cfg, cancel)?;
    if !summary.captures.is_empty() {
        log::info!("captures written: {}", summary.captures.join(", "));
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<FirewatchConfig, PipelineError> {
    let to_config_err = |e: anyhow::Error| PipelineError::Config(format!("{:#}", e));
    let mut cfg = FirewatchConfig::load_with(args.config.as_deref()).map_err(to_config_err)?;
    args.apply(&mut cfg);
    cfg.validate().map_err(to_config_err)?;
    Ok(cfg)
}

fn run(cfg: &FirewatchConfig, cancel: CancelToken) -> Result<RunSummary, PipelineError> {
    let mut detectors =
        load_detectors(cfg.primary_model.as_ref(), cfg.thermal_model.as_ref()).map_err(report)?;
    let fusion = FusionEngine::bind(&detectors, &cfg.primary_taxonomy, &cfg.thermal_taxonomy)
        .map_err(report)?;
    let store = FilesystemEvidenceStore::open(&cfg.evidence)
        .map_err(|e| report(PipelineError::Evidence(format!("{:#}", e))))?;
    let mut source = open_source(&cfg.source).map_err(report)?;

    let policy = EventPolicy::new(cfg.policy.policy_mode());
    let mut orchestrator = Orchestrator::new(PipelineContext::new(fusion, policy, store, cancel));
    orchestrator.run(source.as_mut(), &mut detectors)
}

/// Setup failures are reported here; the orchestrator reports its own.
fn report(err: PipelineError) -> PipelineError {
    log::error!("[{}] {}", err.component(), err);
    err
}
