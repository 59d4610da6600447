//! Per-frame control loop.
//!
//! Each iteration reads one frame, runs the primary then the thermal
//! detector, fuses, annotates, evaluates the policy and persists what the
//! policy asks for. The loop ends on a policy stop, on cancellation (polled
//! once per iteration, after persistence) or at end of stream. Any other
//! failure is fatal and is returned with the failing component.

mod cancel;

pub use cancel::{CancelToken, Clock, SystemClock};

use crate::detect::{DetectorSource, Detectors, RawDetection};
use crate::error::{chain, PipelineError};
use crate::evidence::EvidenceStore;
use crate::frame::Frame;
use crate::fusion::FusionEngine;
use crate::ingest::FrameSource;
use crate::policy::{EventPolicy, PolicyStatus, Verdict};
use crate::render::annotate;

/// Why a run ended without error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    PolicyStop,
    Cancelled,
    EndOfStream,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub frames_processed: u64,
    pub log_records: u64,
    /// Storage keys of every capture written, in order.
    pub captures: Vec<String>,
    /// Critical detections whose capture the cooldown withheld.
    pub suppressed: u64,
    pub stop_reason: StopReason,
}

impl RunSummary {
    fn new() -> Self {
        Self {
            frames_processed: 0,
            log_records: 0,
            captures: Vec::new(),
            suppressed: 0,
            stop_reason: StopReason::EndOfStream,
        }
    }
}

/// Everything the loop needs besides the source and the detectors.
pub struct PipelineContext<S: EvidenceStore> {
    pub fusion: FusionEngine,
    pub policy: EventPolicy,
    pub store: S,
    pub cancel: CancelToken,
    pub clock: Box<dyn Clock>,
}

impl<S: EvidenceStore> PipelineContext<S> {
    pub fn new(fusion: FusionEngine, policy: EventPolicy, store: S, cancel: CancelToken) -> Self {
        Self {
            fusion,
            policy,
            store,
            cancel,
            clock: Box::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

pub struct Orchestrator<S: EvidenceStore> {
    ctx: PipelineContext<S>,
}

impl<S: EvidenceStore> Orchestrator<S> {
    pub fn new(ctx: PipelineContext<S>) -> Self {
        Self { ctx }
    }

    pub fn policy(&self) -> &EventPolicy {
        &self.ctx.policy
    }

    pub fn store(&self) -> &S {
        &self.ctx.store
    }

    pub fn into_store(self) -> S {
        self.ctx.store
    }

    /// Drive `source` until a stop condition or a fatal error.
    ///
    /// The source is closed and the store flushed on every exit path.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        detectors: &mut Detectors,
    ) -> Result<RunSummary, PipelineError> {
        let result = self.drive(source, detectors);
        source.close();
        let flushed = self
            .ctx
            .store
            .flush()
            .map_err(|e| PipelineError::Evidence(chain(&e)));

        match (result, flushed) {
            (Ok(summary), Ok(())) => {
                log::info!(
                    "run finished ({:?}): {} frames, {} log records, {} captures, {} suppressed",
                    summary.stop_reason,
                    summary.frames_processed,
                    summary.log_records,
                    summary.captures.len(),
                    summary.suppressed
                );
                Ok(summary)
            }
            (Err(err), _) | (Ok(_), Err(err)) => {
                log::error!("[{}] {}", err.component(), err);
                Err(err)
            }
        }
    }

    fn drive(
        &mut self,
        source: &mut dyn FrameSource,
        detectors: &mut Detectors,
    ) -> Result<RunSummary, PipelineError> {
        let mut summary = RunSummary::new();
        if self.ctx.policy.status() == PolicyStatus::Stopped {
            summary.stop_reason = if self.ctx.policy.state().stop_requested {
                StopReason::PolicyStop
            } else {
                StopReason::Cancelled
            };
            log::info!(
                "policy already stopped ({:?}); not reading {}",
                summary.stop_reason,
                source.name()
            );
            return Ok(summary);
        }
        if detectors.thermal.is_some() && !self.ctx.fusion.has_thermal() {
            log::warn!("thermal detector loaded without a bound taxonomy; its output is ignored");
        }

        loop {
            let mut frame = match source.read() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    log::info!("{}: end of stream", source.name());
                    summary.stop_reason = StopReason::EndOfStream;
                    break;
                }
                Err(err) => {
                    return Err(PipelineError::FrameRead {
                        device: source.name().to_string(),
                        frame: summary.frames_processed + 1,
                        reason: chain(&err),
                    })
                }
            };

            let (primary, thermal) = detect_all(detectors, &frame)?;
            let batch = self
                .ctx
                .fusion
                .fuse(frame.seq(), &primary, thermal.as_deref());

            for annotation in annotate(&mut frame, &batch) {
                log::debug!("frame {}: {}", frame.seq(), annotation.label);
            }

            let now = self.ctx.clock.now();
            let verdict = self.ctx.policy.evaluate(&batch, &frame, now);
            summary.frames_processed += 1;

            let stop = self.persist(verdict, &mut summary)?;
            if stop {
                log::info!("policy requested stop after frame {}", frame.seq());
                summary.stop_reason = StopReason::PolicyStop;
                break;
            }

            if self.ctx.cancel.is_cancelled() {
                log::info!("cancelled after frame {}", frame.seq());
                self.ctx.policy.cancel();
                summary.stop_reason = StopReason::Cancelled;
                break;
            }
        }

        Ok(summary)
    }

    /// Write the verdict's records and captures. Returns the stop flag.
    fn persist(&mut self, verdict: Verdict, summary: &mut RunSummary) -> Result<bool, PipelineError> {
        for record in &verdict.log_records {
            self.ctx
                .store
                .append_log(record)
                .map_err(|e| PipelineError::Evidence(chain(&e)))?;
            summary.log_records += 1;
        }
        for capture in &verdict.captures {
            let key = self
                .ctx
                .store
                .save_capture(capture)
                .map_err(|e| PipelineError::Evidence(chain(&e)))?;
            log::warn!(
                "{} detected at {}%: captured {}",
                capture.class_role,
                capture.confidence_percent,
                key
            );
            summary.captures.push(key);
        }
        summary.suppressed += verdict.suppressed as u64;
        Ok(verdict.stop)
    }
}

/// Run primary then thermal. A failure in either discards both results.
fn detect_all(
    detectors: &mut Detectors,
    frame: &Frame,
) -> Result<(Vec<RawDetection>, Option<Vec<RawDetection>>), PipelineError> {
    let inference = |role: DetectorSource, err: anyhow::Error| PipelineError::Inference {
        role,
        frame: frame.seq(),
        reason: chain(&err),
    };

    let primary = detectors
        .primary
        .detect(frame)
        .map_err(|e| inference(DetectorSource::Primary, e))?;
    let thermal = match detectors.thermal.as_mut() {
        Some(detector) => Some(
            detector
                .detect(frame)
                .map_err(|e| inference(DetectorSource::Thermal, e))?,
        ),
        None => None,
    };
    Ok((primary, thermal))
}
