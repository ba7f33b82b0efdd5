use crate::gate::ConnectionGate;
use crate::recorder::{RecorderError, RecorderHandle};
use rollcall_core::{
    decode_frame, AttendanceRecord, EncoderError, FaceEncoder, FaceMatcher, FrameError,
};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("encoder error: {0}")]
    Encoder(#[from] EncoderError),
    #[error("recorder error: {0}")]
    Recorder(#[from] RecorderError),
    #[error("failed to spawn frame worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Shared state every frame worker reads.
pub struct WorkerContext {
    pub gate: Arc<ConnectionGate>,
    pub matcher: FaceMatcher,
    pub recorder: RecorderHandle,
}

/// One frame waiting for a worker, plus where to announce new records.
pub struct FrameJob {
    pub payload: String,
    pub recognized: mpsc::UnboundedSender<AttendanceRecord>,
}

/// Why a frame was not queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejected {
    Disconnected,
    QueueFull,
    Closed,
}

/// Clone-safe entry point to the frame workers.
#[derive(Clone)]
pub struct FramePipeline {
    tx: mpsc::Sender<FrameJob>,
    gate: Arc<ConnectionGate>,
}

impl FramePipeline {
    /// Queue a frame without waiting. When every worker is busy and the queue
    /// is full the frame is dropped; frames are perishable.
    pub fn submit(&self, job: FrameJob) -> Result<(), Rejected> {
        if !self.gate.is_connected() {
            return Err(Rejected::Disconnected);
        }
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => Rejected::QueueFull,
            mpsc::error::TrySendError::Closed(_) => Rejected::Closed,
        })
    }
}

/// Spawn one OS thread per encoder, all pulling from a single bounded queue.
///
/// ONNX sessions are not shareable across threads, so each worker owns the
/// encoder it was given.
pub fn spawn_workers(
    encoders: Vec<Box<dyn FaceEncoder>>,
    ctx: WorkerContext,
    queue_depth: usize,
) -> Result<FramePipeline, EngineError> {
    let (tx, rx) = mpsc::channel::<FrameJob>(queue_depth.max(1));
    let rx = Arc::new(Mutex::new(rx));
    let gate = Arc::clone(&ctx.gate);
    let ctx = Arc::new(ctx);

    for (n, mut encoder) in encoders.into_iter().enumerate() {
        let rx = Arc::clone(&rx);
        let ctx = Arc::clone(&ctx);
        std::thread::Builder::new()
            .name(format!("rollcall-worker-{n}"))
            .spawn(move || {
                tracing::info!(worker = n, "frame worker started");
                loop {
                    let job = rx.lock().unwrap_or_else(|e| e.into_inner()).blocking_recv();
                    let Some(job) = job else { break };

                    match process_frame(encoder.as_mut(), &ctx, &job.payload) {
                        Ok(created) => {
                            for record in created {
                                // The connection may already be gone; the record stands regardless.
                                let _ = job.recognized.send(record);
                            }
                        }
                        Err(EngineError::Frame(e)) => {
                            tracing::debug!(worker = n, error = %e, "undecodable frame dropped");
                        }
                        Err(e) => {
                            tracing::warn!(worker = n, error = %e, "frame processing failed");
                        }
                    }
                }
                tracing::info!(worker = n, "frame worker exiting");
            })?;
    }

    Ok(FramePipeline { tx, gate })
}

/// Detect, match, and record every face in one frame.
///
/// Returns the records this frame created. The gate is checked before the
/// expensive work and again by the recorder as part of each mark, so nothing
/// is recorded once the client has gone.
pub fn process_frame(
    encoder: &mut dyn FaceEncoder,
    ctx: &WorkerContext,
    payload: &str,
) -> Result<Vec<AttendanceRecord>, EngineError> {
    if !ctx.gate.is_connected() {
        return Ok(Vec::new());
    }

    let image = decode_frame(payload)?;
    let encodings = encoder.encode(&image)?;
    tracing::trace!(faces = encodings.len(), "frame encoded");

    let mut created = Vec::new();
    for encoding in &encodings {
        let Some(identity) = ctx.matcher.find(&encoding.embedding) else {
            continue;
        };
        let Some(marked) = ctx.recorder.blocking_mark_if_connected(&ctx.gate, identity.clone())?
        else {
            break;
        };
        if marked.created {
            created.push(marked.record);
        }
    }
    Ok(created)
}
