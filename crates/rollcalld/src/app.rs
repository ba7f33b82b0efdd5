//! Transport-independent daemon behavior. The socket layer in `server`
//! translates connection events and requests into calls on [`App`].

use crate::engine::{FrameJob, FramePipeline, Rejected};
use crate::gate::ConnectionGate;
use crate::publisher::{PublishOutcome, PublishTrigger, Publisher};
use crate::recorder::{RecorderError, RecorderHandle};
use rollcall_core::AttendanceRecord;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadResponse {
    pub status: &'static str,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusResponse {
    pub session_id: String,
    pub started_at: String,
    pub connected: bool,
    pub recognized: usize,
    pub uploaded: bool,
    pub roster_size: usize,
}

pub struct App {
    gate: Arc<ConnectionGate>,
    recorder: RecorderHandle,
    publisher: Arc<Publisher>,
    pipeline: FramePipeline,
    roster_size: usize,
    session_id: String,
}

impl App {
    pub fn new(
        gate: Arc<ConnectionGate>,
        recorder: RecorderHandle,
        publisher: Arc<Publisher>,
        pipeline: FramePipeline,
        roster_size: usize,
        session_id: String,
    ) -> Self {
        Self {
            gate,
            recorder,
            publisher,
            pipeline,
            roster_size,
            session_id,
        }
    }

    pub fn on_connect(&self) {
        if self.gate.set_connected(true) {
            tracing::warn!("capture client connected while another is attached");
        }
        tracing::info!(session_id = %self.session_id, "capture client connected");
    }

    /// Close the gate and publish what has been recorded so far.
    pub async fn on_disconnect(&self) -> PublishOutcome {
        self.gate.set_connected(false);
        tracing::info!(session_id = %self.session_id, "capture client disconnected");
        self.publisher.publish(PublishTrigger::Disconnect).await
    }

    /// Hand a frame to the workers. Newly created records are sent on
    /// `recognized` once the frame has been processed.
    pub fn on_frame(
        &self,
        image: String,
        recognized: mpsc::UnboundedSender<AttendanceRecord>,
    ) -> Result<(), Rejected> {
        let result = self.pipeline.submit(FrameJob {
            payload: image,
            recognized,
        });
        match result {
            Err(Rejected::QueueFull) => tracing::debug!("frame queue full; frame dropped"),
            Err(Rejected::Disconnected) => tracing::debug!("frame while disconnected; ignored"),
            Err(Rejected::Closed) => tracing::error!("frame workers have exited"),
            Ok(()) => {}
        }
        result
    }

    /// Explicit publish request. The response does not depend on the outcome,
    /// which is logged by the publisher.
    pub async fn upload(&self) -> UploadResponse {
        self.publisher.publish(PublishTrigger::Manual).await;
        UploadResponse {
            status: "uploaded",
            session_id: self.session_id.clone(),
        }
    }

    pub async fn status(&self) -> Result<StatusResponse, RecorderError> {
        let snapshot = self.recorder.snapshot().await?;
        Ok(StatusResponse {
            session_id: snapshot.session_id,
            started_at: snapshot.started_at.to_rfc3339(),
            connected: self.gate.is_connected(),
            recognized: snapshot.records.len(),
            uploaded: snapshot.uploaded,
            roster_size: self.roster_size,
        })
    }

    /// Final publish, run once the server has stopped accepting work.
    pub async fn shutdown(&self) -> PublishOutcome {
        self.gate.set_connected(false);
        let outcome = self.publisher.publish(PublishTrigger::Shutdown).await;
        match &outcome {
            PublishOutcome::Published { records } => {
                tracing::info!(session_id = %self.session_id, records, "final attendance published")
            }
            PublishOutcome::Empty => {
                tracing::info!(session_id = %self.session_id, "nothing recorded this session")
            }
            PublishOutcome::Failed(reason) => tracing::warn!(
                session_id = %self.session_id,
                %reason,
                "final publish failed; attendance remains in the local log"
            ),
        }
        outcome
    }
}
