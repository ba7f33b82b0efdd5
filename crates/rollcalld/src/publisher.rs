//! Full-snapshot publishing of the session to the aggregate store.

use crate::recorder::RecorderHandle;
use crate::store::{AggregateStore, AttendanceDocument, RemoteEntry, StoreError};
use rollcall_core::SessionSnapshot;
use std::sync::Arc;
use std::time::Duration;

/// What asked for a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishTrigger {
    Disconnect,
    Manual,
    Shutdown,
}

impl std::fmt::Display for PublishTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PublishTrigger::Disconnect => write!(f, "disconnect"),
            PublishTrigger::Manual => write!(f, "manual"),
            PublishTrigger::Shutdown => write!(f, "shutdown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Published { records: usize },
    /// Nothing recorded yet; the store was not contacted.
    Empty,
    Failed(String),
}

/// Sends the whole current record set to the store as one overwrite.
///
/// Publishes are serialized so a slow, older snapshot can never land after
/// a newer one.
pub struct Publisher {
    recorder: RecorderHandle,
    store: Arc<dyn AggregateStore>,
    timeout: Duration,
    in_flight: tokio::sync::Mutex<()>,
}

impl Publisher {
    pub fn new(
        recorder: RecorderHandle,
        store: Arc<dyn AggregateStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            recorder,
            store,
            timeout,
            in_flight: tokio::sync::Mutex::new(()),
        }
    }

    /// One attempt, no retry. Failures are logged and reported, never raised.
    pub async fn publish(&self, trigger: PublishTrigger) -> PublishOutcome {
        let _guard = self.in_flight.lock().await;

        let snapshot = match self.recorder.snapshot().await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(%trigger, error = %e, "cannot snapshot session for publish");
                return PublishOutcome::Failed(e.to_string());
            }
        };

        if snapshot.is_empty() {
            tracing::debug!(
                %trigger,
                session_id = %snapshot.session_id,
                "nothing recorded; publish skipped"
            );
            return PublishOutcome::Empty;
        }

        let document = attendance_document(&snapshot);
        let put = self.store.put(&snapshot.session_id, &document);
        let result = match tokio::time::timeout(self.timeout, put).await {
            Ok(r) => r,
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        };

        match result {
            Ok(()) => {
                if let Err(e) = self.recorder.mark_uploaded().await {
                    tracing::warn!(error = %e, "published, but could not flag session as uploaded");
                }
                tracing::info!(
                    %trigger,
                    session_id = %snapshot.session_id,
                    recognized = document.len(),
                    "attendance session published"
                );
                PublishOutcome::Published { records: document.len() }
            }
            Err(e) => {
                tracing::error!(
                    %trigger,
                    session_id = %snapshot.session_id,
                    error = %e,
                    "attendance publish failed"
                );
                PublishOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Remote shape of a snapshot: `student_<sequence>` → entry.
pub fn attendance_document(snapshot: &SessionSnapshot) -> AttendanceDocument {
    AttendanceDocument {
        entries: snapshot
            .records
            .iter()
            .map(|r| {
                (
                    format!("student_{}", r.sequence),
                    RemoteEntry {
                        name: r.name.clone(),
                        reg_no: r.identity_id.clone(),
                        branch: r.group.clone(),
                        time: r.arrived_at.format("%I:%M %p").to_string(),
                    },
                )
            })
            .collect(),
    }
}
