//! Single writer for session state and the local log.
//!
//! The recorder thread owns the [`AttendanceSession`] and the [`LocalLog`].
//! Marking an identity and appending its log row happen in one request, so
//! concurrent frames can neither create duplicate records nor interleave
//! rows out of arrival order. A mark carrying a [`ConnectionGate`] is refused
//! if the gate is closed when the recorder reaches it, so nothing is recorded
//! after a disconnect's snapshot has been taken.

use crate::gate::ConnectionGate;
use crate::local_log::LocalLog;
use rollcall_core::{AttendanceRecord, AttendanceSession, Identity, SessionSnapshot};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("failed to spawn recorder thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("recorder thread exited")]
    ChannelClosed,
}

/// Outcome of a mark request.
#[derive(Debug, Clone)]
pub struct Marked {
    pub record: AttendanceRecord,
    pub created: bool,
}

enum RecorderRequest {
    Mark {
        identity: Identity,
        gate: Option<Arc<ConnectionGate>>,
        reply: oneshot::Sender<Option<Marked>>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    MarkUploaded {
        reply: oneshot::Sender<()>,
    },
}

/// Clone-safe handle to the recorder thread.
///
/// Async methods are for the runtime; `blocking_*` methods are for frame
/// worker threads and must not be called from async code.
#[derive(Clone)]
pub struct RecorderHandle {
    tx: mpsc::Sender<RecorderRequest>,
}

impl RecorderHandle {
    #[cfg(test)]
    pub async fn mark_if_new(&self, identity: Identity) -> Result<Marked, RecorderError> {
        let (reply, rx) = oneshot::channel();
        self.send(RecorderRequest::Mark { identity, gate: None, reply }).await?;
        rx.await.ok().flatten().ok_or(RecorderError::ChannelClosed)
    }

    #[cfg(test)]
    pub fn blocking_mark_if_new(&self, identity: Identity) -> Result<Marked, RecorderError> {
        self.blocking_mark(identity, None)?.ok_or(RecorderError::ChannelClosed)
    }

    /// Mark `identity` only if `gate` is still open when the recorder gets to
    /// it. `None` means the client had gone and nothing was recorded.
    pub fn blocking_mark_if_connected(
        &self,
        gate: &Arc<ConnectionGate>,
        identity: Identity,
    ) -> Result<Option<Marked>, RecorderError> {
        self.blocking_mark(identity, Some(Arc::clone(gate)))
    }

    fn blocking_mark(
        &self,
        identity: Identity,
        gate: Option<Arc<ConnectionGate>>,
    ) -> Result<Option<Marked>, RecorderError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .blocking_send(RecorderRequest::Mark { identity, gate, reply })
            .map_err(|_| RecorderError::ChannelClosed)?;
        rx.blocking_recv().map_err(|_| RecorderError::ChannelClosed)
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, RecorderError> {
        let (reply, rx) = oneshot::channel();
        self.send(RecorderRequest::Snapshot { reply }).await?;
        rx.await.map_err(|_| RecorderError::ChannelClosed)
    }

    pub async fn mark_uploaded(&self) -> Result<(), RecorderError> {
        let (reply, rx) = oneshot::channel();
        self.send(RecorderRequest::MarkUploaded { reply }).await?;
        rx.await.map_err(|_| RecorderError::ChannelClosed)
    }

    async fn send(&self, req: RecorderRequest) -> Result<(), RecorderError> {
        self.tx.send(req).await.map_err(|_| RecorderError::ChannelClosed)
    }
}

/// Spawn the recorder on a dedicated OS thread.
pub fn spawn_recorder(
    session: AttendanceSession,
    log: LocalLog,
) -> Result<RecorderHandle, RecorderError> {
    let (tx, mut rx) = mpsc::channel::<RecorderRequest>(64);

    std::thread::Builder::new()
        .name("rollcall-recorder".into())
        .spawn(move || {
            let mut session = session;
            let mut log = log;
            tracing::info!(
                session_id = %session.id(),
                log = %log.path().display(),
                "recorder thread started"
            );

            while let Some(req) = rx.blocking_recv() {
                match req {
                    RecorderRequest::Mark { identity, gate, reply } => {
                        let open = gate.as_deref().map_or(true, ConnectionGate::is_connected);
                        let marked = if open {
                            Some(record(&mut session, &mut log, &identity))
                        } else {
                            tracing::debug!(id = %identity.id, "client gone; match discarded");
                            None
                        };
                        let _ = reply.send(marked);
                    }
                    RecorderRequest::Snapshot { reply } => {
                        let _ = reply.send(session.snapshot());
                    }
                    RecorderRequest::MarkUploaded { reply } => {
                        session.mark_uploaded();
                        let _ = reply.send(());
                    }
                }
            }
            tracing::info!(recorded = session.len(), "recorder thread exiting");
        })?;

    Ok(RecorderHandle { tx })
}

/// Mark `identity` and, for a first sighting, append its log row.
/// A failed append is logged; the in-memory record stands.
fn record(session: &mut AttendanceSession, log: &mut LocalLog, identity: &Identity) -> Marked {
    let (record, created) = session.mark_if_new(identity);
    if created {
        if let Err(e) = log.append(&record) {
            tracing::warn!(error = %e, id = %record.identity_id, "attendance log append failed");
        }
        tracing::info!(
            name = %record.name,
            id = %record.identity_id,
            sequence = record.sequence,
            time = %record.arrived_at.format("%I:%M %p"),
            "attendance marked"
        );
    }
    Marked { record, created }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use rollcall_core::Embedding;
    use std::sync::Arc;

    fn identity(id: &str) -> Identity {
        Identity {
            id: id.into(),
            name: format!("student {id}"),
            group: "EEE".into(),
            embedding: Embedding::new(vec![0.0; 2]),
        }
    }

    fn spawn_in(dir: &std::path::Path) -> (RecorderHandle, std::path::PathBuf) {
        let now = Local::now();
        let log = LocalLog::open(dir, &now).unwrap();
        let path = log.path().to_path_buf();
        (spawn_recorder(AttendanceSession::start(now), log).unwrap(), path)
    }

    #[tokio::test]
    async fn test_mark_dedups_and_logs_once() {
        let dir = tempfile::tempdir().unwrap();
        let (recorder, path) = spawn_in(dir.path());

        let first = recorder.mark_if_new(identity("R1")).await.unwrap();
        let second = recorder.mark_if_new(identity("R1")).await.unwrap();

        assert!(first.created);
        assert_eq!(first.record.sequence, 0);
        assert!(!second.created);
        assert_eq!(second.record, first.record);

        let text = std::fs::read_to_string(path).unwrap();
        assert_eq!(text.lines().count(), 2, "header plus one row: {text}");
    }

    #[tokio::test]
    async fn test_snapshot_and_uploaded_flag() {
        let dir = tempfile::tempdir().unwrap();
        let (recorder, _) = spawn_in(dir.path());

        recorder.mark_if_new(identity("R2")).await.unwrap();
        recorder.mark_if_new(identity("R1")).await.unwrap();
        recorder.mark_uploaded().await.unwrap();

        let snapshot = recorder.snapshot().await.unwrap();
        assert!(snapshot.uploaded);
        let ids: Vec<_> = snapshot.records.iter().map(|r| r.identity_id.as_str()).collect();
        assert_eq!(ids, ["R2", "R1"]);
    }

    #[test]
    fn test_concurrent_marks_create_one_record_per_identity() {
        let dir = tempfile::tempdir().unwrap();
        let (recorder, path) = spawn_in(dir.path());
        let created = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let threads: Vec<_> = (0..8)
            .map(|t| {
                let recorder = recorder.clone();
                let created = Arc::clone(&created);
                std::thread::spawn(move || {
                    for i in 0..20 {
                        let id = format!("R{}", (i + t) % 5);
                        if recorder.blocking_mark_if_new(identity(&id)).unwrap().created {
                            created.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(created.load(std::sync::atomic::Ordering::SeqCst), 5);
        let text = std::fs::read_to_string(path).unwrap();
        assert_eq!(text.lines().count(), 6);
    }

    #[test]
    fn test_failed_append_still_records() {
        let dir = tempfile::tempdir().unwrap();
        let now = Local::now();
        let log = LocalLog::detached(dir.path(), &now);
        let recorder = spawn_recorder(AttendanceSession::start(now), log).unwrap();

        let marked = recorder.blocking_mark_if_new(identity("R9")).unwrap();
        assert!(marked.created);
        assert!(!recorder.blocking_mark_if_new(identity("R9")).unwrap().created);
    }

    #[tokio::test]
    async fn test_mark_refused_after_gate_closes() {
        let dir = tempfile::tempdir().unwrap();
        let (recorder, path) = spawn_in(dir.path());
        let gate = Arc::new(ConnectionGate::new());
        gate.set_connected(true);

        let worker = recorder.clone();
        let worker_gate = Arc::clone(&gate);
        let before = tokio::task::spawn_blocking(move || {
            worker.blocking_mark_if_connected(&worker_gate, identity("R1"))
        })
        .await
        .unwrap()
        .unwrap();
        assert!(before.is_some_and(|m| m.created));

        // Disconnect: close the gate, then snapshot for the publish.
        gate.set_connected(false);
        let published = recorder.snapshot().await.unwrap();

        let worker = recorder.clone();
        let worker_gate = Arc::clone(&gate);
        let after = tokio::task::spawn_blocking(move || {
            worker.blocking_mark_if_connected(&worker_gate, identity("R2"))
        })
        .await
        .unwrap()
        .unwrap();
        assert!(after.is_none());

        assert_eq!(recorder.snapshot().await.unwrap().records, published.records);
        let text = std::fs::read_to_string(path).unwrap();
        assert_eq!(text.lines().count(), 2, "only R1 is logged: {text}");
    }
}
