//! Remote aggregate store: one document per session, overwritten on each publish.

use async_trait::async_trait;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("store did not answer within {0:?}")]
    Timeout(Duration),
}

/// One attendee as stored remotely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub name: String,
    pub reg_no: String,
    pub branch: String,
    /// Time of day, e.g. "09:20 AM".
    pub time: String,
}

/// Full remote document for one session: record key → entry, in arrival order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttendanceDocument {
    pub entries: Vec<(String, RemoteEntry)>,
}

impl AttendanceDocument {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn get(&self, key: &str) -> Option<&RemoteEntry> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

impl Serialize for AttendanceDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.entries.iter().map(|(k, v)| (k, v)))
    }
}

#[async_trait]
pub trait AggregateStore: Send + Sync {
    /// Replace the whole document stored under `session_id`.
    async fn put(&self, session_id: &str, document: &AttendanceDocument) -> Result<(), StoreError>;
}

/// Document store reached over HTTP: `PUT {base_url}/{collection}/{session_id}`.
pub struct HttpAggregateStore {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    token: Option<String>,
}

impl HttpAggregateStore {
    pub fn new(
        base_url: impl Into<String>,
        collection: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            collection: collection.into(),
            token,
        })
    }

    fn document_url(&self, session_id: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.collection.trim_matches('/'),
            session_id
        )
    }
}

#[async_trait]
impl AggregateStore for HttpAggregateStore {
    async fn put(&self, session_id: &str, document: &AttendanceDocument) -> Result<(), StoreError> {
        let mut request = self.client.put(self.document_url(session_id)).json(document);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request.send().await?.error_for_status()?;
        Ok(())
    }
}

/// Keeps published documents in process memory.
#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<String, AttendanceDocument>>,
    writes: Mutex<usize>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn document(&self, session_id: &str) -> Option<AttendanceDocument> {
        self.documents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(session_id)
            .cloned()
    }

    /// Number of successful `put` calls so far.
    pub fn writes(&self) -> usize {
        *self.writes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl AggregateStore for MemoryStore {
    async fn put(&self, session_id: &str, document: &AttendanceDocument) -> Result<(), StoreError> {
        self.documents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(session_id.to_string(), document.clone());
        *self.writes.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        tracing::debug!(session_id, entries = document.len(), "stored attendance in memory");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> RemoteEntry {
        RemoteEntry {
            name: name.into(),
            reg_no: format!("{name}-reg"),
            branch: "IT".into(),
            time: "09:20 AM".into(),
        }
    }

    #[test]
    fn test_document_serializes_as_ordered_map() {
        let doc = AttendanceDocument {
            entries: vec![
                ("student_0".into(), entry("zoe")),
                ("student_1".into(), entry("adam")),
            ],
        };
        let json = serde_json::to_string(&doc).unwrap();
        let zoe = r#"{"name":"zoe","reg_no":"zoe-reg","branch":"IT","time":"09:20 AM"}"#;
        assert!(json.starts_with(&format!(r#"{{"student_0":{zoe}"#)));
        assert!(json.find("student_0").unwrap() < json.find("student_1").unwrap());
    }

    #[test]
    fn test_document_url_joins_cleanly() {
        let store = HttpAggregateStore::new(
            "https://store.example/v1/",
            "/attendance/",
            None,
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            store.document_url("attendance_20240305_091502"),
            "https://store.example/v1/attendance/attendance_20240305_091502"
        );
    }

    #[tokio::test]
    async fn test_memory_store_overwrites() {
        let store = MemoryStore::default();
        let first = AttendanceDocument { entries: vec![("student_0".into(), entry("a"))] };
        let second = AttendanceDocument {
            entries: vec![("student_0".into(), entry("a")), ("student_1".into(), entry("b"))],
        };

        store.put("s1", &first).await.unwrap();
        store.put("s1", &second).await.unwrap();

        assert_eq!(store.writes(), 2);
        assert_eq!(store.document("s1"), Some(second));
        assert!(store.document("s2").is_none());
    }
}
