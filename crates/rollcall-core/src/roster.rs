//! Immutable roster of known identities, built once at startup.

use crate::types::{Embedding, Identity, RosterEntry};
use serde::Deserialize;
use std::fmt::Display;

/// Roster listings are a bare array or wrapped in `{"documents": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RosterListing {
    Bare(Vec<RosterEntry>),
    Wrapped { documents: Vec<RosterEntry> },
}

/// Parse a roster listing in either accepted shape.
pub fn parse_listing(json: &str) -> Result<Vec<RosterEntry>, serde_json::Error> {
    match serde_json::from_str(json)? {
        RosterListing::Bare(entries) | RosterListing::Wrapped { documents: entries } => Ok(entries),
    }
}

/// Why an entry did not make it into the index.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Rejection {
    DuplicateId,
    DimensionMismatch { expected: usize, actual: usize },
    EmptyEmbedding,
}

/// Ordered list of identities with one reference embedding each.
///
/// Roster order is preserved and is the tie-break order for matching.
#[derive(Debug, Clone, Default)]
pub struct RosterIndex {
    identities: Vec<Identity>,
    skipped: usize,
}

impl RosterIndex {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build an index from identities that already carry embeddings.
    ///
    /// Duplicate ids and embeddings of a different dimension than the first
    /// accepted identity are skipped.
    pub fn from_identities(identities: impl IntoIterator<Item = Identity>) -> Self {
        let mut index = Self::empty();
        for identity in identities {
            if let Err(reason) = index.admit(identity.clone()) {
                tracing::warn!(
                    id = %identity.id,
                    name = %identity.name,
                    ?reason,
                    "skipping roster identity"
                );
                index.skipped += 1;
            }
        }
        index
    }

    /// Build an index from roster entries paired with whatever payload the
    /// caller fetched for them (usually the reference photo).
    ///
    /// `extract` turns one payload into the embeddings found in it. Only the
    /// first embedding is kept. An entry is skipped, never fatal, when it has
    /// no registration number, when `extract` fails, or when no face is found.
    pub fn build<T, E, F>(
        entries: impl IntoIterator<Item = (RosterEntry, T)>,
        mut extract: F,
    ) -> Self
    where
        F: FnMut(&RosterEntry, T) -> Result<Vec<Embedding>, E>,
        E: Display,
    {
        let mut index = Self::empty();

        for (entry, payload) in entries {
            let Some(id) = entry.reg_no.clone().filter(|id| !id.trim().is_empty()) else {
                tracing::warn!(name = %entry.name, "roster entry has no reg_no; skipping");
                index.skipped += 1;
                continue;
            };

            let embedding = match extract(&entry, payload) {
                Ok(embeddings) => embeddings.into_iter().next(),
                Err(e) => {
                    tracing::warn!(
                        name = %entry.name,
                        id = %id,
                        error = %e,
                        "failed to load reference photo; skipping"
                    );
                    index.skipped += 1;
                    continue;
                }
            };

            let Some(embedding) = embedding else {
                tracing::warn!(name = %entry.name, id = %id, "no face in photo; skipping");
                index.skipped += 1;
                continue;
            };

            let identity = Identity {
                id,
                name: entry.name.clone(),
                group: entry.branch.clone().unwrap_or_default(),
                embedding,
            };

            match index.admit(identity) {
                Ok(()) => {
                    tracing::info!(name = %entry.name, id = ?entry.reg_no, "loaded roster identity")
                }
                Err(reason) => {
                    tracing::warn!(
                        name = %entry.name,
                        id = ?entry.reg_no,
                        ?reason,
                        "skipping roster identity"
                    );
                    index.skipped += 1;
                }
            }
        }

        tracing::info!(
            loaded = index.len(),
            skipped = index.skipped,
            "roster loading complete"
        );
        index
    }

    fn admit(&mut self, identity: Identity) -> Result<(), Rejection> {
        if identity.embedding.values.is_empty() {
            return Err(Rejection::EmptyEmbedding);
        }
        if let Some(expected) = self.dimension() {
            let actual = identity.embedding.dimension();
            if actual != expected {
                return Err(Rejection::DimensionMismatch { expected, actual });
            }
        }
        if self.get(&identity.id).is_some() {
            return Err(Rejection::DuplicateId);
        }
        self.identities.push(identity);
        Ok(())
    }

    /// Identities in roster order.
    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }

    pub fn get(&self, id: &str) -> Option<&Identity> {
        self.identities.iter().find(|i| i.id == id)
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Embedding dimension shared by every identity, `None` while empty.
    pub fn dimension(&self) -> Option<usize> {
        self.identities.first().map(|i| i.embedding.dimension())
    }

    /// Number of entries rejected while building.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}
