//! rollcall-core: face matching and attendance session engine.
//!
//! Matches face embeddings against a fixed roster, deduplicates sightings
//! into an ordered attendance session, and provides the ONNX-backed
//! SCRFD + ArcFace encoder used to turn frames into embeddings.

pub mod alignment;
pub mod detector;
pub mod encoder;
pub mod frame;
pub mod matcher;
pub mod recognizer;
pub mod roster;
pub mod session;
pub mod types;

pub use encoder::{EncoderError, FaceEncoder, OnnxFaceEncoder};
pub use frame::{decode_frame, decode_image, FrameError};
pub use matcher::{
    best_match, unit_distance, unit_similarity, FaceMatcher, MatchCandidate, DEFAULT_TOLERANCE,
};
pub use roster::{parse_listing, RosterIndex};
pub use session::{AttendanceRecord, AttendanceSession, SessionSnapshot};
pub use types::{BoundingBox, Embedding, FaceEncoding, Identity, RosterEntry};
