//! Stubs shared by the daemon's unit tests.

use crate::app::App;
use crate::engine::{spawn_workers, WorkerContext};
use crate::gate::ConnectionGate;
use crate::local_log::LocalLog;
use crate::publisher::Publisher;
use crate::recorder::spawn_recorder;
use crate::store::MemoryStore;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Local;
use image::{ImageFormat, Rgb, RgbImage};
use rollcall_core::{
    AttendanceSession, BoundingBox, EncoderError, Embedding, FaceEncoder, FaceEncoding, FaceMatcher,
    Identity, RosterIndex,
};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// One "face" per run of equal non-zero red values along the first row;
/// the embedding is that red value scaled to [0, 1].
pub struct RowEncoder;

impl FaceEncoder for RowEncoder {
    fn encode(&mut self, image: &RgbImage) -> Result<Vec<FaceEncoding>, EncoderError> {
        let mut reds: Vec<u8> = (0..image.width()).map(|x| image.get_pixel(x, 0).0[0]).collect();
        reds.dedup();
        Ok(reds
            .into_iter()
            .filter(|&r| r > 0)
            .map(|r| FaceEncoding {
                face: BoundingBox {
                    x: 0.0,
                    y: 0.0,
                    width: 1.0,
                    height: 1.0,
                    confidence: 1.0,
                    landmarks: None,
                },
                embedding: Embedding::new(vec![r as f32 / 255.0]),
            })
            .collect())
    }
}

/// PNG with one pixel per entry of `reds` along a single row.
pub fn png(reds: &[u8]) -> Vec<u8> {
    let mut image = RgbImage::new(reds.len() as u32, 1);
    for (x, &r) in reds.iter().enumerate() {
        image.put_pixel(x as u32, 0, Rgb([r, 0, 0]));
    }
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

/// `png(reds)` as a data URL, the way the capture client sends frames.
pub fn frame(reds: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png(reds)))
}

pub fn identity(id: &str, value: f32) -> Identity {
    Identity {
        id: id.into(),
        name: format!("student {id}"),
        group: "MECH".into(),
        embedding: Embedding::new(vec![value]),
    }
}

/// A disconnected app over a two-identity roster (`R1` at 1.0, `R2` at 0.2,
/// tolerance 0.05) with one `RowEncoder` worker, logging into `dir` and
/// publishing to a memory store.
pub fn test_app(dir: &Path) -> (App, Arc<MemoryStore>) {
    let now = Local::now();
    let session = AttendanceSession::start(now);
    let session_id = session.id().to_string();
    let recorder = spawn_recorder(session, LocalLog::open(dir, &now).unwrap()).unwrap();
    let store = Arc::new(MemoryStore::default());
    let publisher =
        Arc::new(Publisher::new(recorder.clone(), store.clone(), Duration::from_secs(5)));
    let gate = Arc::new(ConnectionGate::new());

    let roster = RosterIndex::from_identities([identity("R1", 1.0), identity("R2", 0.2)]);
    let encoders: Vec<Box<dyn FaceEncoder>> = vec![Box::new(RowEncoder)];
    let ctx = WorkerContext {
        gate: Arc::clone(&gate),
        matcher: FaceMatcher::new(Arc::new(roster), 0.05),
        recorder: recorder.clone(),
    };
    let pipeline = spawn_workers(encoders, ctx, 4).unwrap();

    let app = App::new(gate, recorder, publisher, pipeline, 2, session_id);
    (app, store)
}
