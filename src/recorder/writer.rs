//! Incremental stream persistence
//!
//! One thread per artifact. Artifacts are created lazily from the first
//! observed item (frame dimensions for video, schema for telemetry) and
//! finalized exactly once when the sentinel arrives. A stream that ends
//! before producing anything leaves no file behind.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use crossbeam_channel::Receiver;
use serde::Serialize;
use thiserror::Error;

use crate::capture::telemetry::{TelemetrySample, TelemetrySchema};
use crate::capture::traits::VideoFrame;
use crate::media::ffmpeg::{FfmpegEncoder, FrameEncoder, MediaError};
use crate::media::overlay::{self, OVERLAY_YELLOW};
use crate::stream::{Stamped, StreamEvent, StreamKind};

/// Where the per-frame timestamp is burned into recorded video.
const STAMP_X: u32 = 50;
const STAMP_Y: u32 = 50;
const STAMP_SCALE: u32 = 3;

/// Errors from a writer thread.
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("writer thread panicked")]
    Panicked,
}

/// What a writer produced.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteReport {
    pub kind: StreamKind,
    pub items: u64,
    /// Present only if at least one item arrived.
    pub artifact: Option<PathBuf>,
}

/// Join handle for one writer thread.
pub struct WriterHandle {
    kind: StreamKind,
    handle: JoinHandle<Result<WriteReport, WriteError>>,
}

impl WriterHandle {
    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn join(self) -> Result<WriteReport, WriteError> {
        self.handle.join().map_err(|_| WriteError::Panicked)?
    }
}

/// Spawn a writer that persists one video stream to an MP4 file.
pub fn spawn_video_writer(
    kind: StreamKind,
    rx: Receiver<StreamEvent<VideoFrame>>,
    dest: PathBuf,
    fps: f64,
) -> WriterHandle {
    let handle = std::thread::spawn(move || {
        let path = dest.clone();
        video_writer_loop(kind, rx, &path, |width, height| {
            FfmpegEncoder::create(&dest, width, height, fps)
        })
    });
    WriterHandle { kind, handle }
}

/// Drain a video channel into a lazily-created encoder.
///
/// Split out from `spawn_video_writer` so the create/write/finalize logic
/// is testable with an in-memory encoder.
fn video_writer_loop<E, F>(
    kind: StreamKind,
    rx: Receiver<StreamEvent<VideoFrame>>,
    dest: &Path,
    mut open: F,
) -> Result<WriteReport, WriteError>
where
    E: FrameEncoder,
    F: FnMut(u32, u32) -> Result<E, MediaError>,
{
    let mut encoder: Option<E> = None;
    let mut items = 0u64;

    loop {
        match rx.recv() {
            Ok(StreamEvent::Frame(mut item)) => {
                if encoder.is_none() {
                    // The artifact takes its shape from the first frame.
                    tracing::info!(
                        stream = %kind,
                        width = item.payload.width,
                        height = item.payload.height,
                        "creating video artifact"
                    );
                    encoder = Some(open(item.payload.width, item.payload.height)?);
                }
                let stamp = format!("{:.2}", item.t_rel);
                overlay::draw_text(
                    &mut item.payload,
                    &stamp,
                    STAMP_X,
                    STAMP_Y,
                    STAMP_SCALE,
                    OVERLAY_YELLOW,
                );
                if let Some(enc) = encoder.as_mut() {
                    enc.write_frame(&item.payload)?;
                }
                items += 1;
            }
            Ok(StreamEvent::Eos) | Err(_) => break,
        }
    }

    let artifact = match encoder.as_mut() {
        Some(enc) => {
            enc.finish()?;
            tracing::info!(stream = %kind, items, dest = ?dest, "video artifact finalized");
            Some(dest.to_path_buf())
        }
        None => {
            // An empty stream must not leave an empty or corrupt file.
            tracing::info!(stream = %kind, "no frames arrived, skipping artifact");
            None
        }
    };

    Ok(WriteReport {
        kind,
        items,
        artifact,
    })
}

/// Spawn a writer that persists the telemetry stream to a CSV file.
pub fn spawn_telemetry_writer(
    rx: Receiver<StreamEvent<TelemetrySample>>,
    dest: PathBuf,
    schema: TelemetrySchema,
) -> WriterHandle {
    let kind = StreamKind::Telemetry;
    let handle = std::thread::spawn(move || telemetry_writer_loop(rx, &dest, &schema));
    WriterHandle { kind, handle }
}

fn telemetry_writer_loop(
    rx: Receiver<StreamEvent<TelemetrySample>>,
    dest: &Path,
    schema: &TelemetrySchema,
) -> Result<WriteReport, WriteError> {
    let mut out: Option<BufWriter<File>> = None;
    let mut items = 0u64;

    loop {
        match rx.recv() {
            Ok(StreamEvent::Frame(item)) => {
                if out.is_none() {
                    tracing::info!(dest = ?dest, "creating telemetry artifact");
                    let mut file = BufWriter::new(File::create(dest)?);
                    writeln!(file, "{}", schema.columns().join(","))?;
                    out = Some(file);
                }
                if let Some(file) = out.as_mut() {
                    write_row(file, &item)?;
                }
                items += 1;
            }
            Ok(StreamEvent::Eos) | Err(_) => break,
        }
    }

    let artifact = match out.as_mut() {
        Some(file) => {
            file.flush()?;
            tracing::info!(items, dest = ?dest, "telemetry artifact finalized");
            Some(dest.to_path_buf())
        }
        None => {
            tracing::info!("no samples arrived, skipping telemetry artifact");
            None
        }
    };

    Ok(WriteReport {
        kind: StreamKind::Telemetry,
        items,
        artifact,
    })
}

fn write_row(file: &mut BufWriter<File>, item: &Stamped<TelemetrySample>) -> std::io::Result<()> {
    write!(file, "{:.3}", item.t_rel)?;
    for value in &item.payload.values {
        match value {
            Some(v) => write!(file, ",{v}")?,
            None => write!(file, ",")?,
        }
    }
    match &item.payload.command {
        Some(command) => writeln!(file, ",{}", csv_field(command))?,
        None => writeln!(file, ",")?,
    }
    Ok(())
}

/// Quote a field only when the CSV syntax requires it.
fn csv_field(raw: &str) -> String {
    if raw.contains(',') || raw.contains('"') || raw.contains('\n') {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}
