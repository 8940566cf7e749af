use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use bincode::{Decode, Encode};
use log::info;
use serde::{Deserialize, Serialize};

use trackcore::algorithm::alignment::{AlignmentReport, AlignmentSample};
use trackcore::data::track::GlobalTrack;
use trackcore::reconstruction::EventReconstruction;

use crate::events::parse_json_lines;

const TRACK_FILE_VERSION: u32 = 1;
const ZSTD_LEVEL: i32 = 3;

/// Versioned container of the compact binary track stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct TrackFile {
    pub version: u32,
    pub tracks: Vec<GlobalTrack>,
}

impl TrackFile {
    pub fn new(tracks: Vec<GlobalTrack>) -> Self {
        Self { version: TRACK_FILE_VERSION, tracks }
    }
}

fn create(path: &Path, what: &str) -> Result<BufWriter<File>> {
    let file = File::create(path).with_context(|| format!("cannot create {} {}", what, path.display()))?;
    Ok(BufWriter::new(file))
}

/// Writes one JSON document per line.
pub fn write_json_lines<T: Serialize>(path: &Path, records: &[T], what: &str) -> Result<()> {
    let mut w = create(path, what)?;
    for r in records {
        serde_json::to_writer(&mut w, r).with_context(|| format!("cannot serialize {}", what))?;
        w.write_all(b"\n")?;
    }
    w.flush().with_context(|| format!("cannot write {} {}", what, path.display()))?;
    info!("{} {} written to {}", records.len(), what, path.display());
    Ok(())
}

/// Per-event results (summary and tracks), one event per line.
pub fn write_results(path: &Path, results: &[EventReconstruction]) -> Result<()> {
    write_json_lines(path, results, "event results")
}

pub fn write_samples(path: &Path, samples: &[AlignmentSample]) -> Result<()> {
    write_json_lines(path, samples, "alignment samples")
}

pub fn read_samples(path: &Path) -> Result<Vec<AlignmentSample>> {
    let file = File::open(path).with_context(|| format!("cannot open alignment samples {}", path.display()))?;
    parse_json_lines(BufReader::new(file), &path.display().to_string())
}

/// Pretty JSON, for files meant to be read by a person.
pub fn write_pretty_json<T: Serialize>(path: &Path, value: &T, what: &str) -> Result<()> {
    let mut w = create(path, what)?;
    serde_json::to_writer_pretty(&mut w, value).with_context(|| format!("cannot serialize {}", what))?;
    w.write_all(b"\n")?;
    w.flush().with_context(|| format!("cannot write {} {}", what, path.display()))?;
    info!("{} written to {}", what, path.display());
    Ok(())
}

pub fn write_alignment_report(path: &Path, report: &AlignmentReport) -> Result<()> {
    write_pretty_json(path, report, "alignment report")
}

/// Saves all tracks as zstd-compressed bincode.
pub fn save_tracks_bincode(path: &Path, tracks: &[GlobalTrack]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("cannot create track file {}", path.display()))?;
    let mut zw = zstd::Encoder::new(file, ZSTD_LEVEL)?;
    bincode::encode_into_std_write(TrackFile::new(tracks.to_vec()), &mut zw, bincode::config::standard())
        .with_context(|| format!("cannot encode tracks into {}", path.display()))?;
    zw.finish()?;
    info!("{} tracks written to {}", tracks.len(), path.display());
    Ok(())
}

pub fn load_tracks_bincode(path: &Path) -> Result<Vec<GlobalTrack>> {
    let file = File::open(path).with_context(|| format!("cannot open track file {}", path.display()))?;
    let mut zr = zstd::Decoder::new(file)?;
    let tf: TrackFile = bincode::decode_from_std_read(&mut zr, bincode::config::standard())
        .with_context(|| format!("cannot decode track file {}", path.display()))?;
    anyhow::ensure!(
        tf.version == TRACK_FILE_VERSION,
        "track file {} has version {}, expected {}",
        path.display(),
        tf.version,
        TRACK_FILE_VERSION
    );
    Ok(tf.tracks)
}
