use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use log::{info, warn};

use trackcore::algorithm::alignment::{optimize_alignment, AlignmentReport, AlignmentSample};
use trackcore::data::track::GlobalTrack;
use trackcore::reconstruction::EventReconstruction;

use crate::events::read_events;
use crate::loaders::load_reconstructor;
use crate::manifest::RunManifest;
use crate::output::{save_tracks_bincode, write_alignment_report, write_pretty_json, write_results, write_samples};

/// Outputs of the `reconstruct` command.
#[derive(Clone, Debug, Default)]
pub struct ReconstructOutputs {
    pub results: PathBuf,
    pub binary_tracks: Option<PathBuf>,
    pub samples: Option<PathBuf>,
}

/// Outputs of the `align` command.
#[derive(Clone, Debug, Default)]
pub struct AlignOutputs {
    pub report: PathBuf,
    pub offsets: Option<PathBuf>,
    pub samples: Option<PathBuf>,
}

/// Counts logged once a batch is done.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunCounts {
    pub events: usize,
    pub rejected: usize,
    pub tracks: usize,
    pub samples: usize,
}

impl RunCounts {
    pub fn from_results(results: &[EventReconstruction]) -> Self {
        RunCounts {
            events: results.len(),
            rejected: results.iter().filter(|r| r.summary.rejection.is_some()).count(),
            tracks: results.iter().map(|r| r.tracks.len()).sum(),
            samples: results.iter().filter(|r| r.alignment_sample.is_some()).count(),
        }
    }
}

fn all_tracks(results: &[EventReconstruction]) -> Vec<GlobalTrack> {
    results.iter().flat_map(|r| r.tracks.iter().cloned()).collect()
}

fn all_samples(results: &[EventReconstruction]) -> Vec<AlignmentSample> {
    results.iter().filter_map(|r| r.alignment_sample.clone()).collect()
}

fn reconstruct_events(manifest: &RunManifest, events: &Path) -> Result<Vec<EventReconstruction>> {
    let reconstructor = load_reconstructor(manifest)?;
    let events = read_events(events)?;

    let start = Instant::now();
    let results = reconstructor.process_batch(&events);
    let counts = RunCounts::from_results(&results);
    info!(
        "{} events reconstructed in {:.2?}: {} rejected, {} tracks, {} alignment samples",
        counts.events,
        start.elapsed(),
        counts.rejected,
        counts.tracks,
        counts.samples
    );
    Ok(results)
}

/// Reconstructs every event of a file and writes the requested outputs.
pub fn run_reconstruct(manifest: &Path, events: &Path, outputs: &ReconstructOutputs) -> Result<RunCounts> {
    let mut manifest = RunManifest::load(manifest)?;
    if outputs.samples.is_some() {
        manifest.config.collect_alignment_samples = true;
    }
    let results = reconstruct_events(&manifest, events)?;

    write_results(&outputs.results, &results)?;
    if let Some(path) = &outputs.binary_tracks {
        save_tracks_bincode(path, &all_tracks(&results))?;
    }
    if let Some(path) = &outputs.samples {
        write_samples(path, &all_samples(&results))?;
    }
    Ok(RunCounts::from_results(&results))
}

/// Collects alignment samples from an event file and searches for the
/// offsets that bring the reconstructed p/Q closest to the reference.
pub fn run_align(manifest_path: &Path, events: &Path, outputs: &AlignOutputs) -> Result<AlignmentReport> {
    let mut manifest = RunManifest::load(manifest_path)?;
    let settings = manifest
        .alignment
        .clone()
        .with_context(|| format!("run manifest {} has no alignment section", manifest_path.display()))?;
    manifest.config.collect_alignment_samples = true;

    let reconstructor = load_reconstructor(&manifest)?;
    let events = read_events(events)?;
    let samples = all_samples(&reconstructor.process_batch(&events));
    if let Some(path) = &outputs.samples {
        write_samples(path, &samples)?;
    }

    let start = Instant::now();
    let ctx = reconstructor.alignment_context(&samples, &settings);
    let report = optimize_alignment(&ctx).context("alignment failed")?;
    info!(
        "alignment finished in {:.2?}: {} accepted, {} degenerate",
        start.elapsed(),
        report.accepted.len(),
        report.degenerate
    );

    write_alignment_report(&outputs.report, &report)?;
    match (&outputs.offsets, &report.best_offsets) {
        (Some(path), Some(offsets)) => write_pretty_json(path, offsets, "alignment offsets")?,
        (Some(path), None) => warn!("no acceptable solution, {} not written", path.display()),
        _ => {}
    }
    Ok(report)
}

/// Loads every input a manifest names and renders the effective tracking
/// configuration, without reading any events.
pub fn check_manifest(manifest: &Path) -> Result<String> {
    let manifest = RunManifest::load(manifest)?;
    let reconstructor = load_reconstructor(&manifest)?;
    serde_json::to_string_pretty(reconstructor.config()).context("cannot render the tracking configuration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    use trackcore::calibration::response::ResponseFunction;
    use trackcore::data::detector::DetectorId;
    use trackcore::geometry::setup::{DetectorPlacement, SetupGeometry};
    use trackcore::geometry::vector::Vec3;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        File::create(&path).unwrap().write_all(content.as_bytes()).unwrap();
        path
    }

    fn setup(dir: &Path, alignment: bool) -> PathBuf {
        let detectors = DetectorId::ALL
            .iter()
            .enumerate()
            .map(|(i, &d)| (d, DetectorPlacement::new(d.default_axis(), Vec3::ZERO, Vec3::new(0.0, 0.0, 10.0 * i as f64))))
            .collect();
        write(dir, "geometry.json", &serde_json::to_string(&SetupGeometry::new(detectors)).unwrap());
        let constant = |v: f64| serde_json::to_string(&ResponseFunction::constant("", 8, v)).unwrap();
        write(dir, "poq.json", &constant(12.0));
        write(dir, "fp.json", &constant(700.0));
        write(dir, "zero.json", &constant(0.0));
        write(dir, "charge.txt", "0.0 1.0 0.0\n");
        write(dir, "events.jsonl", "{\"event_id\": 1}\n{\"event_id\": 2}\n");

        let alignment = if alignment { r#", "alignment": { "reference_momentum_over_charge": 12.0 }"# } else { "" };
        let manifest = format!(
            r#"{{
                "geometry": "geometry.json",
                "response_functions": {{
                    "momentum_over_charge": "poq.json",
                    "flight_path": "fp.json",
                    "tx0": "zero.json",
                    "ty0": "zero.json",
                    "tx1": "zero.json",
                    "ty1": "zero.json"
                }},
                "charge_table": "charge.txt"{}
            }}"#,
            alignment
        );
        write(dir, "run.json", &manifest)
    }

    #[test]
    fn test_reconstruct_writes_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = setup(dir.path(), false);
        let outputs = ReconstructOutputs {
            results: dir.path().join("results.jsonl"),
            binary_tracks: Some(dir.path().join("tracks.bin.zst")),
            samples: Some(dir.path().join("samples.jsonl")),
        };
        let counts = run_reconstruct(&manifest, &dir.path().join("events.jsonl"), &outputs).unwrap();

        assert_eq!(counts.events, 2);
        assert_eq!(counts.rejected, 2);
        assert_eq!(counts.tracks, 0);
        let text = std::fs::read_to_string(&outputs.results).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(crate::output::load_tracks_bincode(&dir.path().join("tracks.bin.zst")).unwrap().is_empty());
        assert!(crate::output::read_samples(&dir.path().join("samples.jsonl")).unwrap().is_empty());
    }

    #[test]
    fn test_align_requires_alignment_section() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = setup(dir.path(), false);
        let outputs = AlignOutputs { report: dir.path().join("report.json"), ..Default::default() };
        let err = run_align(&manifest, &dir.path().join("events.jsonl"), &outputs).unwrap_err();
        assert!(format!("{:#}", err).contains("no alignment section"));
    }

    #[test]
    fn test_align_without_samples_fails() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = setup(dir.path(), true);
        let outputs = AlignOutputs { report: dir.path().join("report.json"), ..Default::default() };
        assert!(run_align(&manifest, &dir.path().join("events.jsonl"), &outputs).is_err());
        assert!(!outputs.report.exists());
    }

    #[test]
    fn test_check_manifest_renders_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = setup(dir.path(), false);
        let text = check_manifest(&manifest).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["caps"]["max_tracks"], 500);
    }
}
