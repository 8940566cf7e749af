use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use serde::de::DeserializeOwned;

use trackcore::calibration::charge::ChargeCalibration;
use trackcore::calibration::response::{ResponseFunction, ResponseFunctions};
use trackcore::geometry::setup::{AlignmentOffsets, SetupGeometry};
use trackcore::reconstruction::Reconstructor;

use crate::manifest::{ResponsePaths, RunManifest};

/// Reads a JSON document, naming `what` and the file on failure.
pub fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let file = File::open(path).with_context(|| format!("cannot open {} {}", what, path.display()))?;
    serde_json::from_reader(BufReader::new(file)).with_context(|| format!("cannot parse {} {}", what, path.display()))
}

pub fn load_geometry(path: &Path) -> Result<SetupGeometry> {
    let geometry: SetupGeometry = read_json(path, "geometry")?;
    geometry.validate().with_context(|| format!("invalid geometry in {}", path.display()))?;
    info!("geometry loaded from {} ({} detectors)", path.display(), geometry.detectors.len());
    Ok(geometry)
}

/// Alignment offsets, or none at all when no file is configured.
pub fn load_offsets(path: Option<&Path>) -> Result<AlignmentOffsets> {
    match path {
        Some(p) => {
            let offsets: AlignmentOffsets = read_json(p, "alignment offsets")?;
            info!("alignment offsets loaded from {} ({} detectors)", p.display(), offsets.offsets.len());
            Ok(offsets)
        }
        None => Ok(AlignmentOffsets::default()),
    }
}

pub fn load_response_function(path: &Path, name: &str) -> Result<ResponseFunction> {
    let mut function: ResponseFunction = read_json(path, "response function")?;
    if function.name.is_empty() {
        function.name = name.to_string();
    }
    info!(
        "response function '{}' loaded from {} ({} terms, {:?} basis)",
        function.name,
        path.display(),
        function.coefficients.len(),
        function.basis
    );
    Ok(function)
}

pub fn load_response_functions(paths: &ResponsePaths) -> Result<ResponseFunctions> {
    Ok(ResponseFunctions {
        momentum_over_charge: load_response_function(&paths.momentum_over_charge, "momentum_over_charge")?,
        flight_path: load_response_function(&paths.flight_path, "flight_path")?,
        tx0: load_response_function(&paths.tx0, "tx0")?,
        ty0: load_response_function(&paths.ty0, "ty0")?,
        tx1: load_response_function(&paths.tx1, "tx1")?,
        ty1: load_response_function(&paths.ty1, "ty1")?,
    })
}

pub fn load_charge_table(path: &Path) -> Result<ChargeCalibration> {
    let text = fs::read_to_string(path).with_context(|| format!("cannot read charge table {}", path.display()))?;
    let table = ChargeCalibration::from_table_str(&text).with_context(|| format!("in charge table {}", path.display()))?;
    info!("charge calibration loaded from {} ({} bars)", path.display(), table.len());
    Ok(table)
}

/// Loads every input named by the manifest and builds the reconstructor.
///
/// Any failure here is fatal for the run; nothing has been processed yet.
pub fn load_reconstructor(manifest: &RunManifest) -> Result<Reconstructor> {
    let geometry = load_geometry(&manifest.geometry)?;
    let offsets = load_offsets(manifest.offsets.as_deref())?;
    let functions = load_response_functions(&manifest.response_functions)?;
    let charge = load_charge_table(&manifest.charge_table)?;
    Reconstructor::new(manifest.config.clone(), geometry, offsets, functions, charge)
        .context("cannot initialize the reconstruction")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    use trackcore::config::TrackingConfig;
    use trackcore::data::detector::DetectorId;
    use trackcore::geometry::setup::DetectorPlacement;
    use trackcore::geometry::vector::Vec3;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        File::create(&path).unwrap().write_all(content.as_bytes()).unwrap();
        path
    }

    fn geometry_json() -> String {
        let detectors = DetectorId::ALL
            .iter()
            .enumerate()
            .map(|(i, &d)| (d, DetectorPlacement::new(d.default_axis(), Vec3::ZERO, Vec3::new(0.0, 0.0, 10.0 * i as f64))))
            .collect();
        serde_json::to_string(&SetupGeometry::new(detectors)).unwrap()
    }

    fn constant_json(value: f64) -> String {
        serde_json::to_string(&ResponseFunction::constant("", 8, value)).unwrap()
    }

    fn manifest(dir: &Path) -> RunManifest {
        let fp = write(dir, "fp.json", &constant_json(700.0));
        let zero = write(dir, "zero.json", &constant_json(0.0));
        RunManifest {
            geometry: write(dir, "geometry.json", &geometry_json()),
            offsets: None,
            response_functions: ResponsePaths {
                momentum_over_charge: write(dir, "poq.json", &constant_json(12.0)),
                flight_path: fp,
                tx0: zero.clone(),
                ty0: zero.clone(),
                tx1: zero.clone(),
                ty1: zero,
            },
            charge_table: write(dir, "charge.txt", "# a b c\n0.0 1.0 0.0\n0.0 2.0 0.0\n"),
            config: TrackingConfig::default(),
            alignment: None,
        }
    }

    #[test]
    fn test_load_reconstructor() {
        let dir = tempfile::tempdir().unwrap();
        let rec = load_reconstructor(&manifest(dir.path())).unwrap();
        assert_eq!(rec.config().caps.max_tracks, 500);
    }

    #[test]
    fn test_response_function_gets_default_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "f.json", &constant_json(1.0));
        assert_eq!(load_response_function(&path, "ty1").unwrap().name, "ty1");
    }

    #[test]
    fn test_broken_table_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = manifest(dir.path());
        m.charge_table = write(dir.path(), "bad.txt", "1 2 x\n");
        let err = load_reconstructor(&m).unwrap_err();
        let msg = format!("{:#}", err);
        assert!(msg.contains("bad.txt"));
        assert!(msg.contains("line 1"));
    }

    #[test]
    fn test_missing_offsets_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = manifest(dir.path());
        m.offsets = Some(dir.path().join("nope.json"));
        assert!(load_reconstructor(&m).is_err());
        assert!(load_offsets(None).unwrap().offsets.is_empty());
    }
}
