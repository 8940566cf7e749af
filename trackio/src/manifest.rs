use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use trackcore::algorithm::alignment::AlignmentSettings;
use trackcore::config::TrackingConfig;

/// Coefficient files of the six response functions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponsePaths {
    pub momentum_over_charge: PathBuf,
    pub flight_path: PathBuf,
    pub tx0: PathBuf,
    pub ty0: PathBuf,
    pub tx1: PathBuf,
    pub ty1: PathBuf,
}

impl ResponsePaths {
    fn paths_mut(&mut self) -> [&mut PathBuf; 6] {
        [&mut self.momentum_over_charge, &mut self.flight_path, &mut self.tx0, &mut self.ty0, &mut self.tx1, &mut self.ty1]
    }
}

/// Describes one reconstruction or alignment run.
///
/// Relative paths are resolved against the directory holding the manifest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub geometry: PathBuf,
    #[serde(default)]
    pub offsets: Option<PathBuf>,
    pub response_functions: ResponsePaths,
    pub charge_table: PathBuf,
    #[serde(default)]
    pub config: TrackingConfig,
    #[serde(default)]
    pub alignment: Option<AlignmentSettings>,
}

fn rebase(base: &Path, path: &mut PathBuf) {
    if path.is_relative() {
        *path = base.join(&*path);
    }
}

impl RunManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("cannot open run manifest {}", path.display()))?;
        let mut manifest: RunManifest = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("cannot parse run manifest {}", path.display()))?;
        if let Some(base) = path.parent() {
            manifest.resolve(base);
        }
        Ok(manifest)
    }

    /// Makes every relative path relative to `base` instead.
    pub fn resolve(&mut self, base: &Path) {
        rebase(base, &mut self.geometry);
        if let Some(offsets) = self.offsets.as_mut() {
            rebase(base, offsets);
        }
        for p in self.response_functions.paths_mut() {
            rebase(base, p);
        }
        rebase(base, &mut self.charge_table);
    }
}
