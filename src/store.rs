use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde_derive::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::curve::CurveModel;
use crate::error::{Error, Result};
use crate::orientation::{CalibrationDiagnostics, InDirection, Orientation, OrientationConfig};

/// On-disk layout of a curve config.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CurveConfigFile {
    pub curve_points: Vec<[f32; 2]>,
    #[serde(rename = "IN_direction", default)]
    pub in_direction: InDirection,
    #[serde(default)]
    pub orientation: Option<Orientation>,
    #[serde(default)]
    pub camera_orientation: Option<String>,
    #[serde(default)]
    pub orientation_diagnostics: Option<CalibrationDiagnostics>,
}

impl CurveConfigFile {
    pub fn new(curve: &CurveModel, config: &OrientationConfig) -> Self {
        Self {
            curve_points: curve.to_pairs(),
            in_direction: config.in_direction,
            orientation: config.multiplier,
            camera_orientation: config.camera_orientation.clone(),
            orientation_diagnostics: config.diagnostics.clone(),
        }
    }

    /// Validates the curve and resolves the orientation. A manual
    /// `IN_direction` wins over any stored multiplier.
    pub fn resolve(self) -> Result<(CurveModel, OrientationConfig)> {
        let curve = CurveModel::from_pairs(&self.curve_points)?;

        let multiplier = match self.in_direction.manual_orientation() {
            Some(manual) => {
                if self.orientation.map_or(false, |o| o != manual) {
                    warn!(
                        in_direction = ?self.in_direction,
                        stored = ?self.orientation,
                        "stored orientation disagrees with IN_direction, using IN_direction"
                    );
                }
                Some(manual)
            }
            None => self.orientation,
        };

        let config = OrientationConfig {
            in_direction: self.in_direction,
            multiplier,
            camera_orientation: self.camera_orientation,
            diagnostics: self.orientation_diagnostics,
        };

        Ok((curve, config))
    }
}

/// JSON file holding a curve together with its resolved orientation.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn load(&self) -> Result<(CurveModel, OrientationConfig)> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::ConfigNotFound(self.path.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        let file: CurveConfigFile = serde_json::from_str(&contents).map_err(|e| {
            Error::MalformedConfig(format!("{}: {}", self.path.display(), e))
        })?;

        let (curve, config) = file.resolve()?;
        info!(
            path = %self.path.display(),
            points = curve.points().len(),
            orientation = ?config.multiplier.map(Orientation::value),
            "curve config loaded"
        );

        Ok((curve, config))
    }

    /// Writes the config next to its final location and renames it into
    /// place, so readers never observe a partial file.
    pub fn save(&self, curve: &CurveModel, config: &OrientationConfig) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let file = CurveConfigFile::new(curve, config);
        let tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer_pretty(&mut writer, &file)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        info!(path = %self.path.display(), "curve config saved");

        Ok(())
    }
}
