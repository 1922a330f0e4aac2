use crate::error::Result;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Project detector for identifying the framework flavour and auth/transformer packages.
///
/// The `ProjectDetector` reads the project's `composer.json` and looks at both `require`
/// and `require-dev` for the packages that change how the API is documented:
/// - Laravel (`laravel/framework`) or Lumen (`laravel/lumen-framework`)
/// - Sanctum and Passport (which decide how an `auth:api` guard is documented)
/// - Fractal (transformer-style response classes)
pub struct ProjectDetector;

/// Supported framework flavours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    Laravel,
    Lumen,
}

/// Packages that influence the generated document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Package {
    Sanctum,
    Passport,
    Fractal,
}

/// Result of project detection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionResult {
    /// Detected framework, `None` when `composer.json` names neither
    pub framework: Option<Framework>,
    /// Detected packages
    pub packages: BTreeSet<Package>,
}

impl DetectionResult {
    pub fn has(&self, package: Package) -> bool {
        self.packages.contains(&package)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ComposerManifest {
    #[serde(default)]
    require: serde_json::Map<String, serde_json::Value>,
    #[serde(default, rename = "require-dev")]
    require_dev: serde_json::Map<String, serde_json::Value>,
}

impl ProjectDetector {
    /// Detects the framework and packages of the project at `project_root`.
    ///
    /// A missing `composer.json` yields an empty result rather than an error.
    ///
    /// # Errors
    ///
    /// Returns an error if `composer.json` exists but cannot be read or is not valid JSON.
    pub fn detect(project_root: &Path) -> Result<DetectionResult> {
        let manifest_path = project_root.join("composer.json");
        if !manifest_path.is_file() {
            debug!("No composer.json at {}", project_root.display());
            return Ok(DetectionResult::default());
        }

        let content = fs::read_to_string(&manifest_path)?;
        let result = Self::detect_from_manifest(&content)?;
        info!(
            "Detected framework {:?} with packages {:?}",
            result.framework, result.packages
        );
        Ok(result)
    }

    /// Detects from the raw text of a `composer.json`
    pub fn detect_from_manifest(content: &str) -> Result<DetectionResult> {
        let manifest: ComposerManifest = serde_json::from_str(content)?;
        let mut result = DetectionResult::default();

        for name in manifest.require.keys().chain(manifest.require_dev.keys()) {
            match name.as_str() {
                "laravel/framework" => result.framework = Some(Framework::Laravel),
                "laravel/lumen-framework" => {
                    if result.framework.is_none() {
                        result.framework = Some(Framework::Lumen);
                    }
                }
                "laravel/sanctum" => {
                    result.packages.insert(Package::Sanctum);
                }
                "laravel/passport" | "dusterio/lumen-passport" => {
                    result.packages.insert(Package::Passport);
                }
                "league/fractal" | "spatie/laravel-fractal" => {
                    result.packages.insert(Package::Fractal);
                }
                _ => {}
            }
        }

        Ok(result)
    }
}
