// ============================================================================
// File: packages/adles/src/spec/package.rs
// ----------------------------------------------------------------------------
// Package specification: bundles an exercise with its infrastructure,
// scoring and material files.
// ============================================================================

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{AdlesError, AdlesResult, Problem};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PackageMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PackageContents {
    /// Exercise specification
    #[serde(default)]
    pub environment: Option<PathBuf>,

    /// Infrastructure file overriding the exercise's own
    #[serde(default)]
    pub infrastructure: Option<PathBuf>,
    #[serde(default)]
    pub scoring: Option<PathBuf>,
    #[serde(default)]
    pub results: Option<PathBuf>,
    #[serde(default)]
    pub templates: Option<PathBuf>,
    #[serde(default)]
    pub materials: Option<PathBuf>,
}

/// A parsed and checked package specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    pub metadata: PackageMetadata,
    pub contents: PackageContents,

    /// Directory relative content paths are resolved against
    pub base_dir: PathBuf,

    /// Non-fatal findings
    pub warnings: Vec<Problem>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPackage {
    #[serde(default)]
    metadata: Option<PackageMetadata>,
    #[serde(default)]
    contents: Option<PackageContents>,
}

impl PackageSpec {
    /// Load and check a package specification file
    pub fn from_path(path: &Path) -> AdlesResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| AdlesError::io(path, e))?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::from_yaml_str(&text, base_dir)
    }

    /// Parse and check a package specification
    ///
    /// # Arguments
    /// * `text` - YAML document
    /// * `base_dir` - Directory content paths are relative to
    pub fn from_yaml_str(text: &str, base_dir: PathBuf) -> AdlesResult<Self> {
        let raw: RawPackage = serde_yaml::from_str(text)
            .map_err(|e| AdlesError::schema(vec![Problem::new("package", e.to_string())]))?;

        let mut problems = Vec::new();
        let mut warnings = Vec::new();

        let metadata = match raw.metadata {
            Some(metadata) => metadata,
            None => {
                problems.push(Problem::new("metadata", "missing required section"));
                PackageMetadata::default()
            }
        };
        let contents = match raw.contents {
            Some(contents) => contents,
            None => {
                problems.push(Problem::new("contents", "missing required section"));
                PackageContents::default()
            }
        };

        for (key, present) in [
            ("name", metadata.name.is_some()),
            ("description", metadata.description.is_some()),
            ("version", metadata.version.is_some()),
        ] {
            if !present {
                warnings.push(Problem::new(format!("metadata.{key}"), "not specified"));
            }
        }
        for (key, present) in [
            ("timestamp", metadata.timestamp.is_some()),
            ("tag", metadata.tag.is_some()),
        ] {
            if !present {
                problems.push(Problem::new(format!("metadata.{key}"), "required key missing"));
            }
        }

        if contents.environment.is_none() {
            problems.push(Problem::new("contents.environment", "required key missing"));
        }
        for (key, present) in [
            ("infrastructure", contents.infrastructure.is_some()),
            ("scoring", contents.scoring.is_some()),
            ("results", contents.results.is_some()),
            ("templates", contents.templates.is_some()),
            ("materials", contents.materials.is_some()),
        ] {
            if !present {
                warnings.push(Problem::new(format!("contents.{key}"), "not specified"));
            }
        }

        if !problems.is_empty() {
            return Err(AdlesError::schema(problems));
        }

        Ok(Self {
            metadata,
            contents,
            base_dir,
            warnings,
        })
    }

    /// Path of the packaged exercise specification
    pub fn environment_path(&self) -> Option<PathBuf> {
        self.contents.environment.as_ref().map(|p| self.base_dir.join(p))
    }

    /// Path of the packaged infrastructure file, if any
    pub fn infrastructure_path(&self) -> Option<PathBuf> {
        self.contents
            .infrastructure
            .as_ref()
            .map(|p| self.base_dir.join(p))
    }
}
