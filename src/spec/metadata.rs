// ============================================================================
// File: packages/adles/src/spec/metadata.rs
// ----------------------------------------------------------------------------
// Exercise metadata section
// ============================================================================

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The `metadata` section of an exercise specification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Metadata {
    /// Exercise name (defaults to the specification file stem)
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub version: Option<String>,

    /// Name of the environment root folder, overriding `name`
    #[serde(default)]
    pub folder_name: Option<String>,

    /// Prefix prepended to platform-visible names
    #[serde(default)]
    pub prefix: Option<String>,

    /// Infrastructure configuration file
    #[serde(default)]
    pub infra_file: Option<PathBuf>,

    /// Folder path on the platform under which the root folder is created
    #[serde(default)]
    pub root_path: Option<String>,

    /// Folder path on the platform holding VM templates
    #[serde(default)]
    pub template_path: Option<String>,
}

impl Metadata {
    /// Name of the environment root folder
    pub fn root_folder_name(&self) -> &str {
        self.folder_name
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or("adles-environment")
    }

    /// Platform folder path the root folder is created under
    pub fn root_path(&self) -> &str {
        self.root_path.as_deref().unwrap_or("")
    }

    /// Display name for log output
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.root_folder_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_name_overrides_name() {
        let metadata = Metadata {
            name: Some("competition".into()),
            folder_name: Some("CDC 2024".into()),
            ..Metadata::default()
        };
        assert_eq!(metadata.root_folder_name(), "CDC 2024");
        assert_eq!(metadata.display_name(), "competition");

        let metadata = Metadata {
            name: Some("competition".into()),
            ..Metadata::default()
        };
        assert_eq!(metadata.root_folder_name(), "competition");
    }

    #[test]
    fn rejects_unknown_keys() {
        let result: Result<Metadata, _> = serde_yaml::from_str("name: x\ncolour: red\n");
        assert!(result.is_err());
    }
}
