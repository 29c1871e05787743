use serde::{Deserialize, Serialize};

/// The `package.json` manifest carried inside every package archive.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct PackageManifest {
    pub id: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub frameworks: Vec<String>,
}

impl PackageManifest {
    pub fn new(id: &str, version: &str) -> Self {
        PackageManifest {
            id: id.to_string(),
            version: version.to_string(),
            ..Default::default()
        }
    }
}
