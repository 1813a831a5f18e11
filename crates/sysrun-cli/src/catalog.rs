//! The minimal in-process descriptor catalog: a TOML manifest parsed into
//! [`sysrun_core::Descriptor`] values. This is the thin front-end
//! SPEC_FULL.md §0/§1 calls for in place of the out-of-scope XML discovery
//! layer — it never grows process-spawning or outcome logic of its own, it
//! only turns a manifest file into `Descriptor`s the engine can run.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use sysrun_core::{Descriptor, DescriptorState};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read catalog manifest '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse catalog manifest '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(rename = "test", default)]
    tests: Vec<ManifestEntry>,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    id: String,
    #[serde(default)]
    module: String,
    class_name: String,
    #[serde(default = "default_dot")]
    input: String,
    #[serde(default = "default_dot")]
    output: String,
    #[serde(default)]
    modes: Vec<String>,
    #[serde(default)]
    deprecated: bool,
    #[serde(default)]
    purpose: String,
    #[serde(default)]
    title: String,
}

fn default_dot() -> String {
    ".".to_string()
}

/// Parse a TOML catalog manifest into a list of [`Descriptor`]s. `base_dir`
/// anchors each entry's relative `input`/`output` directories (typically the
/// manifest file's own parent directory).
pub fn load_manifest(path: &Path) -> Result<Vec<Descriptor>, CatalogError> {
    let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Read { path: path.to_path_buf(), source })?;
    let manifest: Manifest = toml::from_str(&text).map_err(|source| CatalogError::Parse { path: path.to_path_buf(), source })?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

    Ok(manifest
        .tests
        .into_iter()
        .map(|entry| Descriptor {
            id: entry.id,
            module: entry.module,
            class_name: entry.class_name,
            input: base_dir.join(entry.input),
            output: base_dir.join(entry.output),
            modes: entry.modes,
            state: if entry.deprecated { DescriptorState::Deprecated } else { DescriptorState::Runnable },
            purpose: entry.purpose,
            title: entry.title,
        })
        .collect())
}
