//! SHA-256 digests of the stage artifacts.
//!
//! A rerun on unchanged inputs and thresholds must reproduce every
//! digest; the comparison against the previous manifest shows which
//! artifacts moved.

use std::fs::File;
use std::io::{BufReader, Read as _};
use std::path::{Path, PathBuf};

use crash_hotspots_config::paths::DataPaths;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::{CheckResult, ValidateError};

/// Digest of one artifact, keyed by its path under the data root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDigest {
    pub artifact: String,
    pub bytes: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub artifacts: Vec<ArtifactDigest>,
}

impl Manifest {
    #[must_use]
    pub fn get(&self, artifact: &str) -> Option<&ArtifactDigest> {
        self.artifacts.iter().find(|a| a.artifact == artifact)
    }
}

/// Artifacts covered by the manifest, in manifest order.
#[must_use]
pub fn tracked_artifacts(paths: &DataPaths) -> Vec<PathBuf> {
    vec![
        paths.crashes_with_nodes(),
        paths.snap_run(),
        paths.people_with_nodes(),
        paths.features_temporal(),
        paths.imputation_summary(),
    ]
}

/// Streams a file through SHA-256.
///
/// # Errors
///
/// Returns [`ValidateError::Io`] if the file cannot be read.
pub fn digest_file(root: &Path, path: &Path) -> Result<ArtifactDigest, ValidateError> {
    let io_error = |source| ValidateError::Io {
        path: path.display().to_string(),
        source,
    };
    let mut reader = BufReader::new(File::open(path).map_err(io_error)?);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    let mut bytes = 0u64;
    loop {
        let n = reader.read(&mut buf).map_err(io_error)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        bytes += n as u64;
    }

    let artifact = path
        .strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/");
    Ok(ArtifactDigest {
        artifact,
        bytes,
        sha256: hex::encode(hasher.finalize()),
    })
}

/// Digests every tracked artifact that exists.
///
/// # Errors
///
/// Returns [`ValidateError::Io`] if an existing artifact cannot be read.
pub fn build(paths: &DataPaths) -> Result<Manifest, ValidateError> {
    let mut artifacts = Vec::new();
    for path in tracked_artifacts(paths) {
        if path.exists() {
            let digest = digest_file(paths.root(), &path)?;
            log::debug!("{} {}", digest.sha256, digest.artifact);
            artifacts.push(digest);
        }
    }
    Ok(Manifest { artifacts })
}

/// Compares against the previous run's manifest. Changed digests warn.
#[must_use]
pub fn compare(previous: Option<&Manifest>, current: &Manifest) -> CheckResult {
    let Some(previous) = previous else {
        return CheckResult::pass(
            "manifest",
            format!(
                "no previous manifest, recorded {} artifacts",
                current.artifacts.len()
            ),
        );
    };

    let mut changed = Vec::new();
    let mut added = Vec::new();
    for digest in &current.artifacts {
        match previous.get(&digest.artifact) {
            Some(old) if old.sha256 == digest.sha256 => {}
            Some(_) => changed.push(digest.artifact.as_str()),
            None => added.push(digest.artifact.as_str()),
        }
    }

    if !changed.is_empty() {
        CheckResult::warn(
            "manifest",
            format!("changed since previous run: {}", changed.join(", ")),
        )
    } else if added.is_empty() {
        CheckResult::pass(
            "manifest",
            format!(
                "{} artifacts byte-identical to previous run",
                current.artifacts.len()
            ),
        )
    } else {
        CheckResult::pass(
            "manifest",
            format!("unchanged, newly recorded: {}", added.join(", ")),
        )
    }
}
