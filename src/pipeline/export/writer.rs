use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{ReconcileError, Result};
use crate::observability::metrics::{emit_counter, MetricName};

const STAGING_PREFIX: &str = ".staging-";

/// A fully rendered output file, not yet on disk.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactDigest {
    pub file: String,
    pub sha256: String,
    pub bytes: usize,
}

impl Artifact {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn digest(&self) -> ArtifactDigest {
        ArtifactDigest {
            file: self.file_name.clone(),
            sha256: hex::encode(Sha256::digest(&self.bytes)),
            bytes: self.bytes.len(),
        }
    }
}

fn check_file_name(name: &str) -> Result<()> {
    let plain = Path::new(name)
        .file_name()
        .map(|f| f == std::ffi::OsStr::new(name))
        .unwrap_or(false);
    if plain && !name.starts_with(STAGING_PREFIX) {
        Ok(())
    } else {
        Err(ReconcileError::Config(format!(
            "output file name must be a plain file name: {:?}",
            name
        )))
    }
}

/// Writes every artifact into a staging directory under `dir`, then swaps
/// them into place. Replaced files are kept aside until every swap succeeded
/// and are restored otherwise, so `dir` holds either the old set or the new.
pub fn commit_artifacts(dir: &Path, artifacts: &[Artifact]) -> Result<Vec<PathBuf>> {
    let mut seen = HashSet::new();
    for artifact in artifacts {
        check_file_name(&artifact.file_name)?;
        if !seen.insert(artifact.file_name.as_str()) {
            return Err(ReconcileError::Config(format!(
                "two outputs are named {}",
                artifact.file_name
            )));
        }
    }
    fs::create_dir_all(dir)?;
    for artifact in artifacts {
        check_target(&dir.join(&artifact.file_name))?;
    }

    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(dir)?;
    let new_dir = staging.path().join("new");
    let old_dir = staging.path().join("old");
    fs::create_dir(&new_dir)?;
    fs::create_dir(&old_dir)?;
    for artifact in artifacts {
        let staged = new_dir.join(&artifact.file_name);
        fs::write(&staged, &artifact.bytes)?;
        debug!("Staged {} ({} bytes)", staged.display(), artifact.bytes.len());
    }

    let mut journal = Vec::with_capacity(artifacts.len());
    if let Err(e) = swap_in(dir, &new_dir, &old_dir, artifacts, &mut journal) {
        roll_back(&journal);
        return Err(e.into());
    }

    let written: Vec<PathBuf> = journal.into_iter().map(|swap| swap.target).collect();
    let total_bytes: usize = artifacts.iter().map(|a| a.bytes.len()).sum();
    emit_counter(MetricName::ExportArtifactsWritten, written.len() as f64);
    emit_counter(MetricName::ExportBytesWritten, total_bytes as f64);
    info!(
        "Wrote {} artifacts ({} bytes) to {}",
        written.len(),
        total_bytes,
        dir.display()
    );
    Ok(written)
}

/// An existing target must be something a rename can replace.
fn check_target(target: &Path) -> Result<()> {
    match fs::symlink_metadata(target) {
        Ok(meta) if meta.is_dir() => Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} exists and is a directory", target.display()),
        )
        .into()),
        _ => Ok(()),
    }
}

struct Swap {
    target: PathBuf,
    backup: Option<PathBuf>,
    placed: bool,
}

fn swap_in(
    dir: &Path,
    new_dir: &Path,
    old_dir: &Path,
    artifacts: &[Artifact],
    journal: &mut Vec<Swap>,
) -> io::Result<()> {
    for artifact in artifacts {
        let target = dir.join(&artifact.file_name);
        let backup = if fs::symlink_metadata(&target).is_ok() {
            let backup = old_dir.join(&artifact.file_name);
            fs::rename(&target, &backup)?;
            Some(backup)
        } else {
            None
        };
        journal.push(Swap {
            target,
            backup,
            placed: false,
        });
        if let Some(swap) = journal.last_mut() {
            fs::rename(new_dir.join(&artifact.file_name), &swap.target)?;
            swap.placed = true;
        }
    }
    Ok(())
}

fn roll_back(journal: &[Swap]) {
    for swap in journal.iter().rev() {
        if swap.placed {
            if let Err(e) = fs::remove_file(&swap.target) {
                warn!("Could not remove {}: {}", swap.target.display(), e);
            }
        }
        if let Some(backup) = &swap.backup {
            if let Err(e) = fs::rename(backup, &swap.target) {
                warn!("Could not restore {}: {}", swap.target.display(), e);
            }
        }
    }
}
