//! Writing bundles and deploying scripts
//!
//! Writes are plain overwrites, not temp-file-and-rename. Callers only reach this
//! module after resolution has fully succeeded.

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::{debug, info};

use crate::{
    config::BUNDLE_FILE_NAME,
    error::{BundleError, Result},
};

/// Write `text` as the bundle file inside `output_dir`, creating the directory
pub fn write_bundle(output_dir: &Path, text: &str) -> Result<PathBuf> {
    let bundle_path = output_dir.join(BUNDLE_FILE_NAME);
    create_dir_all(output_dir)?;

    fs::write(&bundle_path, text).map_err(|source| BundleError::Write {
        path: bundle_path.clone(),
        source,
    })?;
    debug!("Wrote {} bytes to {}", text.len(), bundle_path.display());
    Ok(bundle_path)
}

/// Copy `source_path` into `target_dir` under its own file name, replacing
/// whatever is there. Returns the deployed path.
pub fn deploy(source_path: &Path, target_dir: &Path) -> Result<PathBuf> {
    create_dir_all(target_dir)?;

    let file_name = source_path
        .file_name()
        .ok_or_else(|| BundleError::EntryNotFound {
            path: source_path.to_path_buf(),
        })?;
    let deploy_path = target_dir.join(file_name);

    let contents = fs::read(source_path).map_err(|source| BundleError::Read {
        path: source_path.to_path_buf(),
        source,
    })?;
    fs::write(&deploy_path, contents).map_err(|source| BundleError::Write {
        path: deploy_path.clone(),
        source,
    })?;

    info!(
        "Deployed {} to {}",
        source_path.display(),
        deploy_path.display()
    );
    Ok(deploy_path)
}

fn create_dir_all(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|source| BundleError::Write {
        path: dir.to_path_buf(),
        source,
    })
}
