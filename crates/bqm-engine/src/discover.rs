//! Directory discovery.
//!
//! Every regular, non-hidden `*.sql` file in the migrations directory must
//! follow the naming contract; anything else in the directory is ignored.

use std::path::Path;

use bqm_core::migration::{MigrationFile, ParseOptions, order_by_version};

use crate::{Error, Result};

/// Read and parse all migration scripts in `dir`, ordered by version.
///
/// Fails on the first malformed name or on duplicate versions, before any
/// script is run.
pub async fn discover(dir: &Path, opts: &ParseOptions) -> Result<Vec<MigrationFile>> {
  let discovery_err = |source| Error::Discovery { path: dir.to_path_buf(), source };

  let mut entries = tokio::fs::read_dir(dir).await.map_err(discovery_err)?;
  let mut files = Vec::new();

  while let Some(entry) = entries.next_entry().await.map_err(discovery_err)? {
    let name = entry.file_name().to_string_lossy().into_owned();
    if name.starts_with('.') || !name.ends_with(".sql") {
      continue;
    }

    let path = entry.path();
    let meta = tokio::fs::metadata(&path)
      .await
      .map_err(|source| Error::ReadScript { path: path.clone(), source })?;
    if !meta.is_file() {
      continue;
    }

    let content = tokio::fs::read_to_string(&path)
      .await
      .map_err(|source| Error::ReadScript { path: path.clone(), source })?;
    files.push(MigrationFile::parse(path, content, opts)?);
  }

  tracing::debug!(dir = %dir.display(), count = files.len(), "discovered migration scripts");
  Ok(order_by_version(files)?)
}
