// JSON document sources: one file, or every file in a directory

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info};

use crate::LOG_TARGET;
use crate::error::SourceError;

/// Load a single JSON document. Any failure is fatal for the source.
pub(super) async fn load_document(path: &Path) -> Result<Value, SourceError> {
	if !tokio::fs::try_exists(path).await? {
		return Err(SourceError::FileNotFound(path.to_path_buf()));
	}
	info!(target: LOG_TARGET, "Loading service entries from file: {}", path.display());
	let content = fs_err::tokio::read_to_string(path).await?;
	serde_json::from_str(&content).map_err(|e| SourceError::parse(path, e))
}

/// Load and merge every parseable JSON document in a directory.
///
/// Files that cannot be opened or parsed are skipped. Arrays are flattened one
/// level, anything else is appended as a single element. Files are visited in
/// name order so repeated cycles produce the same payload.
pub(super) async fn load_directory(path: &Path) -> Result<Vec<Value>, SourceError> {
	let mut dir = fs_err::tokio::read_dir(path)
		.await
		.map_err(|source| SourceError::NotADirectory {
			path: path.to_path_buf(),
			source,
		})?;

	let mut files: Vec<PathBuf> = Vec::new();
	while let Some(entry) = dir.next_entry().await? {
		files.push(entry.path());
	}
	files.sort();

	let mut entries = Vec::new();
	for file in &files {
		match read_json(file).await {
			Some(Value::Array(items)) => entries.extend(items),
			Some(doc) => entries.push(doc),
			None => {},
		}
	}

	if entries.is_empty() {
		return Err(SourceError::EmptyDirectory(path.to_path_buf()));
	}
	info!(
		target: LOG_TARGET,
		"Loaded {} service entries from {} files in {}",
		entries.len(),
		files.len(),
		path.display()
	);
	Ok(entries)
}

async fn read_json(path: &Path) -> Option<Value> {
	let content = match fs_err::tokio::read_to_string(path).await {
		Ok(content) => content,
		Err(e) => {
			debug!(target: LOG_TARGET, "Skipping unreadable file: {}", e);
			return None;
		},
	};
	match serde_json::from_str(&content) {
		Ok(doc) => Some(doc),
		Err(e) => {
			debug!(target: LOG_TARGET, "Skipping {}: {}", path.display(), e);
			None
		},
	}
}
