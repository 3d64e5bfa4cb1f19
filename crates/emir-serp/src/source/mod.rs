// Service sources
//
// A source is one named configuration section describing where entries come from:
// - a single JSON document
// - a directory of JSON documents
// - a GLUE2 directory service queried over LDAP
//
// The variant is decided once when the configuration is loaded; every cycle
// dispatches straight to the matching resolver.

mod directory;
mod file;
mod glue2;

use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

pub use directory::{
	DEFAULT_BASE, DEFAULT_PORT, DEFAULT_QUERY_TIMEOUT, DirectoryEndpoint, DirectoryRecord,
	DirectorySearch, LdapSearch, MAX_DIRECTORY_RECORDS, RawRecord, join_records, partition_records,
};
pub use glue2::{ATTRIBUTE_MAP, FILTER, SEARCH_ATTRIBUTES, remap_attributes};

use crate::LOG_TARGET;
use crate::error::{ConfigError, SourceError};

/// Key selecting a directory service query
pub const DIRECTORY_URL_KEY: &str = "resource_bdii_url";
/// Optional per-source override of the directory query timeout, in seconds
pub const DIRECTORY_TIMEOUT_KEY: &str = "ldap_timeout";
/// Key selecting a directory of JSON documents
pub const JSON_DIR_KEY: &str = "json_dir_location";
/// Key selecting a single JSON document
pub const JSON_FILE_KEY: &str = "json_file_location";

/// Where the entries of one named source come from
#[derive(Debug, Clone, PartialEq)]
pub enum SourceDescriptor {
	/// A single JSON document, either an object or an array of objects
	FileDoc { path: PathBuf },
	/// Every JSON document found in a directory
	DirDocs { path: PathBuf },
	/// A GLUE2 directory service
	DirectoryQuery {
		url: String,
		timeout: Duration,
	},
	/// None of the recognized keys were present
	Empty,
}

impl SourceDescriptor {
	/// Classify a section by the keys it defines.
	///
	/// Precedence is directory query, then directory of files, then single file.
	/// `lookup` returns the value of a key in the section, if present.
	pub fn classify<'a>(
		lookup: impl Fn(&str) -> Option<&'a str>,
	) -> Result<Self, ConfigError> {
		if let Some(url) = lookup(DIRECTORY_URL_KEY) {
			let timeout = match lookup(DIRECTORY_TIMEOUT_KEY) {
				Some(raw) => {
					let secs = raw
						.trim()
						.parse::<u64>()
						.ok()
						.filter(|secs| *secs > 0)
						.ok_or_else(|| {
							ConfigError::invalid_value(
								DIRECTORY_TIMEOUT_KEY,
								raw,
								"expected a positive whole number of seconds",
							)
						})?;
					Duration::from_secs(secs)
				},
				None => DEFAULT_QUERY_TIMEOUT,
			};
			return Ok(Self::DirectoryQuery {
				url: url.trim().to_string(),
				timeout,
			});
		}
		if let Some(path) = lookup(JSON_DIR_KEY) {
			return Ok(Self::DirDocs {
				path: PathBuf::from(path.trim()),
			});
		}
		if let Some(path) = lookup(JSON_FILE_KEY) {
			return Ok(Self::FileDoc {
				path: PathBuf::from(path.trim()),
			});
		}
		Ok(Self::Empty)
	}

	/// Short label used in log lines
	pub fn kind(&self) -> &'static str {
		match self {
			Self::FileDoc { .. } => "file",
			Self::DirDocs { .. } => "directory",
			Self::DirectoryQuery { .. } => "directory service",
			Self::Empty => "empty",
		}
	}

	/// Resolve the source into raw JSON: an object or an array of objects.
	///
	/// An invalid directory service URL or an unreachable directory server is not an
	/// error here: it is logged and the source yields an empty array.
	pub async fn resolve(
		&self,
		name: &str,
		directory: &dyn DirectorySearch,
	) -> Result<Value, SourceError> {
		debug!(target: LOG_TARGET, "Resolving {} source '{}'", self.kind(), name);
		match self {
			Self::FileDoc { path } => file::load_document(path).await,
			Self::DirDocs { path } => file::load_directory(path).await.map(Value::Array),
			Self::DirectoryQuery { url, timeout } => {
				let entries = directory::resolve(url, *timeout, directory).await;
				Ok(Value::Array(entries.into_iter().map(Value::Object).collect()))
			},
			Self::Empty => {
				warn!(
					target: LOG_TARGET,
					"{}, {} or {} has to be defined in '{}' section",
					DIRECTORY_URL_KEY,
					JSON_DIR_KEY,
					JSON_FILE_KEY,
					name
				);
				Ok(Value::Array(Vec::new()))
			},
		}
	}
}

/// A named source in configuration order
#[derive(Debug, Clone, PartialEq)]
pub struct NamedSource {
	pub name: String,
	pub descriptor: SourceDescriptor,
}
