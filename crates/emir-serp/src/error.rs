// Error types for configuration, source resolution and registry traffic

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading the configuration file. All of them are fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("configuration file cannot be found on path: {}", .0.display())]
	NotFound(PathBuf),

	#[error("failed to read configuration file: {0}")]
	Read(#[from] ini::Error),

	#[error("section '{0}' is missing from the configuration file")]
	MissingSection(String),

	#[error("the '{key}' item cannot be found in '{section}' section")]
	MissingKey { section: String, key: String },

	#[error("invalid URL format in url attribute: {0}")]
	InvalidUrl(String),

	#[error("invalid value '{value}' for '{key}': {message}")]
	InvalidValue {
		key: String,
		value: String,
		message: String,
	},

	#[error("{kind} file cannot be found on path: {}", path.display())]
	MissingCredential { kind: &'static str, path: PathBuf },

	#[error("{kind} file cannot be read: {source}")]
	UnreadableCredential {
		kind: &'static str,
		path: PathBuf,
		source: std::io::Error,
	},
}

impl ConfigError {
	pub fn missing_key(section: impl Into<String>, key: impl Into<String>) -> Self {
		Self::MissingKey {
			section: section.into(),
			key: key.into(),
		}
	}

	pub fn invalid_value(
		key: impl Into<String>,
		value: impl Into<String>,
		message: impl Into<String>,
	) -> Self {
		Self::InvalidValue {
			key: key.into(),
			value: value.into(),
			message: message.into(),
		}
	}
}

/// Errors that make a single source yield no entries for the current cycle
#[derive(Error, Debug)]
pub enum SourceError {
	#[error("JSON file cannot be found on path: {}", .0.display())]
	FileNotFound(PathBuf),

	#[error("failed to read source: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON object problem in file {}: {source}", path.display())]
	Parse {
		path: PathBuf,
		source: serde_json::Error,
	},

	#[error("'{}' is not a readable directory: {source}", path.display())]
	NotADirectory {
		path: PathBuf,
		source: std::io::Error,
	},

	#[error("no proper JSON document has been found in the '{}' directory", .0.display())]
	EmptyDirectory(PathBuf),

	#[error("invalid directory service URL '{url}': {message}")]
	InvalidDirectoryUrl { url: String, message: String },

	#[error("directory service query failed: {0}")]
	Directory(#[from] ldap3::LdapError),

	#[error("directory service query timed out after {0:?}")]
	DirectoryTimeout(std::time::Duration),

	#[error("directory service returned more than {0} records")]
	DirectoryLimit(usize),
}

impl SourceError {
	pub fn parse(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
		Self::Parse {
			path: path.into(),
			source,
		}
	}

	pub fn invalid_url(url: impl Into<String>, message: impl Into<String>) -> Self {
		Self::InvalidDirectoryUrl {
			url: url.into(),
			message: message.into(),
		}
	}
}

/// Errors talking to the registry
#[derive(Error, Debug)]
pub enum RegistryError {
	#[error("failed to build HTTP client: {0}")]
	Client(String),

	#[error("failed to read TLS material {}: {source}", path.display())]
	Tls {
		path: PathBuf,
		source: std::io::Error,
	},

	#[error("HTTP request failed: {0}")]
	Transport(#[from] reqwest::Error),

	#[error("{reason} ({status}): {body}")]
	Status {
		status: u16,
		reason: String,
		body: String,
	},

	#[error("failed to encode or decode registry message: {0}")]
	Codec(#[from] serde_json::Error),

	#[error("unexpected registry response: {0}")]
	UnexpectedResponse(String),
}

impl RegistryError {
	/// Error for a non-success response.
	///
	/// The reason is the canonical phrase of the status code. reqwest does not hand
	/// out the phrase sent on the status line, so a custom one is not reported.
	pub fn status(status: reqwest::StatusCode, body: impl Into<String>) -> Self {
		Self::Status {
			status: status.as_u16(),
			reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
			body: body.into(),
		}
	}
}
