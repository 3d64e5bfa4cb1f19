//! Loading and validation of the INI configuration file.
//!
//! The reserved `[emir-serp]` section holds the registry connection parameters;
//! every other section names one service source. Sources keep the order in which
//! they appear in the file.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use ini::{Ini, ParseOption};
use regex::Regex;

use crate::error::ConfigError;
use crate::source::{NamedSource, SourceDescriptor};

/// Name of the section holding the connection parameters
pub const RESERVED_SECTION: &str = "emir-serp";
/// Section whose options every other section inherits
pub const DEFAULT_SECTION: &str = "DEFAULT";
pub const DEFAULT_REGISTRY_PORT: u16 = 54321;
pub const DEFAULT_CERT: &str = "/etc/grid-security/hostcert.pem";
pub const DEFAULT_KEY: &str = "/etc/grid-security/hostkey.pem";
pub const DEFAULT_CADIR: &str = "/etc/grid-security/certificates";

// A hundred years; keeps expiry arithmetic far away from overflow
const MAX_VALIDITY_HOURS: i64 = 24 * 365 * 100;

static URL_PATTERN: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"^(https?://)?([^:/]+)(:(\d*))?$").expect("valid URL pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
	Http,
	Https,
}

impl Protocol {
	pub fn is_secure(self) -> bool {
		matches!(self, Protocol::Https)
	}
}

impl fmt::Display for Protocol {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Protocol::Http => f.write_str("http"),
			Protocol::Https => f.write_str("https"),
		}
	}
}

/// Log verbosity selected in the configuration file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Verbosity {
	#[default]
	Error,
	Info,
	Debug,
}

impl Verbosity {
	pub fn as_str(self) -> &'static str {
		match self {
			Verbosity::Error => "error",
			Verbosity::Info => "info",
			Verbosity::Debug => "debug",
		}
	}
}

impl FromStr for Verbosity {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"error" => Ok(Verbosity::Error),
			"info" => Ok(Verbosity::Info),
			"debug" => Ok(Verbosity::Debug),
			other => Err(other.to_string()),
		}
	}
}

/// Validated connection parameters and sources. Immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryConfig {
	pub protocol: Protocol,
	pub host: String,
	pub port: u16,
	pub cert: PathBuf,
	pub key: PathBuf,
	pub cadir: PathBuf,
	pub validity_hours: i64,
	pub period: Duration,
	pub verbosity: Verbosity,
	/// A verbosity value that was not recognised and replaced by the default
	pub rejected_verbosity: Option<String>,
	pub sources: Vec<NamedSource>,
}

impl RegistryConfig {
	/// Load and validate a configuration file
	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		if !path.exists() {
			return Err(ConfigError::NotFound(path.to_path_buf()));
		}
		let ini = Ini::load_from_file_opt(path, parse_options())?;
		Self::from_ini(&ini)
	}

	/// Parse configuration from a string, mostly useful for tests
	pub fn parse(content: &str) -> Result<Self, ConfigError> {
		let ini = Ini::load_from_str_opt(content, parse_options()).map_err(ini::Error::Parse)?;
		Self::from_ini(&ini)
	}

	pub fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
		let sections = merge_sections(ini);
		let section = sections
			.iter()
			.find(|s| s.name == RESERVED_SECTION)
			.ok_or_else(|| ConfigError::MissingSection(RESERVED_SECTION.to_string()))?;

		let url = required(section, "url")?;
		let (protocol, host, port) = parse_registry_url(url)?;

		let validity_raw = required(section, "validity")?;
		let validity_hours: i64 = validity_raw
			.trim()
			.parse()
			.ok()
			.filter(|h| (0..=MAX_VALIDITY_HOURS).contains(h))
			.ok_or_else(|| {
				ConfigError::invalid_value("validity", validity_raw, "expected a number of hours")
			})?;

		let period_raw = required(section, "period")?;
		let period = period_raw
			.trim()
			.parse::<f64>()
			.ok()
			.and_then(|secs| Duration::try_from_secs_f64(secs).ok())
			.filter(|d| !d.is_zero())
			.ok_or_else(|| {
				ConfigError::invalid_value("period", period_raw, "expected a positive number of seconds")
			})?;

		let (verbosity, rejected_verbosity) = match section.get("verbosity") {
			None => (Verbosity::default(), None),
			Some(raw) => match raw.trim().parse::<Verbosity>() {
				Ok(v) => (v, None),
				Err(bad) => (Verbosity::default(), Some(bad)),
			},
		};

		let cert = PathBuf::from(section.get("cert").unwrap_or(DEFAULT_CERT));
		let key = PathBuf::from(section.get("key").unwrap_or(DEFAULT_KEY));
		let cadir = PathBuf::from(section.get("cadir").unwrap_or(DEFAULT_CADIR));

		if protocol.is_secure() {
			check_readable("key", &key)?;
			check_readable("certificate", &cert)?;
		}

		let mut sources = Vec::new();
		for source in sections.iter().filter(|s| s.name != RESERVED_SECTION) {
			sources.push(NamedSource {
				name: source.name.clone(),
				descriptor: SourceDescriptor::classify(|k| source.get(k))?,
			});
		}

		Ok(Self {
			protocol,
			host,
			port,
			cert,
			key,
			cadir,
			validity_hours,
			period,
			verbosity,
			rejected_verbosity,
			sources,
		})
	}

	/// Base URL of the registry, e.g. `https://registry.example.org:54321`
	pub fn base_url(&self) -> String {
		format!("{}://{}:{}", self.protocol, self.host, self.port)
	}

	pub fn source_names(&self) -> impl Iterator<Item = &str> {
		self.sources.iter().map(|s| s.name.as_str())
	}
}

fn parse_options() -> ParseOption {
	// Paths and LDAP bases are taken literally
	ParseOption {
		enabled_escape: false,
		enabled_quote: false,
		..ParseOption::default()
	}
}

/// One section after merging, with lowercased option names
#[derive(Debug, Default)]
struct Section {
	name: String,
	options: HashMap<String, String>,
}

impl Section {
	fn get(&self, key: &str) -> Option<&str> {
		self.options.get(key).map(String::as_str)
	}
}

/// Flatten the parsed file into sections in order of first appearance.
///
/// Option names are case-insensitive and a repeated section continues the earlier
/// one, later values winning. Options of `[DEFAULT]` apply to every section that
/// does not set them itself; `[DEFAULT]` is not a section of its own.
fn merge_sections(ini: &Ini) -> Vec<Section> {
	let mut defaults = HashMap::new();
	let mut sections: Vec<Section> = Vec::new();

	for (name, props) in ini.iter() {
		let Some(name) = name else {
			continue;
		};
		let options = if name == DEFAULT_SECTION {
			&mut defaults
		} else {
			let index = match sections.iter().position(|s| s.name == name) {
				Some(index) => index,
				None => {
					sections.push(Section {
						name: name.to_string(),
						options: HashMap::new(),
					});
					sections.len() - 1
				},
			};
			&mut sections[index].options
		};
		for (key, value) in props.iter() {
			options.insert(key.to_lowercase(), strip_inline_comment(value).to_string());
		}
	}

	for section in &mut sections {
		for (key, value) in &defaults {
			section
				.options
				.entry(key.clone())
				.or_insert_with(|| value.clone());
		}
	}
	sections
}

/// Cut a trailing comment. `;` only starts one when whitespace precedes it.
fn strip_inline_comment(value: &str) -> &str {
	match value.find(';') {
		Some(pos) if value[..pos].ends_with(char::is_whitespace) => value[..pos].trim_end(),
		_ => value,
	}
}

fn required<'a>(section: &'a Section, key: &str) -> Result<&'a str, ConfigError> {
	section
		.get(key)
		.ok_or_else(|| ConfigError::missing_key(RESERVED_SECTION, key))
}

/// Split `[http[s]://]host[:port]`. A missing scheme means HTTPS.
fn parse_registry_url(url: &str) -> Result<(Protocol, String, u16), ConfigError> {
	let caps = URL_PATTERN
		.captures(url.trim())
		.ok_or_else(|| ConfigError::InvalidUrl(url.to_string()))?;

	let protocol = match caps.get(1).map(|m| m.as_str()) {
		Some("http://") => Protocol::Http,
		_ => Protocol::Https,
	};
	let host = caps[2].to_string();
	let port = match caps.get(4).map(|m| m.as_str()).filter(|p| !p.is_empty()) {
		Some(port) => port
			.parse()
			.map_err(|_| ConfigError::InvalidUrl(url.to_string()))?,
		None => DEFAULT_REGISTRY_PORT,
	};
	Ok((protocol, host, port))
}

fn check_readable(kind: &'static str, path: &Path) -> Result<(), ConfigError> {
	if !path.exists() {
		return Err(ConfigError::MissingCredential {
			kind,
			path: path.to_path_buf(),
		});
	}
	fs_err::File::open(path)
		.map(drop)
		.map_err(|source| ConfigError::UnreadableCredential {
			kind,
			path: path.to_path_buf(),
			source,
		})
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
