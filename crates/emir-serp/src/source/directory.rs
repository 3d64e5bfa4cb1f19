//! GLUE2 directory service source.
//!
//! The directory publishes services and their endpoints as separate objects; an
//! endpoint points at its service through a foreign key. Resolution runs one subtree
//! search, drains every result into memory, and joins each endpoint with its service
//! into one flat registry entry.
//!
//! Resolution is fail-soft: a bad URL, an unreachable server, a protocol error or a
//! timeout is logged and the source contributes no entries to the cycle. Partial
//! results are never returned.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use ldap3::{LdapConnAsync, Scope, SearchEntry};
use percent_encoding::percent_decode_str;
use tracing::{debug, error, info, warn};
use url::Url;

use super::glue2::{
	self, ENDPOINT_CLASS, FILTER, OBJECT_CLASS, SEARCH_ATTRIBUTES, SERVICE_CLASS,
	SERVICE_FOREIGN_KEY, SERVICE_ID,
};
use crate::LOG_TARGET;
use crate::entry::ServiceEntry;
use crate::error::SourceError;

pub const DIRECTORY_SCHEME: &str = "ldap";
pub const DEFAULT_PORT: u16 = 2170;
pub const DEFAULT_BASE: &str = "o=glue";
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);
/// Upper bound on the number of objects drained from one search
pub const MAX_DIRECTORY_RECORDS: usize = 10_000;

/// Multi-valued LDAP attributes by name
pub type Attributes = HashMap<String, Vec<String>>;

/// Where and below which base to search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEndpoint {
	pub host: String,
	pub port: u16,
	pub base: String,
}

impl DirectoryEndpoint {
	/// Parse an `ldap://host[:port][/base]` URL
	pub fn parse(raw: &str) -> Result<Self, SourceError> {
		let url = Url::parse(raw.trim()).map_err(|e| SourceError::invalid_url(raw, e.to_string()))?;
		if url.scheme() != DIRECTORY_SCHEME {
			return Err(SourceError::invalid_url(
				raw,
				format!("unsupported scheme '{}'", url.scheme()),
			));
		}
		let host = match url.host_str() {
			Some(host) if !host.is_empty() => host.to_string(),
			_ => return Err(SourceError::invalid_url(raw, "missing hostname")),
		};
		let base = percent_decode_str(url.path().trim_start_matches('/'))
			.decode_utf8()
			.map_err(|e| SourceError::invalid_url(raw, e.to_string()))?;
		let base = if base.is_empty() {
			DEFAULT_BASE.to_string()
		} else {
			base.into_owned()
		};

		Ok(Self {
			host,
			port: url.port().unwrap_or(DEFAULT_PORT),
			base,
		})
	}

	/// Connection URL without the search base
	pub fn connection_url(&self) -> String {
		format!("{}://{}:{}", DIRECTORY_SCHEME, self.host, self.port)
	}
}

/// One object returned by the directory, before classification
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
	pub dn: String,
	pub attrs: Attributes,
}

impl RawRecord {
	pub fn new(dn: impl Into<String>) -> Self {
		Self {
			dn: dn.into(),
			attrs: HashMap::new(),
		}
	}

	pub fn with_attr(mut self, name: &str, values: &[&str]) -> Self {
		self
			.attrs
			.insert(name.to_string(), values.iter().map(|v| v.to_string()).collect());
		self
	}
}

/// A directory object recognised as either side of the service/endpoint join
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryRecord {
	Service {
		service_id: String,
		attributes: Attributes,
	},
	Endpoint {
		service_foreign_key: String,
		attributes: Attributes,
	},
}

impl DirectoryRecord {
	/// Classify by object class; objects lacking their key attribute are skipped
	pub fn classify(raw: RawRecord) -> Option<Self> {
		let classes = glue2::attribute(&raw.attrs, OBJECT_CLASS).unwrap_or_default();
		let has_class = |class: &str| classes.iter().any(|c| c.eq_ignore_ascii_case(class));

		let first = |name: &str| {
			glue2::attribute(&raw.attrs, name)
				.and_then(|values| values.first())
				.cloned()
		};

		if has_class(ENDPOINT_CLASS) {
			let Some(service_foreign_key) = first(SERVICE_FOREIGN_KEY) else {
				warn!(target: LOG_TARGET, "Endpoint {} has no {}, skipping", raw.dn, SERVICE_FOREIGN_KEY);
				return None;
			};
			Some(Self::Endpoint {
				service_foreign_key,
				attributes: raw.attrs,
			})
		} else if has_class(SERVICE_CLASS) {
			let Some(service_id) = first(SERVICE_ID) else {
				warn!(target: LOG_TARGET, "Service {} has no {}, skipping", raw.dn, SERVICE_ID);
				return None;
			};
			Some(Self::Service {
				service_id,
				attributes: raw.attrs,
			})
		} else {
			debug!(target: LOG_TARGET, "Ignoring directory object {}", raw.dn);
			None
		}
	}
}

/// Runs the fixed GLUE2 search against a directory endpoint
#[async_trait]
pub trait DirectorySearch: Send + Sync {
	async fn search(&self, endpoint: &DirectoryEndpoint) -> Result<Vec<RawRecord>, SourceError>;
}

/// [`DirectorySearch`] over a real LDAP connection
#[derive(Debug, Clone, Copy, Default)]
pub struct LdapSearch;

#[async_trait]
impl DirectorySearch for LdapSearch {
	async fn search(&self, endpoint: &DirectoryEndpoint) -> Result<Vec<RawRecord>, SourceError> {
		let (conn, mut ldap) = LdapConnAsync::new(&endpoint.connection_url()).await?;
		ldap3::drive!(conn);

		let mut stream = ldap
			.streaming_search(&endpoint.base, Scope::Subtree, FILTER, SEARCH_ATTRIBUTES)
			.await?;

		let mut records = Vec::new();
		while let Some(entry) = stream.next().await? {
			if entry.is_ref() || entry.is_intermediate() {
				continue;
			}
			if records.len() == MAX_DIRECTORY_RECORDS {
				return Err(SourceError::DirectoryLimit(MAX_DIRECTORY_RECORDS));
			}
			let entry = SearchEntry::construct(entry);
			records.push(RawRecord {
				dn: entry.dn,
				attrs: entry.attrs,
			});
		}
		stream.finish().await.success()?;
		drop(stream);

		if let Err(e) = ldap.unbind().await {
			debug!(target: LOG_TARGET, "Directory unbind failed: {}", e);
		}
		Ok(records)
	}
}

/// Split classified records into services keyed by ID and endpoints in result order
pub fn partition_records(
	records: impl IntoIterator<Item = DirectoryRecord>,
) -> (HashMap<String, Attributes>, Vec<(String, Attributes)>) {
	let mut services = HashMap::new();
	let mut endpoints = Vec::new();
	for record in records {
		match record {
			DirectoryRecord::Service {
				service_id,
				attributes,
			} => {
				if services.insert(service_id.clone(), attributes).is_some() {
					warn!(target: LOG_TARGET, "Duplicate service {} in directory, keeping the last one", service_id);
				}
			},
			DirectoryRecord::Endpoint {
				service_foreign_key,
				attributes,
			} => endpoints.push((service_foreign_key, attributes)),
		}
	}
	(services, endpoints)
}

/// Join every endpoint with its service and remap the result to registry fields.
///
/// Endpoint attributes override service attributes of the same name. Endpoints
/// whose service is not present are dropped with a warning.
pub fn join_records(records: impl IntoIterator<Item = DirectoryRecord>) -> Vec<ServiceEntry> {
	let (services, endpoints) = partition_records(records);

	endpoints
		.into_iter()
		.filter_map(|(foreign_key, endpoint)| {
			let Some(service) = services.get(&foreign_key) else {
				warn!(
					target: LOG_TARGET,
					"Endpoint references unknown service {}, skipping", foreign_key
				);
				return None;
			};
			let mut merged = service.clone();
			for (name, values) in endpoint {
				merged.retain(|existing, _| !existing.eq_ignore_ascii_case(&name));
				merged.insert(name, values);
			}
			Some(glue2::remap_attributes(&merged))
		})
		.collect()
}

/// Resolve a directory service source. Never fails; problems are logged.
pub(super) async fn resolve(
	url: &str,
	timeout: Duration,
	directory: &dyn DirectorySearch,
) -> Vec<ServiceEntry> {
	let endpoint = match DirectoryEndpoint::parse(url) {
		Ok(endpoint) => endpoint,
		Err(e) => {
			error!(target: LOG_TARGET, "{}", e);
			return Vec::new();
		},
	};

	info!(
		target: LOG_TARGET,
		"Querying directory service {} with base '{}'",
		endpoint.connection_url(),
		endpoint.base
	);

	let records = match tokio::time::timeout(timeout, directory.search(&endpoint)).await {
		Ok(Ok(records)) => records,
		Ok(Err(e)) => {
			error!(target: LOG_TARGET, "Directory service {}: {}", endpoint.connection_url(), e);
			return Vec::new();
		},
		Err(_elapsed) => {
			error!(
				target: LOG_TARGET,
				"Directory service {}: {}",
				endpoint.connection_url(),
				SourceError::DirectoryTimeout(timeout)
			);
			return Vec::new();
		},
	};

	let total = records.len();
	let entries = join_records(records.into_iter().filter_map(DirectoryRecord::classify));
	info!(
		target: LOG_TARGET,
		"Directory service returned {} objects, {} endpoints joined",
		total,
		entries.len()
	);
	entries
}

#[cfg(test)]
#[path = "directory_tests.rs"]
mod tests;
