//! Service entries and the normalization step applied before transmission.
//!
//! Every resolver hands back raw JSON: either one object or an array of objects.
//! [`EntryNormalizer`] turns that into a flat list of [`ServiceEntry`] values and
//! stamps each one with the creation and expiry times the registry requires.

use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value, json};
use tracing::error;

use crate::LOG_TARGET;

/// One service endpoint record as exchanged with the registry
pub type ServiceEntry = Map<String, Value>;

pub const SERVICE_ENDPOINT_ID: &str = "Service_Endpoint_ID";
pub const SERVICE_ENDPOINT_URL: &str = "Service_Endpoint_URL";
pub const SERVICE_CREATION_TIME: &str = "Service_CreationTime";
pub const SERVICE_EXPIRE_ON: &str = "Service_ExpireOn";

// The registry rejects fractional seconds and numeric UTC offsets, so the
// sub-second part is always a literal ".000" followed by "Z".
const REGISTRY_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S.000Z";

/// Format an instant the way the registry expects it
pub fn registry_timestamp(at: DateTime<Utc>) -> String {
	at.format(REGISTRY_TIME_FORMAT).to_string()
}

/// Wrap a timestamp into the `{"$date": ...}` object used by the registry
pub fn date_value(at: DateTime<Utc>) -> Value {
	json!({ "$date": registry_timestamp(at) })
}

/// The endpoint identifier of an entry, if it carries one as a string
pub fn endpoint_id(entry: &ServiceEntry) -> Option<&str> {
	entry.get(SERVICE_ENDPOINT_ID).and_then(Value::as_str)
}

/// The endpoint URL of an entry, if it carries one as a string
pub fn endpoint_url(entry: &ServiceEntry) -> Option<&str> {
	entry.get(SERVICE_ENDPOINT_URL).and_then(Value::as_str)
}

/// Short human readable identity used in log lines
pub fn describe(entry: &ServiceEntry) -> String {
	match (endpoint_id(entry), endpoint_url(entry)) {
		(Some(id), Some(url)) => format!("Endpoint ID: {id}; URL: {url}"),
		(Some(id), None) => format!("Endpoint ID: {id}"),
		(None, Some(url)) => format!("Endpoint URL: {url}"),
		(None, None) => "anonymous endpoint".to_string(),
	}
}

/// Shapes resolver output into a list of entries and injects the registry timestamps.
#[derive(Debug, Clone, Copy)]
pub struct EntryNormalizer {
	validity: Duration,
}

impl EntryNormalizer {
	pub fn new(validity_hours: i64) -> Self {
		Self {
			validity: Duration::hours(validity_hours),
		}
	}

	/// Normalize using the current time
	pub fn normalize(&self, raw: Value) -> Vec<ServiceEntry> {
		self.normalize_at(raw, Utc::now())
	}

	/// Normalize against a fixed instant.
	///
	/// A lone object becomes a one element list. Elements that are not JSON objects
	/// cannot be registered; they are logged and dropped.
	pub fn normalize_at(&self, raw: Value, now: DateTime<Utc>) -> Vec<ServiceEntry> {
		let items = match raw {
			Value::Array(items) => items,
			other => vec![other],
		};

		let created = date_value(now);
		let expires = date_value(now + self.validity);

		items
			.into_iter()
			.filter_map(|item| match item {
				Value::Object(mut entry) => {
					entry.insert(SERVICE_CREATION_TIME.to_string(), created.clone());
					entry.insert(SERVICE_EXPIRE_ON.to_string(), expires.clone());
					Some(entry)
				},
				other => {
					error!(
						target: LOG_TARGET,
						"Message composing error: entry is not a JSON object: {}", other
					);
					None
				},
			})
			.collect()
	}
}
