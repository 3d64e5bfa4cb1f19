// HTTP client for the service registry

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Certificate, Identity, Method};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::LOG_TARGET;
use crate::compose::RegistrationComposer;
use crate::config::RegistryConfig;
use crate::entry::{self, SERVICE_ENDPOINT_ID, SERVICE_ENDPOINT_URL, ServiceEntry};
use crate::error::RegistryError;

pub const SERVICE_ADMIN_PATH: &str = "/serviceadmin";
pub const SERVICES_PATH: &str = "/services";
pub const PING_PATH: &str = "/ping";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Outcome of a delete run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeleteSummary {
	pub deleted: usize,
	pub failed: usize,
	pub skipped: usize,
}

/// Client for the registry's service administration API.
///
/// Every call composes the entries afresh from the configured sources.
#[derive(Debug, Clone)]
pub struct RegistryClient {
	composer: RegistrationComposer,
	http: reqwest::Client,
	base_url: String,
}

impl RegistryClient {
	/// Create a client with connection parameters fixed by the configuration
	pub fn new(config: Arc<RegistryConfig>) -> Result<Self, RegistryError> {
		Self::with_composer(RegistrationComposer::new(config))
	}

	/// Create a client around an already configured composer
	pub fn with_composer(composer: RegistrationComposer) -> Result<Self, RegistryError> {
		let config = composer.config();
		let http = build_http_client(config)?;
		let base_url = config.base_url();
		Ok(Self {
			composer,
			http,
			base_url,
		})
	}

	pub fn base_url(&self) -> &str {
		&self.base_url
	}

	pub fn composer(&self) -> &RegistrationComposer {
		&self.composer
	}

	/// Check the registry is alive; returns its `RunningSince` value
	pub async fn ping(&self) -> Result<String, RegistryError> {
		let body = self.communicate(Method::GET, PING_PATH, None).await?;
		let doc: Value = serde_json::from_str(&body)?;
		match doc.get("RunningSince") {
			Some(Value::String(since)) => Ok(since.clone()),
			Some(other) => Ok(other.to_string()),
			None => Err(RegistryError::UnexpectedResponse(format!(
				"ping response has no RunningSince: {body}"
			))),
		}
	}

	/// Register all entries (POST)
	pub async fn register(&self) -> Result<Vec<ServiceEntry>, RegistryError> {
		let entries = self.composer.compose().await;
		self.send_entries(Method::POST, &entries).await?;
		Ok(entries)
	}

	/// Replace this client's entries in the registry (PUT)
	pub async fn update(&self) -> Result<Vec<ServiceEntry>, RegistryError> {
		let entries = self.composer.compose().await;
		self.send_entries(Method::PUT, &entries).await?;
		Ok(entries)
	}

	/// Remove every current entry, one request per entry.
	///
	/// Failures are logged and do not stop the remaining deletions.
	pub async fn delete(&self) -> DeleteSummary {
		let entries = self.composer.compose().await;
		self.delete_entries(&entries).await
	}

	/// Remove the given entries, one request per entry
	pub async fn delete_entries(&self, entries: &[ServiceEntry]) -> DeleteSummary {
		let mut summary = DeleteSummary::default();
		for item in entries {
			let Some((key, value)) = entry_key(item) else {
				warn!(target: LOG_TARGET, "Cannot delete an entry without endpoint ID or URL");
				summary.skipped += 1;
				continue;
			};
			let request = self
				.http
				.delete(self.url(SERVICE_ADMIN_PATH))
				.query(&[(key, value)]);
			match self.execute(request).await {
				Ok(_) => {
					info!(target: LOG_TARGET, "Deleted {}", entry::describe(item));
					summary.deleted += 1;
				},
				Err(e) => {
					error!(target: LOG_TARGET, "Delete of {} failed: {}", entry::describe(item), e);
					summary.failed += 1;
				},
			}
		}
		summary
	}

	/// Where an entry can be looked up in the registry after registration
	pub fn lookup_url(&self, item: &ServiceEntry) -> Option<String> {
		let (key, value) = entry_key(item)?;
		let mut url = reqwest::Url::parse(&self.url(SERVICES_PATH)).ok()?;
		url.query_pairs_mut().append_pair(key, value);
		Some(url.to_string())
	}

	async fn send_entries(&self, method: Method, entries: &[ServiceEntry]) -> Result<(), RegistryError> {
		let body = serde_json::to_vec(entries)?;
		self
			.communicate(method.clone(), SERVICE_ADMIN_PATH, Some(body))
			.await?;
		for item in entries {
			match self.lookup_url(item) {
				Some(url) => info!(
					target: LOG_TARGET,
					"{} {}: {}",
					if method == Method::POST { "Registered" } else { "Updated" },
					entry::describe(item),
					url
				),
				None => debug!(target: LOG_TARGET, "Sent anonymous entry"),
			}
		}
		Ok(())
	}

	async fn communicate(
		&self,
		method: Method,
		path: &str,
		body: Option<Vec<u8>>,
	) -> Result<String, RegistryError> {
		let mut request = self.http.request(method, self.url(path));
		if let Some(body) = body {
			request = request.body(body);
		}
		self.execute(request).await
	}

	async fn execute(&self, request: reqwest::RequestBuilder) -> Result<String, RegistryError> {
		let request = request.build()?;
		debug!(target: LOG_TARGET, "{} {}", request.method(), request.url());

		let response = self.http.execute(request).await?;
		let status = response.status();
		let body = response.text().await?;
		if !status.is_success() {
			return Err(RegistryError::status(status, body));
		}
		Ok(body)
	}

	fn url(&self, path: &str) -> String {
		format!("{}{}", self.base_url, path)
	}
}

/// Query parameter identifying an entry: the endpoint ID, or the URL without one
fn entry_key(item: &ServiceEntry) -> Option<(&'static str, &str)> {
	entry::endpoint_id(item)
		.map(|id| (SERVICE_ENDPOINT_ID, id))
		.or_else(|| entry::endpoint_url(item).map(|url| (SERVICE_ENDPOINT_URL, url)))
}

fn build_http_client(config: &RegistryConfig) -> Result<reqwest::Client, RegistryError> {
	let mut headers = HeaderMap::new();
	headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
	headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain"));

	let mut builder = reqwest::Client::builder()
		.default_headers(headers)
		.timeout(DEFAULT_REQUEST_TIMEOUT);

	if config.protocol.is_secure() {
		builder = builder
			.use_rustls_tls()
			.identity(load_identity(&config.cert, &config.key)?);
		for cert in load_ca_dir(&config.cadir) {
			builder = builder.add_root_certificate(cert);
		}
	}

	builder
		.build()
		.map_err(|e| RegistryError::Client(e.to_string()))
}

fn read_pem(path: &Path) -> Result<Vec<u8>, RegistryError> {
	fs_err::read(path).map_err(|source| RegistryError::Tls {
		path: path.to_path_buf(),
		source,
	})
}

fn load_identity(cert: &Path, key: &Path) -> Result<Identity, RegistryError> {
	let mut pem = read_pem(cert)?;
	pem.push(b'\n');
	pem.extend(read_pem(key)?);
	Identity::from_pem(&pem).map_err(|e| RegistryError::Client(format!("invalid client identity: {e}")))
}

/// Trust anchors from a CA directory. Unreadable or non-PEM files are ignored.
fn load_ca_dir(dir: &Path) -> Vec<Certificate> {
	let Ok(entries) = fs_err::read_dir(dir) else {
		debug!(target: LOG_TARGET, "No CA directory at {}", dir.display());
		return Vec::new();
	};
	let mut certs = Vec::new();
	for entry in entries.flatten() {
		let path = entry.path();
		let Ok(pem) = fs_err::read(&path) else {
			continue;
		};
		match Certificate::from_pem_bundle(&pem) {
			Ok(found) => certs.extend(found),
			Err(_) => debug!(target: LOG_TARGET, "Skipping {} in CA directory", path.display()),
		}
	}
	debug!(target: LOG_TARGET, "Loaded {} CA certificates from {}", certs.len(), dir.display());
	certs
}
