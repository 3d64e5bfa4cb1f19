// Composition of the registration message from all configured sources

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::LOG_TARGET;
use crate::config::RegistryConfig;
use crate::entry::{self, EntryNormalizer, ServiceEntry};
use crate::source::{DirectorySearch, LdapSearch};

/// Builds the entry list sent to the registry on every cycle.
///
/// Sources are resolved one after another in configuration order. A failing source
/// is logged and skipped; it never aborts the cycle.
#[derive(Clone)]
pub struct RegistrationComposer {
	config: Arc<RegistryConfig>,
	directory: Arc<dyn DirectorySearch>,
}

impl std::fmt::Debug for RegistrationComposer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RegistrationComposer")
			.field("sources", &self.config.sources.len())
			.finish()
	}
}

impl RegistrationComposer {
	pub fn new(config: Arc<RegistryConfig>) -> Self {
		Self {
			config,
			directory: Arc::new(LdapSearch),
		}
	}

	/// Use a different directory service backend
	pub fn with_directory(mut self, directory: Arc<dyn DirectorySearch>) -> Self {
		self.directory = directory;
		self
	}

	pub fn config(&self) -> &Arc<RegistryConfig> {
		&self.config
	}

	/// Resolve, normalize and concatenate the entries of every source
	pub async fn compose(&self) -> Vec<ServiceEntry> {
		let normalizer = EntryNormalizer::new(self.config.validity_hours);
		let mut entries = Vec::new();

		for source in &self.config.sources {
			match source.descriptor.resolve(&source.name, self.directory.as_ref()).await {
				Ok(raw) => {
					let resolved = normalizer.normalize(raw);
					debug!(
						target: LOG_TARGET,
						"Source '{}' provided {} entries", source.name, resolved.len()
					);
					entries.extend(resolved);
				},
				Err(e) => {
					error!(target: LOG_TARGET, "Message composing error in '{}': {}", source.name, e);
				},
			}
		}

		for item in &entries {
			debug!(target: LOG_TARGET, "REGISTRATION: {}", entry::describe(item));
		}
		info!(
			target: LOG_TARGET,
			"Composed {} entries from {} sources",
			entries.len(),
			self.config.sources.len()
		);
		entries
	}
}
