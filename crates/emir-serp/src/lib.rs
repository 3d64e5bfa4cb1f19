// Service endpoint registration publisher
//
// Announces locally described services to a central service registry:
// - entries come from JSON files, directories of JSON files, or a GLUE2 directory service
// - every entry is stamped with creation and expiry times before it is sent
// - the registry is driven over HTTP(S) with optional client certificates

pub mod client;
pub mod compose;
pub mod config;
pub mod entry;
pub mod error;
pub mod source;
pub mod telemetry;

pub use client::{DeleteSummary, RegistryClient};
pub use compose::RegistrationComposer;
pub use config::{Protocol, RegistryConfig, Verbosity};
pub use entry::{EntryNormalizer, ServiceEntry};
pub use error::{ConfigError, RegistryError, SourceError};
pub use source::{DirectorySearch, LdapSearch, NamedSource, SourceDescriptor};

/// Target used by every log line of this crate
pub const LOG_TARGET: &str = "emir_serp";
