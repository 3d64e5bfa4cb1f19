// Composition across several sources

use std::sync::Arc;

use async_trait::async_trait;
use emir_serp::source::{DirectoryEndpoint, RawRecord};
use emir_serp::{DirectorySearch, RegistrationComposer, SourceError};
use tracing::instrument::WithSubscriber;

use crate::common::{Fixture, LogCapture};

/// Directory service stand-in returning one service with two endpoints
struct StaticDirectory;

#[async_trait]
impl DirectorySearch for StaticDirectory {
	async fn search(&self, endpoint: &DirectoryEndpoint) -> Result<Vec<RawRecord>, SourceError> {
		assert_eq!(endpoint.base, "o=glue");
		Ok(vec![
			RawRecord::new("GLUE2ServiceID=S1,o=glue")
				.with_attr("objectClass", &["GLUE2Service"])
				.with_attr("GLUE2ServiceID", &["S1"])
				.with_attr("GLUE2ServiceType", &["org.example.compute"]),
			RawRecord::new("GLUE2EndpointID=E1,GLUE2ServiceID=S1,o=glue")
				.with_attr("objectClass", &["GLUE2Endpoint"])
				.with_attr("GLUE2EndpointID", &["E1"])
				.with_attr("GLUE2EndpointURL", &["https://e1.example.org"])
				.with_attr("GLUE2EndpointServiceForeignKey", &["S1"]),
			RawRecord::new("GLUE2EndpointID=E2,GLUE2ServiceID=S1,o=glue")
				.with_attr("objectClass", &["GLUE2Endpoint"])
				.with_attr("GLUE2EndpointID", &["E2"])
				.with_attr("GLUE2EndpointURL", &["https://e2.example.org"])
				.with_attr("GLUE2EndpointServiceForeignKey", &["S1"]),
		])
	}
}

fn ids(entries: &[emir_serp::ServiceEntry]) -> Vec<String> {
	entries
		.iter()
		.map(|e| e["Service_Endpoint_ID"].as_str().unwrap_or("-").to_string())
		.collect()
}

/// Sources are concatenated in configuration order; broken ones are skipped
#[tokio::test]
async fn test_sources_in_order_with_failures() -> anyhow::Result<()> {
	let fixture = Fixture::new("http://127.0.0.1:9");
	let first = fixture.write("first.json", r#"{"Service_Endpoint_ID": "a"}"#);
	fixture.write("dir/one.json", r#"[{"Service_Endpoint_ID": "b"}, {"Service_Endpoint_ID": "c"}]"#);
	let broken = fixture.write("broken.json", "{ nope");
	let dir = fixture.path("dir");
	let missing = fixture.path("missing.json");

	let fixture = fixture
		.file_source("first", &first)
		.file_source("missing", &missing)
		.dir_source("dir", &dir)
		.section("unconfigured", "comment", "nothing here")
		.file_source("broken", &broken);

	let composer = RegistrationComposer::new(fixture.config());
	let entries = composer.compose().await;

	assert_eq!(ids(&entries), vec!["a", "b", "c"]);
	for entry in &entries {
		assert!(entry.contains_key("Service_CreationTime"));
		assert!(entry.contains_key("Service_ExpireOn"));
	}

	Ok(())
}

/// Each cycle reads the sources again
#[tokio::test]
async fn test_entries_are_not_cached() -> anyhow::Result<()> {
	let fixture = Fixture::new("http://127.0.0.1:9");
	let doc = fixture.write("doc.json", r#"{"Service_Endpoint_ID": "before"}"#);
	let fixture = fixture.file_source("doc", &doc);
	let composer = RegistrationComposer::new(fixture.config());

	assert_eq!(ids(&composer.compose().await), vec!["before"]);

	fixture.write("doc.json", r#"[{"Service_Endpoint_ID": "after"}, {"Service_Endpoint_ID": "more"}]"#);
	assert_eq!(ids(&composer.compose().await), vec!["after", "more"]);

	Ok(())
}

/// Directory service entries are joined, remapped and stamped
#[tokio::test]
async fn test_directory_service_source() -> anyhow::Result<()> {
	let fixture = Fixture::new("http://127.0.0.1:9");
	let doc = fixture.write("local.json", r#"{"Service_Endpoint_ID": "local"}"#);
	let fixture = fixture
		.section("bdii", "resource_bdii_url", "ldap://bdii.example.org")
		.file_source("local", &doc);

	let composer = RegistrationComposer::new(fixture.config()).with_directory(Arc::new(StaticDirectory));
	let entries = composer.compose().await;

	assert_eq!(ids(&entries), vec!["E1", "E2", "local"]);
	assert_eq!(entries[0]["Service_ID"], "S1");
	assert_eq!(entries[0]["Service_Type"], "org.example.compute");
	assert_eq!(entries[1]["Service_Endpoint_URL"], "https://e2.example.org");
	assert!(entries[1].contains_key("Service_ExpireOn"));

	Ok(())
}

/// Diagnostics go to the subscriber installed by the caller
#[tokio::test]
async fn test_diagnostics_are_captured() -> anyhow::Result<()> {
	let fixture = Fixture::new("http://127.0.0.1:9");
	let doc = fixture.write(
		"doc.json",
		r#"[{"Service_Endpoint_ID": "id-1", "Service_Endpoint_URL": "https://one"}, {"Service_Endpoint_URL": "https://two"}]"#,
	);
	let missing = fixture.path("missing.json");
	let fixture = fixture
		.file_source("doc", &doc)
		.file_source("missing", &missing)
		.section("unconfigured", "comment", "nothing here");
	let composer = RegistrationComposer::new(fixture.config());

	let logs = LogCapture::default();
	let entries = composer.compose().with_subscriber(logs.subscriber()).await;
	assert_eq!(entries.len(), 2);

	let output = logs.contents();
	assert!(output.contains("REGISTRATION: Endpoint ID: id-1; URL: https://one"), "{output}");
	assert!(output.contains("REGISTRATION: Endpoint URL: https://two"), "{output}");
	assert!(output.contains("Message composing error in 'missing'"), "{output}");
	assert!(output.contains("has to be defined in 'unconfigured' section"), "{output}");

	Ok(())
}
