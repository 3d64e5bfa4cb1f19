// Registry client tests against a stub registry

use assert_matches::assert_matches;
use chrono::NaiveDateTime;
use emir_serp::{RegistryClient, RegistryError};
use serde_json::{Value, json};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use crate::common::Fixture;

fn parse_date(value: &Value) -> NaiveDateTime {
	NaiveDateTime::parse_from_str(value["$date"].as_str().unwrap(), "%Y-%m-%dT%H:%M:%S.000Z").unwrap()
}

fn body_json(request: &Request) -> Value {
	serde_json::from_slice(&request.body).unwrap()
}

/// One file source holding `{"Service_Endpoint_URL": "http://x"}`, validity 24 hours
fn demo_fixture(server: &MockServer) -> Fixture {
	let fixture = Fixture::new(server.uri()).validity(24);
	let doc = fixture.write("demo.json", r#"{"Service_Endpoint_URL": "http://x"}"#);
	fixture.file_source("demo", &doc)
}

/// A directory source with three identified entries
fn three_entry_fixture(server: &MockServer) -> Fixture {
	let fixture = Fixture::new(server.uri());
	fixture.write(
		"entries/all.json",
		r#"[
			{"Service_Endpoint_ID": "a", "Service_Endpoint_URL": "https://a"},
			{"Service_Endpoint_ID": "b", "Service_Endpoint_URL": "https://b"},
			{"Service_Endpoint_ID": "c", "Service_Endpoint_URL": "https://c"}
		]"#,
	);
	let dir = fixture.path("entries");
	fixture.dir_source("entries", &dir)
}

/// Register POSTs the composed entries as a JSON array
#[tokio::test]
async fn test_register_demo_source() -> anyhow::Result<()> {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/serviceadmin"))
		.and(header("content-type", "application/json"))
		.respond_with(ResponseTemplate::new(201))
		.expect(1)
		.mount(&server)
		.await;

	let fixture = demo_fixture(&server);
	let client = RegistryClient::new(fixture.config())?;

	let entries = client.register().await?;
	assert_eq!(entries.len(), 1);

	let requests = server.received_requests().await.unwrap();
	assert_eq!(requests.len(), 1);
	let body = body_json(&requests[0]);
	let items = body.as_array().expect("array body");
	assert_eq!(items.len(), 1);
	assert_eq!(items[0]["Service_Endpoint_URL"], "http://x");

	let created = parse_date(&items[0]["Service_CreationTime"]);
	let expires = parse_date(&items[0]["Service_ExpireOn"]);
	assert_eq!(expires - created, chrono::Duration::hours(24));

	Ok(())
}

/// Update PUTs to the same endpoint and succeeds on 200
#[tokio::test]
async fn test_update_uses_put() -> anyhow::Result<()> {
	let server = MockServer::start().await;
	Mock::given(method("PUT"))
		.and(path("/serviceadmin"))
		.respond_with(ResponseTemplate::new(200))
		.expect(1)
		.mount(&server)
		.await;

	let fixture = three_entry_fixture(&server);
	let client = RegistryClient::new(fixture.config())?;

	let entries = client.update().await?;
	assert_eq!(entries.len(), 3);

	let requests = server.received_requests().await.unwrap();
	let ids: Vec<_> = body_json(&requests[0])
		.as_array()
		.unwrap()
		.iter()
		.map(|e| e["Service_Endpoint_ID"].as_str().unwrap().to_string())
		.collect();
	assert_eq!(ids, vec!["a", "b", "c"]);

	Ok(())
}

/// A registry error surfaces status, reason and body
#[tokio::test]
async fn test_register_server_error() -> anyhow::Result<()> {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/serviceadmin"))
		.respond_with(ResponseTemplate::new(500).set_body_string("database is down"))
		.mount(&server)
		.await;

	let fixture = demo_fixture(&server);
	let client = RegistryClient::new(fixture.config())?;

	let err = client.register().await.unwrap_err();
	assert_matches!(
		&err,
		RegistryError::Status { status: 500, reason, body }
			if reason == "Internal Server Error" && body == "database is down"
	);
	assert_eq!(err.to_string(), "Internal Server Error (500): database is down");

	Ok(())
}

/// Update errors are not swallowed either
#[tokio::test]
async fn test_update_client_error() -> anyhow::Result<()> {
	let server = MockServer::start().await;
	Mock::given(method("PUT"))
		.respond_with(ResponseTemplate::new(400).set_body_string("bad entry"))
		.mount(&server)
		.await;

	let fixture = demo_fixture(&server);
	let client = RegistryClient::new(fixture.config())?;

	assert_matches!(
		client.update().await,
		Err(RegistryError::Status { status: 400, .. })
	);

	Ok(())
}

/// A failing delete does not stop the remaining deletions
#[tokio::test]
async fn test_delete_continues_after_failure() -> anyhow::Result<()> {
	let server = MockServer::start().await;
	Mock::given(method("DELETE"))
		.and(path("/serviceadmin"))
		.and(query_param("Service_Endpoint_ID", "b"))
		.respond_with(ResponseTemplate::new(404).set_body_string("no such entry"))
		.with_priority(1)
		.expect(1)
		.mount(&server)
		.await;
	Mock::given(method("DELETE"))
		.and(path("/serviceadmin"))
		.respond_with(ResponseTemplate::new(200))
		.expect(2)
		.mount(&server)
		.await;

	let fixture = three_entry_fixture(&server);
	let client = RegistryClient::new(fixture.config())?;

	let summary = client.delete().await;
	assert_eq!(summary.deleted, 2);
	assert_eq!(summary.failed, 1);
	assert_eq!(summary.skipped, 0);

	let requests = server.received_requests().await.unwrap();
	let queried: Vec<_> = requests
		.iter()
		.map(|r| r.url.query().unwrap_or_default().to_string())
		.collect();
	assert_eq!(
		queried,
		vec![
			"Service_Endpoint_ID=a",
			"Service_Endpoint_ID=b",
			"Service_Endpoint_ID=c",
		]
	);

	Ok(())
}

/// Entries without an ID are deleted by URL; anonymous entries are skipped
#[tokio::test]
async fn test_delete_by_url_and_skip_anonymous() -> anyhow::Result<()> {
	let server = MockServer::start().await;
	Mock::given(method("DELETE"))
		.and(path("/serviceadmin"))
		.and(query_param("Service_Endpoint_URL", "http://x"))
		.respond_with(ResponseTemplate::new(200))
		.expect(1)
		.mount(&server)
		.await;

	let fixture = Fixture::new(server.uri());
	let doc = fixture.write(
		"mixed.json",
		r#"[{"Service_Endpoint_URL": "http://x"}, {"Service_Name": "anonymous"}]"#,
	);
	let fixture = fixture.file_source("mixed", &doc);
	let client = RegistryClient::new(fixture.config())?;

	let summary = client.delete().await;
	assert_eq!(summary.deleted, 1);
	assert_eq!(summary.skipped, 1);

	Ok(())
}

/// Ping returns the registry start time
#[tokio::test]
async fn test_ping() -> anyhow::Result<()> {
	let server = MockServer::start().await;
	Mock::given(method("GET"))
		.and(path("/ping"))
		.respond_with(
			ResponseTemplate::new(200).set_body_json(json!({"RunningSince": "2024-01-01T00:00:00Z"})),
		)
		.mount(&server)
		.await;

	let fixture = Fixture::new(server.uri());
	let client = RegistryClient::new(fixture.config())?;

	assert_eq!(client.ping().await?, "2024-01-01T00:00:00Z");

	Ok(())
}

/// Ping without the expected field is an error
#[tokio::test]
async fn test_ping_unexpected_body() -> anyhow::Result<()> {
	let server = MockServer::start().await;
	Mock::given(method("GET"))
		.and(path("/ping"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
		.mount(&server)
		.await;

	let fixture = Fixture::new(server.uri());
	let client = RegistryClient::new(fixture.config())?;

	assert_matches!(client.ping().await, Err(RegistryError::UnexpectedResponse(_)));

	Ok(())
}

/// An unreachable registry is a transport error
#[tokio::test]
async fn test_register_unreachable() -> anyhow::Result<()> {
	// Nothing listens on the discard port of localhost
	let fixture = Fixture::new("http://127.0.0.1:9");
	let doc = fixture.write("demo.json", r#"{"Service_Endpoint_URL": "http://x"}"#);
	let fixture = fixture.file_source("demo", &doc);

	let client = RegistryClient::new(fixture.config())?;
	assert_matches!(client.register().await, Err(RegistryError::Transport(_)));

	Ok(())
}
