//! NetBox REST client against a mocked NetBox API.

#![cfg(feature = "integration-tests")]

use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vanopticon_netbox_sync::store::{ClientConfig, Collection, NetBoxClient, NetBoxClientBuilder, StoreError};

mod common;

fn client(server: &MockServer, tune: impl FnOnce(&mut ClientConfig)) -> NetBoxClient {
	let mut config = ClientConfig::new("master", Url::parse(&server.uri()).unwrap(), "secret");
	config.initial_backoff_ms = 1;
	config.max_backoff_ms = 5;
	tune(&mut config);
	NetBoxClientBuilder::new(config).build().unwrap()
}

#[tokio::test]
async fn test_listing_follows_next_links_and_sends_token() {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/api/dcim/devices/"))
		.and(header("Authorization", "Token secret"))
		.and(query_param("limit", "2"))
		.and(query_param_is_missing("offset"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"count": 3,
			"next": format!("{}/api/dcim/devices/?limit=2&offset=2", server.uri()),
			"previous": null,
			"results": [{"id": 1, "name": "rtr-1"}, {"id": 2, "name": "rtr-2"}]
		})))
		.expect(1)
		.mount(&server)
		.await;

	Mock::given(method("GET"))
		.and(path("/api/dcim/devices/"))
		.and(header("Authorization", "Token secret"))
		.and(query_param("offset", "2"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"count": 3,
			"next": null,
			"previous": null,
			"results": [{"id": 3, "name": "rtr-3"}]
		})))
		.expect(1)
		.mount(&server)
		.await;

	let client = client(&server, |c| c.page_size = 2);
	let devices = Collection::resolve(&client, "dcim.devices").unwrap();
	let records = devices.all().await.unwrap();

	let names: Vec<_> = records.iter().map(|r| r.display()).collect();
	assert_eq!(names, vec!["rtr-1", "rtr-2", "rtr-3"]);
}

#[tokio::test]
async fn test_filter_passes_query_pairs() {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/api/ipam/ip-addresses/"))
		.and(query_param("assigned_object_type", "dcim.interface"))
		.and(query_param("assigned_object_id", "12"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"next": null,
			"results": [{"id": 4, "address": "10.0.0.1/24"}]
		})))
		.expect(1)
		.mount(&server)
		.await;

	let client = client(&server, |_| {});
	let ips = Collection::resolve(&client, "ipam.ip_addresses").unwrap();
	let found = ips
		.filter(&[
			("assigned_object_type", "dcim.interface".to_string()),
			("assigned_object_id", "12".to_string()),
		])
		.await
		.unwrap();
	assert_eq!(found.len(), 1);
	assert_eq!(found[0].id(), Some(4));
}

#[tokio::test]
async fn test_validation_errors_carry_the_response_body() {
	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.and(path("/api/dcim/racks/"))
		.and(body_json(json!({"name": "r1"})))
		.respond_with(ResponseTemplate::new(400).set_body_json(json!({"site": ["This field is required."]})))
		.expect(1)
		.mount(&server)
		.await;

	let client = client(&server, |_| {});
	let racks = Collection::resolve(&client, "dcim.racks").unwrap();
	let err = racks.create(&common::payload(json!({"name": "r1"}))).await.unwrap_err();

	assert!(matches!(err, StoreError::Status { status: 400, .. }));
	assert!(err.to_string().contains("This field is required."));
	assert!(!client.circuit_open().await);
}

#[tokio::test]
async fn test_server_errors_are_retried() {
	let server = MockServer::start().await;

	Mock::given(method("PATCH"))
		.and(path("/api/dcim/devices/7/"))
		.respond_with(ResponseTemplate::new(502))
		.up_to_n_times(2)
		.expect(2)
		.mount(&server)
		.await;
	Mock::given(method("PATCH"))
		.and(path("/api/dcim/devices/7/"))
		.and(body_json(json!({"status": "active"})))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 7, "name": "rtr-1", "status": {"value": "active"}})))
		.expect(1)
		.mount(&server)
		.await;

	let client = client(&server, |c| c.max_retries = 3);
	let devices = Collection::resolve(&client, "dcim.devices").unwrap();
	let updated = devices.update(7, &common::payload(json!({"status": "active"}))).await.unwrap();

	assert_eq!(updated.pointer("/status/value"), Some(&json!("active")));
}

#[tokio::test]
async fn test_create_is_not_repeated_after_server_error() {
	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.and(path("/api/ipam/ip-addresses/"))
		.respond_with(ResponseTemplate::new(502))
		.expect(1)
		.mount(&server)
		.await;

	let client = client(&server, |c| c.max_retries = 3);
	let addresses = Collection::resolve(&client, "ipam.ip-addresses").unwrap();
	let err = addresses
		.create(&common::payload(json!({"address": "192.0.2.1/32"})))
		.await
		.unwrap_err();

	assert!(matches!(err, StoreError::Status { status: 502, .. }));
}

#[tokio::test]
async fn test_get_maps_not_found_to_none() {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/api/dcim/modules/99/"))
		.respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Not found."})))
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path("/api/dcim/modules/5/"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 5, "serial": "S1"})))
		.mount(&server)
		.await;

	let client = client(&server, |_| {});
	let modules = Collection::resolve(&client, "dcim.modules").unwrap();
	assert!(modules.get(99).await.unwrap().is_none());
	assert_eq!(modules.get(5).await.unwrap().and_then(|m| m.id()), Some(5));
}

#[tokio::test]
async fn test_delete_accepts_no_content() {
	let server = MockServer::start().await;

	Mock::given(method("DELETE"))
		.and(path("/api/dcim/interfaces/3/"))
		.respond_with(ResponseTemplate::new(204))
		.expect(1)
		.mount(&server)
		.await;

	let client = client(&server, |_| {});
	let interfaces = Collection::resolve(&client, "dcim.interfaces").unwrap();
	interfaces.delete(3).await.unwrap();
}

#[tokio::test]
async fn test_circuit_breaker_fails_fast() {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/api/dcim/racks/"))
		.respond_with(ResponseTemplate::new(503))
		.expect(1)
		.mount(&server)
		.await;

	let client = client(&server, |c| {
		c.max_retries = 0;
		c.circuit_breaker_threshold = 1;
		c.circuit_breaker_timeout_ms = 60_000;
	});
	let racks = Collection::resolve(&client, "dcim.racks").unwrap();

	let first = racks.all().await.unwrap_err();
	assert!(matches!(first, StoreError::Status { status: 503, .. }));
	assert!(client.circuit_open().await);

	let second = racks.all().await.unwrap_err();
	assert!(matches!(second, StoreError::CircuitBreakerOpen));
}
