use assert_matches::assert_matches;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::{MockServer, Mock, ResponseTemplate};
use wiremock::matchers::{body_partial_json, method, path, query_param};

use billing_cell::models::{BillingError, CreateInsuranceProviderRequest, UpdateInsuranceProviderRequest};
use billing_cell::{billing_routes, InsuranceService};
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};

const BRANCH: &str = "branch-ikeja";
const TOKEN: &str = "test-token";

fn service_for(server: &MockServer) -> InsuranceService {
    InsuranceService::new(&TestConfig::with_url(&server.uri()))
}

fn acme(coverage_percentage: f64) -> CreateInsuranceProviderRequest {
    CreateInsuranceProviderRequest {
        name: " Acme Health ".to_string(),
        coverage_percentage,
        max_coverage_amount: Some(5000.0),
        contact_email: Some("claims@acme.test".to_string()),
        contact_phone: None,
    }
}

async fn mount_provider(server: &MockServer, provider_id: &str, coverage_percentage: f64) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/insurance_providers"))
        .and(query_param("id", format!("eq.{}", provider_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::insurance_provider_response(provider_id, coverage_percentage, true)
        ])))
        .mount(server)
        .await;
}

async fn mount_no_writes(server: &MockServer, verb: &str) {
    Mock::given(method(verb))
        .and(path("/rest/v1/insurance_providers"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(0)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_create_provider_trims_name() {
    let server = MockServer::start().await;
    let provider_id = Uuid::new_v4().to_string();

    Mock::given(method("POST"))
        .and(path("/rest/v1/insurance_providers"))
        .and(body_partial_json(json!({ "name": "Acme Health", "coverage_percentage": 80.0, "is_active": true })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::insurance_provider_response(&provider_id, 80.0, true)
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let provider = service_for(&server).create_provider(acme(80.0), TOKEN).await.unwrap();
    assert_eq!(provider.coverage_percentage, 80.0);
    assert!(provider.is_active);
}

#[tokio::test]
async fn test_create_provider_rejects_coverage_out_of_range() {
    let server = MockServer::start().await;
    mount_no_writes(&server, "POST").await;

    for coverage in [-5.0, 100.5, 250.0] {
        let result = service_for(&server).create_provider(acme(coverage), TOKEN).await;
        assert_matches!(result, Err(BillingError::ValidationError(_)));
    }
}

#[tokio::test]
async fn test_update_provider_rejects_coverage_out_of_range() {
    let server = MockServer::start().await;
    let provider_id = Uuid::new_v4().to_string();
    mount_provider(&server, &provider_id, 80.0).await;
    mount_no_writes(&server, "PATCH").await;

    let request = UpdateInsuranceProviderRequest {
        coverage_percentage: Some(101.0),
        ..Default::default()
    };
    let result = service_for(&server)
        .update_provider(Uuid::parse_str(&provider_id).unwrap(), request, TOKEN)
        .await;
    assert_matches!(result, Err(BillingError::ValidationError(_)));
}

#[tokio::test]
async fn test_update_provider_deactivates() {
    let server = MockServer::start().await;
    let provider_id = Uuid::new_v4().to_string();
    mount_provider(&server, &provider_id, 80.0).await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/insurance_providers"))
        .and(query_param("id", format!("eq.{}", provider_id)))
        .and(body_partial_json(json!({ "is_active": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::insurance_provider_response(&provider_id, 80.0, false)
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let request = UpdateInsuranceProviderRequest { is_active: Some(false), ..Default::default() };
    let provider = service_for(&server)
        .update_provider(Uuid::parse_str(&provider_id).unwrap(), request, TOKEN)
        .await
        .unwrap();
    assert!(!provider.is_active);
}

#[tokio::test]
async fn test_get_missing_provider() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/insurance_providers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let result = service_for(&server).get_provider(Uuid::new_v4(), TOKEN).await;
    assert_matches!(result, Err(BillingError::ProviderNotFound));
}

async fn send(server: &MockServer, user: &TestUser, verb: &str, uri: &str, body: serde_json::Value) -> StatusCode {
    let config = TestConfig { supabase_url: server.uri(), ..TestConfig::default() };
    let token = JwtTestUtils::create_test_token(user, &config.jwt_secret, Some(1));

    billing_routes(config.to_arc())
        .oneshot(
            Request::builder()
                .method(verb)
                .uri(uri)
                .header("Authorization", format!("Bearer {}", token))
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn test_only_accounting_and_admin_write_providers() {
    let server = MockServer::start().await;
    let provider_id = Uuid::new_v4().to_string();
    mount_provider(&server, &provider_id, 80.0).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/insurance_providers"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::insurance_provider_response(&Uuid::new_v4().to_string(), 70.0, true)
        ])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/insurance_providers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::insurance_provider_response(&provider_id, 60.0, true)
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let create = json!({ "name": "Acme Health", "coverage_percentage": 70.0 });
    let update = json!({ "coverage_percentage": 60.0 });
    let provider_uri = format!("/insurance/{}", provider_id);

    let billing = TestUser::billing("billing@clinic.test", BRANCH);
    let nurse = TestUser::nurse("nurse@clinic.test", BRANCH);
    assert_eq!(send(&server, &billing, "POST", "/insurance", create.clone()).await, StatusCode::FORBIDDEN);
    assert_eq!(send(&server, &nurse, "PUT", &provider_uri, update.clone()).await, StatusCode::FORBIDDEN);

    let accounting = TestUser::accounting("accounts@clinic.test", BRANCH);
    let admin = TestUser::admin("admin@clinic.test", BRANCH);
    assert_eq!(send(&server, &accounting, "POST", "/insurance", create).await, StatusCode::OK);
    assert_eq!(send(&server, &admin, "PUT", &provider_uri, update).await, StatusCode::OK);
}
