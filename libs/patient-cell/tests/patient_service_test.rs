use assert_matches::assert_matches;
use chrono::NaiveDate;
use serde_json::json;
use uuid::Uuid;
use wiremock::{MockServer, Mock, ResponseTemplate};
use wiremock::matchers::{method, path, query_param};

use patient_cell::{Gender, PatientError, PatientSearchQuery, PatientService, RegisterPatientRequest, UpdatePatientRequest};
use shared_utils::scope::BranchScope;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};
use visit_cell::VisitService;

const BRANCH: &str = "branch-ikeja";
const TOKEN: &str = "test-token";

fn scope() -> BranchScope {
    BranchScope::Branch(BRANCH.to_string())
}

fn registration() -> RegisterPatientRequest {
    RegisterPatientRequest {
        first_name: "Ada".to_string(),
        last_name: "Obi".to_string(),
        date_of_birth: NaiveDate::from_ymd_opt(1988, 4, 12).unwrap(),
        gender: Gender::Female,
        phone_number: "+234 801 234 5678".to_string(),
        email: Some("Ada@Example.com".to_string()),
        address: None,
        insurance_provider_id: None,
        insurance_member_number: None,
        allergies: Some("penicillin".to_string()),
        chronic_conditions: None,
        emergency_contact_name: None,
        emergency_contact_phone: None,
    }
}

#[tokio::test]
async fn test_register_patient_success() {
    let server = MockServer::start().await;
    let patient_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("phone_number", "eq.+2348012345678"))
        .and(query_param("branch_id", format!("eq.{}", BRANCH)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::patient_response(&patient_id, BRANCH)
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let service = PatientService::new(&TestConfig::with_url(&server.uri()));
    let patient = service.register_patient(registration(), BRANCH, TOKEN).await.unwrap();

    assert_eq!(patient.id.to_string(), patient_id);
    assert_eq!(patient.patient_number, "PAT-2601-A1B2C3");
}

#[tokio::test]
async fn test_register_rejects_duplicate_phone() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::patient_response(&Uuid::new_v4().to_string(), BRANCH)
        ])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let service = PatientService::new(&TestConfig::with_url(&server.uri()));
    let result = service.register_patient(registration(), BRANCH, TOKEN).await;
    assert_matches!(result, Err(PatientError::DuplicatePhone(phone)) if phone == "+2348012345678");
}

#[tokio::test]
async fn test_register_validates_before_touching_database() {
    let server = MockServer::start().await;
    let mut request = registration();
    request.phone_number = "call me".to_string();

    let service = PatientService::new(&TestConfig::with_url(&server.uri()));
    let result = service.register_patient(request, BRANCH, TOKEN).await;
    assert_matches!(result, Err(PatientError::ValidationError(_)));
}

#[tokio::test]
async fn test_get_patient_by_number() {
    let server = MockServer::start().await;
    let patient_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("patient_number", "eq.PAT-2601-A1B2C3"))
        .and(query_param("branch_id", format!("eq.{}", BRANCH)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::patient_response(&patient_id, BRANCH)
        ])))
        .mount(&server)
        .await;

    let service = PatientService::new(&TestConfig::with_url(&server.uri()));
    let patient = service.get_patient("pat-2601-a1b2c3", &scope(), TOKEN).await.unwrap();
    assert_eq!(patient.id.to_string(), patient_id);
}

#[tokio::test]
async fn test_get_patient_outside_branch_is_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let service = PatientService::new(&TestConfig::with_url(&server.uri()));
    let result = service.get_patient(&Uuid::new_v4().to_string(), &scope(), TOKEN).await;
    assert_matches!(result, Err(PatientError::NotFound));
}

#[tokio::test]
async fn test_empty_update_is_rejected() {
    let server = MockServer::start().await;
    let patient_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::patient_response(&patient_id, BRANCH)
        ])))
        .mount(&server)
        .await;

    let service = PatientService::new(&TestConfig::with_url(&server.uri()));
    let result = service
        .update_patient(&patient_id, UpdatePatientRequest::default(), &scope(), TOKEN)
        .await;
    assert_matches!(result, Err(PatientError::ValidationError(_)));
}

#[tokio::test]
async fn test_update_patient_patches_branch_row() {
    let server = MockServer::start().await;
    let patient_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::patient_response(&patient_id, BRANCH)
        ])))
        .mount(&server)
        .await;

    let mut updated = MockSupabaseResponses::patient_response(&patient_id, BRANCH);
    updated["allergies"] = json!("sulfa");

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/patients"))
        .and(query_param("id", format!("eq.{}", patient_id)))
        .and(query_param("branch_id", format!("eq.{}", BRANCH)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([updated])))
        .expect(1)
        .mount(&server)
        .await;

    let service = PatientService::new(&TestConfig::with_url(&server.uri()));
    let request = UpdatePatientRequest {
        allergies: Some("sulfa".to_string()),
        ..UpdatePatientRequest::default()
    };
    let patient = service.update_patient(&patient_id, request, &scope(), TOKEN).await.unwrap();
    assert_eq!(patient.allergies.as_deref(), Some("sulfa"));
}

#[tokio::test]
async fn test_search_is_branch_scoped() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("branch_id", format!("eq.{}", BRANCH)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::patient_response(&Uuid::new_v4().to_string(), BRANCH),
            MockSupabaseResponses::patient_response(&Uuid::new_v4().to_string(), BRANCH)
        ])))
        .mount(&server)
        .await;

    let service = PatientService::new(&TestConfig::with_url(&server.uri()));
    let query = PatientSearchQuery {
        q: Some("obi".to_string()),
        ..PatientSearchQuery::default()
    };
    let patients = service.search_patients(&query, &scope(), TOKEN).await.unwrap();
    assert_eq!(patients.len(), 2);
}

#[tokio::test]
async fn test_patient_visits_uses_patient_id() {
    let server = MockServer::start().await;
    let patient_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::patient_response(&patient_id, BRANCH)
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/patient_visits"))
        .and(query_param("patient_id", format!("eq.{}", patient_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::visit_response(&Uuid::new_v4().to_string(), &patient_id, BRANCH, "billing")
        ])))
        .mount(&server)
        .await;

    let config = TestConfig::with_url(&server.uri());
    let service = PatientService::new(&config);
    let visits = VisitService::new(&config);
    let (patient, history) = service
        .patient_visits(&patient_id, &visits, &scope(), TOKEN)
        .await
        .unwrap();

    assert_eq!(patient.id.to_string(), patient_id);
    assert_eq!(history.len(), 1);
}

async fn mount_patient_by_id(server: &MockServer, patient_id: &str) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("id", format!("eq.{}", patient_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::patient_response(patient_id, BRANCH)
        ])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_update_rejects_phone_held_by_another_patient() {
    let server = MockServer::start().await;
    let patient_id = Uuid::new_v4().to_string();
    mount_patient_by_id(&server, &patient_id).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("branch_id", format!("eq.{}", BRANCH)))
        .and(query_param("phone_number", "eq.+2348020000000"))
        .and(query_param("id", format!("neq.{}", patient_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::patient_response(&Uuid::new_v4().to_string(), BRANCH)
        ])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let service = PatientService::new(&TestConfig::with_url(&server.uri()));
    let request = UpdatePatientRequest {
        phone_number: Some("+234 802 000 0000".to_string()),
        ..UpdatePatientRequest::default()
    };
    let result = service.update_patient(&patient_id, request, &scope(), TOKEN).await;
    assert_matches!(result, Err(PatientError::DuplicatePhone(phone)) if phone == "+2348020000000");
}

#[tokio::test]
async fn test_update_to_free_phone_patches() {
    let server = MockServer::start().await;
    let patient_id = Uuid::new_v4().to_string();
    mount_patient_by_id(&server, &patient_id).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("phone_number", "eq.+2348020000000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let mut updated = MockSupabaseResponses::patient_response(&patient_id, BRANCH);
    updated["phone_number"] = json!("+2348020000000");

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/patients"))
        .and(query_param("id", format!("eq.{}", patient_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([updated])))
        .expect(1)
        .mount(&server)
        .await;

    let service = PatientService::new(&TestConfig::with_url(&server.uri()));
    let request = UpdatePatientRequest {
        phone_number: Some("+234-802-000-0000".to_string()),
        ..UpdatePatientRequest::default()
    };
    let patient = service.update_patient(&patient_id, request, &scope(), TOKEN).await.unwrap();
    assert_eq!(patient.phone_number, "+2348020000000");
}
