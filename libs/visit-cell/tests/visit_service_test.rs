use std::sync::Arc;

use assert_matches::assert_matches;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::{MockServer, Mock, ResponseTemplate};
use wiremock::matchers::{body_partial_json, method, path, query_param};

use shared_utils::scope::BranchScope;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};
use visit_cell::{
    CreateVisitRequest, NurseData, RecordStageDataRequest, StageData, TransitionRequest,
    VisitError, VisitService, VisitStage, VisitStatus, Vitals, visit_routes,
};

const BRANCH: &str = "branch-ikeja";
const TOKEN: &str = "test-token";

fn service_for(server: &MockServer) -> VisitService {
    VisitService::new(&TestConfig::with_url(&server.uri()))
}

fn scope() -> BranchScope {
    BranchScope::Branch(BRANCH.to_string())
}

async fn mount_visit(server: &MockServer, visit_id: &str, patient_id: &str, stage: &str) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/patient_visits"))
        .and(query_param("id", format!("eq.{}", visit_id)))
        .and(query_param("branch_id", format!("eq.{}", BRANCH)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::visit_response(visit_id, patient_id, BRANCH, stage)
        ])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_create_visit_success() {
    let server = MockServer::start().await;
    let patient_id = Uuid::new_v4().to_string();
    let visit_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("id", format!("eq.{}", patient_id)))
        .and(query_param("branch_id", format!("eq.{}", BRANCH)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::patient_response(&patient_id, BRANCH)
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/patient_visits"))
        .and(query_param("status", "eq.in_progress"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/patient_visits"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::visit_response(&visit_id, &patient_id, BRANCH, "front_desk")
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let user = TestUser::front_desk("desk@clinic.test", BRANCH).to_user();
    let request = CreateVisitRequest {
        patient_id: Uuid::parse_str(&patient_id).unwrap(),
        appointment_id: None,
        reason_for_visit: Some("Fever".to_string()),
        referral_source: None,
    };

    let visit = service_for(&server)
        .create_visit(request, &user, BRANCH, TOKEN)
        .await
        .unwrap();

    assert_eq!(visit.current_stage, VisitStage::FrontDesk);
    assert_eq!(visit.branch_id, BRANCH);
}

#[tokio::test]
async fn test_create_visit_rejects_second_open_visit() {
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
        .and(query_param("status", "eq.in_progress"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::visit_response(&Uuid::new_v4().to_string(), &patient_id, BRANCH, "doctor")
        ])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/patient_visits"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let user = TestUser::front_desk("desk@clinic.test", BRANCH).to_user();
    let request = CreateVisitRequest {
        patient_id: Uuid::parse_str(&patient_id).unwrap(),
        appointment_id: None,
        reason_for_visit: None,
        referral_source: None,
    };

    let result = service_for(&server).create_visit(request, &user, BRANCH, TOKEN).await;
    assert_matches!(result, Err(VisitError::DuplicateOpenVisit(number)) if number == "VIS-20260101-ABC123");
}

#[tokio::test]
async fn test_create_visit_requires_front_desk() {
    let server = MockServer::start().await;
    let user = TestUser::nurse("nurse@clinic.test", BRANCH).to_user();
    let request = CreateVisitRequest {
        patient_id: Uuid::new_v4(),
        appointment_id: None,
        reason_for_visit: None,
        referral_source: None,
    };

    let result = service_for(&server).create_visit(request, &user, BRANCH, TOKEN).await;
    assert_matches!(result, Err(VisitError::Forbidden(_)));
}

#[tokio::test]
async fn test_transition_writes_with_stage_guard() {
    let server = MockServer::start().await;
    let visit_id = Uuid::new_v4().to_string();
    let patient_id = Uuid::new_v4().to_string();
    mount_visit(&server, &visit_id, &patient_id, "front_desk").await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/patient_visits"))
        .and(query_param("id", format!("eq.{}", visit_id)))
        .and(query_param("current_stage", "eq.front_desk"))
        .and(query_param("status", "eq.in_progress"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::visit_response(&visit_id, &patient_id, BRANCH, "nurse")
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let user = TestUser::front_desk("desk@clinic.test", BRANCH).to_user();
    let result = service_for(&server)
        .transition(
            Uuid::parse_str(&visit_id).unwrap(),
            TransitionRequest { target_stage: VisitStage::Nurse, notes: None },
            &user,
            &scope(),
            TOKEN,
        )
        .await
        .unwrap();

    assert!(result.changed);
    assert_eq!(result.from_stage, VisitStage::FrontDesk);
    assert_eq!(result.visit.current_stage, VisitStage::Nurse);
}

#[tokio::test]
async fn test_transition_detects_concurrent_move() {
    let server = MockServer::start().await;
    let visit_id = Uuid::new_v4().to_string();
    let patient_id = Uuid::new_v4().to_string();
    mount_visit(&server, &visit_id, &patient_id, "front_desk").await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/patient_visits"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let user = TestUser::front_desk("desk@clinic.test", BRANCH).to_user();
    let result = service_for(&server)
        .transition(
            Uuid::parse_str(&visit_id).unwrap(),
            TransitionRequest { target_stage: VisitStage::Nurse, notes: None },
            &user,
            &scope(),
            TOKEN,
        )
        .await;

    assert_matches!(result, Err(VisitError::ConcurrentUpdate));
}

#[tokio::test]
async fn test_reentry_does_not_write() {
    let server = MockServer::start().await;
    let visit_id = Uuid::new_v4().to_string();
    let patient_id = Uuid::new_v4().to_string();
    mount_visit(&server, &visit_id, &patient_id, "doctor").await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/patient_visits"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let user = TestUser::doctor("doc@clinic.test", BRANCH).to_user();
    let result = service_for(&server)
        .transition(
            Uuid::parse_str(&visit_id).unwrap(),
            TransitionRequest { target_stage: VisitStage::Doctor, notes: None },
            &user,
            &scope(),
            TOKEN,
        )
        .await
        .unwrap();

    assert!(!result.changed);
    assert_eq!(result.visit.current_stage, VisitStage::Doctor);
}

#[tokio::test]
async fn test_wrong_department_cannot_move_visit() {
    let server = MockServer::start().await;
    let visit_id = Uuid::new_v4().to_string();
    let patient_id = Uuid::new_v4().to_string();
    mount_visit(&server, &visit_id, &patient_id, "nurse").await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/patient_visits"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let user = TestUser::pharmacy("rx@clinic.test", BRANCH).to_user();
    let result = service_for(&server)
        .transition(
            Uuid::parse_str(&visit_id).unwrap(),
            TransitionRequest { target_stage: VisitStage::Doctor, notes: None },
            &user,
            &scope(),
            TOKEN,
        )
        .await;

    assert_matches!(result, Err(VisitError::Forbidden(_)));
}

#[tokio::test]
async fn test_record_vitals_then_persist() {
    let server = MockServer::start().await;
    let visit_id = Uuid::new_v4().to_string();
    let patient_id = Uuid::new_v4().to_string();
    mount_visit(&server, &visit_id, &patient_id, "nurse").await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/patient_visits"))
        .and(query_param("current_stage", "eq.nurse"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::visit_response(&visit_id, &patient_id, BRANCH, "nurse")
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let user = TestUser::nurse("nurse@clinic.test", BRANCH).to_user();
    let request = RecordStageDataRequest {
        data: StageData::Nurse(NurseData {
            vitals: Vitals { temperature_c: Some(38.4), pulse_bpm: Some(96), ..Vitals::default() },
            triage_notes: Some("febrile".to_string()),
        }),
        notes: None,
    };

    let result = service_for(&server)
        .record_stage_data(
            Uuid::parse_str(&visit_id).unwrap(),
            VisitStage::Nurse,
            request,
            &user,
            &scope(),
            TOKEN,
        )
        .await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn test_get_visit_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/patient_visits"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let result = service_for(&server).get_visit(Uuid::new_v4(), &scope(), TOKEN).await;
    assert_matches!(result, Err(VisitError::NotFound));
}

#[tokio::test]
async fn test_department_queue_filters_stage_and_status() {
    let server = MockServer::start().await;
    let first = Uuid::new_v4().to_string();
    let second = Uuid::new_v4().to_string();

    let mut early = MockSupabaseResponses::visit_response(&first, &Uuid::new_v4().to_string(), BRANCH, "doctor");
    early["stage_entered_at"] = json!("2026-01-01T08:00:00Z");
    let late = MockSupabaseResponses::visit_response(&second, &Uuid::new_v4().to_string(), BRANCH, "doctor");

    Mock::given(method("GET"))
        .and(path("/rest/v1/patient_visits"))
        .and(query_param("current_stage", "eq.doctor"))
        .and(query_param("status", "eq.in_progress"))
        .and(query_param("order", "stage_entered_at.asc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([late, early])))
        .mount(&server)
        .await;

    let queue = service_for(&server)
        .department_queue(VisitStage::Doctor, &scope(), TOKEN)
        .await
        .unwrap();

    assert_eq!(queue.entries.len(), 2);
    assert_eq!(queue.entries[0].visit_id.to_string(), first);
    assert_eq!(queue.entries[0].position, 1);
    assert!(queue.longest_wait_minutes >= queue.entries[1].waiting_minutes);
}

#[tokio::test]
async fn test_router_requires_authentication() {
    let app = visit_routes(Arc::new(TestConfig::default().to_app_config()));
    let response = app
        .oneshot(Request::builder().uri("/queue/nurse").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_router_rejects_foreign_branch() {
    let config = TestConfig::default();
    let user = TestUser::nurse("nurse@clinic.test", BRANCH);
    let token = JwtTestUtils::create_test_token(&user, &config.jwt_secret, Some(1));

    let app = visit_routes(config.to_arc());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/queue/nurse?branch_id=another-branch")
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

fn closed_visit(visit_id: &str, patient_id: &str, stage: &str, status: &str) -> serde_json::Value {
    let mut visit = MockSupabaseResponses::visit_response(visit_id, patient_id, BRANCH, stage);
    visit["status"] = json!(status);
    visit["closed_at"] = json!("2026-01-01T11:00:00Z");
    visit
}

async fn mount_closed_visit(server: &MockServer, visit_id: &str, patient_id: &str, stage: &str, status: &str) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/patient_visits"))
        .and(query_param("id", format!("eq.{}", visit_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([closed_visit(visit_id, patient_id, stage, status)])))
        .mount(server)
        .await;
}

async fn mount_no_writes(server: &MockServer) {
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/patient_visits"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(server)
        .await;
}

fn app_for(server: &MockServer) -> (axum::Router, TestConfig) {
    let config = TestConfig { supabase_url: server.uri(), ..TestConfig::default() };
    (visit_routes(config.to_arc()), config)
}

#[tokio::test]
async fn test_completed_visit_rejects_department_transition() {
    let server = MockServer::start().await;
    let visit_id = Uuid::new_v4().to_string();
    mount_closed_visit(&server, &visit_id, &Uuid::new_v4().to_string(), "completed", "completed").await;
    mount_no_writes(&server).await;

    for user in [
        TestUser::front_desk("desk@clinic.test", BRANCH).to_user(),
        TestUser::billing("billing@clinic.test", BRANCH).to_user(),
    ] {
        let result = service_for(&server)
            .transition(
                Uuid::parse_str(&visit_id).unwrap(),
                TransitionRequest { target_stage: VisitStage::ReturnedToFrontDesk, notes: None },
                &user,
                &scope(),
                TOKEN,
            )
            .await;
        assert_matches!(result, Err(VisitError::VisitClosed(_)));
    }
}

#[tokio::test]
async fn test_cancelled_visit_transition_is_conflict_over_http() {
    let server = MockServer::start().await;
    let visit_id = Uuid::new_v4().to_string();
    mount_closed_visit(&server, &visit_id, &Uuid::new_v4().to_string(), "doctor", "cancelled").await;
    mount_no_writes(&server).await;

    let (app, config) = app_for(&server);
    let token = JwtTestUtils::create_test_token(&TestUser::lab("lab@clinic.test", BRANCH), &config.jwt_secret, Some(1));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/{}/transition", visit_id))
                .header("Authorization", format!("Bearer {}", token))
                .header("Content-Type", "application/json")
                .body(Body::from(json!({ "target_stage": "billing" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_cancel_visit_stamps_current_stage() {
    let server = MockServer::start().await;
    let visit_id = Uuid::new_v4().to_string();
    let patient_id = Uuid::new_v4().to_string();
    mount_visit(&server, &visit_id, &patient_id, "nurse").await;

    let mut cancelled = MockSupabaseResponses::visit_response(&visit_id, &patient_id, BRANCH, "nurse");
    cancelled["status"] = json!("cancelled");
    cancelled["cancellation_reason"] = json!("Patient left");

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/patient_visits"))
        .and(query_param("current_stage", "eq.nurse"))
        .and(query_param("status", "eq.in_progress"))
        .and(body_partial_json(json!({ "status": "cancelled", "cancellation_reason": "Patient left" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([cancelled])))
        .expect(1)
        .mount(&server)
        .await;

    let user = TestUser::front_desk("desk@clinic.test", BRANCH).to_user();
    let visit = service_for(&server)
        .cancel_visit(Uuid::parse_str(&visit_id).unwrap(), " Patient left ", &user, &scope(), TOKEN)
        .await
        .unwrap();

    assert_eq!(visit.status, VisitStatus::Cancelled);
    assert_eq!(visit.cancellation_reason.as_deref(), Some("Patient left"));
}

#[tokio::test]
async fn test_cancel_completed_visit_is_conflict() {
    let server = MockServer::start().await;
    let visit_id = Uuid::new_v4().to_string();
    mount_closed_visit(&server, &visit_id, &Uuid::new_v4().to_string(), "completed", "completed").await;
    mount_no_writes(&server).await;

    let (app, config) = app_for(&server);
    let token = JwtTestUtils::create_test_token(
        &TestUser::front_desk("desk@clinic.test", BRANCH),
        &config.jwt_secret,
        Some(1),
    );

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/{}/cancel", visit_id))
                .header("Authorization", format!("Bearer {}", token))
                .header("Content-Type", "application/json")
                .body(Body::from(json!({ "reason": "duplicate" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_cancel_visit_requires_front_desk() {
    let server = MockServer::start().await;
    mount_no_writes(&server).await;

    let user = TestUser::doctor("doc@clinic.test", BRANCH).to_user();
    let result = service_for(&server)
        .cancel_visit(Uuid::new_v4(), "no show", &user, &scope(), TOKEN)
        .await;
    assert_matches!(result, Err(VisitError::Forbidden(_)));
}

#[tokio::test]
async fn test_return_to_front_desk_moves_visit() {
    let server = MockServer::start().await;
    let visit_id = Uuid::new_v4().to_string();
    let patient_id = Uuid::new_v4().to_string();
    mount_visit(&server, &visit_id, &patient_id, "doctor").await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/patient_visits"))
        .and(query_param("current_stage", "eq.doctor"))
        .and(body_partial_json(json!({ "current_stage": "returned_to_front_desk" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::visit_response(&visit_id, &patient_id, BRANCH, "returned_to_front_desk")
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let user = TestUser::doctor("doc@clinic.test", BRANCH).to_user();
    let result = service_for(&server)
        .return_to_front_desk(Uuid::parse_str(&visit_id).unwrap(), "needs referral letter", &user, &scope(), TOKEN)
        .await
        .unwrap();

    assert!(result.changed);
    assert_eq!(result.from_stage, VisitStage::Doctor);
    assert_eq!(result.visit.current_stage, VisitStage::ReturnedToFrontDesk);
}

#[tokio::test]
async fn test_return_to_front_desk_needs_reason() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let (app, config) = app_for(&server);
    let token = JwtTestUtils::create_test_token(&TestUser::nurse("nurse@clinic.test", BRANCH), &config.jwt_secret, Some(1));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/{}/return", Uuid::new_v4()))
                .header("Authorization", format!("Bearer {}", token))
                .header("Content-Type", "application/json")
                .body(Body::from(json!({ "reason": "   " }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stage_data_of_wrong_kind_is_bad_request() {
    let server = MockServer::start().await;
    let visit_id = Uuid::new_v4().to_string();
    mount_visit(&server, &visit_id, &Uuid::new_v4().to_string(), "nurse").await;
    mount_no_writes(&server).await;

    let (app, config) = app_for(&server);
    let token = JwtTestUtils::create_test_token(&TestUser::nurse("nurse@clinic.test", BRANCH), &config.jwt_secret, Some(1));

    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(format!("/{}/stages/nurse", visit_id))
                .header("Authorization", format!("Bearer {}", token))
                .header("Content-Type", "application/json")
                .body(Body::from(
                    json!({ "data": { "kind": "pharmacy", "dispensed": [] } }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stage_data_for_other_stage_is_conflict() {
    let server = MockServer::start().await;
    let visit_id = Uuid::new_v4().to_string();
    mount_visit(&server, &visit_id, &Uuid::new_v4().to_string(), "doctor").await;
    mount_no_writes(&server).await;

    let user = TestUser::nurse("nurse@clinic.test", BRANCH).to_user();
    let request = RecordStageDataRequest {
        data: StageData::Nurse(NurseData {
            vitals: Vitals { pulse_bpm: Some(80), ..Vitals::default() },
            triage_notes: None,
        }),
        notes: None,
    };

    let result = service_for(&server)
        .record_stage_data(Uuid::parse_str(&visit_id).unwrap(), VisitStage::Nurse, request, &user, &scope(), TOKEN)
        .await;
    assert_matches!(
        result,
        Err(VisitError::StageMismatch { current: VisitStage::Doctor, requested: VisitStage::Nurse })
    );
}

#[tokio::test]
async fn test_allowed_transitions_over_http() {
    let server = MockServer::start().await;
    let visit_id = Uuid::new_v4().to_string();
    mount_visit(&server, &visit_id, &Uuid::new_v4().to_string(), "lab").await;

    let (app, config) = app_for(&server);
    let token = JwtTestUtils::create_test_token(&TestUser::doctor("doc@clinic.test", BRANCH), &config.jwt_secret, Some(1));

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/{}/transitions", visit_id))
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["current_stage"], "lab");
    assert_eq!(body["allowed_transitions"], json!(["pharmacy", "billing", "returned_to_front_desk"]));
    assert_eq!(body["can_act"], false);
}
