//! HTTP API.
//!
//! A thin JSON layer over [`crate::core`]. Handlers resolve the bearer token into a
//! [`Session`](crate::core::auth::Session), call one workflow, publish any roster
//! change to the [`StudentFeed`], and map errors through
//! [`IntoResponse`](axum::response::IntoResponse).

pub mod auth;
pub mod response;
pub mod scan;
pub mod students;

use crate::{
    config::AppConfig,
    core::{
        roster::{StudentEvent, StudentFeed},
        student,
    },
    errors::Result,
    mailer::EmailSender,
};
use axum::{
    Json, Router,
    routing::{get, post, put},
};
use sea_orm::DatabaseConnection;
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Roster, coupon and account store
    pub db: DatabaseConnection,
    /// Outbound coupon and login code delivery
    pub mailer: Arc<dyn EmailSender>,
    /// Loaded once at startup
    pub config: Arc<AppConfig>,
    /// Roster change fan-out for `/students/events`
    pub feed: StudentFeed,
}

/// Re-reads a student whose record was just changed and publishes it.
///
/// The change is already committed when this runs, so a failed read is logged and
/// never turned into an error for the caller.
async fn publish_updated(state: &AppState, student_id: &str) {
    match student::get_student_by_id(&state.db, student_id).await {
        Ok(Some(student)) => state.feed.publish(StudentEvent::Updated { student }),
        Ok(None) => debug!(student_id, "Changed student is gone; nothing published"),
        Err(e) => warn!(student_id, error = %e, "Failed to publish roster update"),
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/auth/login-code", post(auth::request_code))
        .route(
            "/auth/session",
            post(auth::create_session).delete(auth::delete_session),
        )
        .route("/me", get(auth::me))
        .route("/students", get(students::list).post(students::create))
        .route("/students/stats", get(students::stats))
        .route("/students/events", get(students::events))
        .route("/students/import/preview", post(students::import_preview))
        .route("/students/import", post(students::import_rows))
        .route(
            "/students/{id}",
            put(students::update).delete(students::remove),
        )
        .route("/students/{id}/coupon", post(students::issue_coupon))
        .route("/scan/verify", post(scan::verify))
        .route("/scan/mark/{student_id}", post(scan::mark))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds `config.server.bind` and serves until the process is stopped.
pub async fn serve(state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&state.config.server.bind).await?;
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::auth::Session;
    use crate::core::coupon::{CouponPayload, find_coupon_for_student};
    use crate::entities::{PaymentMethod, Role};
    use crate::test_utils::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request, StatusCode, header};
    use sea_orm::ConnectionTrait;
    use tokio::sync::broadcast::error::TryRecvError;
    use tower::ServiceExt;

    struct Harness {
        state: AppState,
        mailer: Arc<RecordingMailer>,
    }

    async fn harness() -> Harness {
        let db = setup_test_db().await.unwrap();
        let mailer = Arc::new(RecordingMailer::configured());
        let config = AppConfig {
            auth: crate::config::AuthConfig {
                admins: vec!["head@example.com".to_string()],
                ..Default::default()
            },
            ..AppConfig::default()
        };
        Harness {
            state: AppState {
                db,
                mailer: Arc::clone(&mailer) as Arc<dyn EmailSender>,
                config: Arc::new(config),
                feed: StudentFeed::new(),
            },
            mailer,
        }
    }

    async fn send(
        state: &AppState,
        method: Method,
        uri: &str,
        session: Option<&Session>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(session) = session {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", session.token));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn student_body(name: &str, payment: &str) -> Value {
        json!({
            "name": name,
            "email": format!("{}@example.com", name.to_lowercase()),
            "roll": "7",
            "year": "2",
            "food_preference": "non-veg",
            "payment_method": payment,
        })
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness().await;
        let (status, body) = send(&h.state, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_missing_token_is_401_with_message() {
        let h = harness().await;
        let (status, body) = send(&h.state, Method::GET, "/students", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Login required");
    }

    #[tokio::test]
    async fn test_login_flow() {
        let h = harness().await;
        let (status, _) = send(
            &h.state,
            Method::POST,
            "/auth/login-code",
            None,
            Some(json!({ "email": "Head@Example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let (_, code) = h.mailer.login_codes().pop().unwrap();
        let (status, body) = send(
            &h.state,
            Method::POST,
            "/auth/session",
            None,
            Some(json!({ "email": "head@example.com", "code": code })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["role"], "admin");
        let token = body["token"].as_str().unwrap().to_string();

        let session = crate::core::auth::authenticate(&h.state.db, &token).await.unwrap();
        let (status, body) = send(&h.state, Method::GET, "/me", Some(&session), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "head@example.com");
        assert!(body.get("token").is_none());

        let (status, _) = send(&h.state, Method::DELETE, "/auth/session", Some(&session), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&h.state, Method::GET, "/me", Some(&session), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_student_crud_publishes_events() {
        let h = harness().await;
        let admin = create_session(&h.state.db, Role::Admin).await.unwrap();
        let mut events = h.state.feed.subscribe();

        let (status, created) = send(
            &h.state,
            Method::POST,
            "/students",
            Some(&admin),
            Some(student_body("Mira", "online")),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["food_preference"], "non-veg");
        assert_eq!(created["payment_method"], "online");
        let id = created["id"].as_str().unwrap().to_string();
        assert!(matches!(events.recv().await.unwrap(), StudentEvent::Created { .. }));

        let (status, updated) = send(
            &h.state,
            Method::PUT,
            &format!("/students/{id}"),
            Some(&admin),
            Some(student_body("Mira", "")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["payment_method"], Value::Null);

        let (status, list) = send(
            &h.state,
            Method::GET,
            "/students?year=2&sort=name&direction=desc",
            Some(&admin),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);

        let (status, _) = send(
            &h.state,
            Method::DELETE,
            &format!("/students/{id}"),
            Some(&admin),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(
            &h.state,
            Method::DELETE,
            &format!("/students/{id}"),
            Some(&admin),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_organizer_cannot_edit() {
        let h = harness().await;
        let organizer = create_session(&h.state.db, Role::Organizer).await.unwrap();
        let (status, body) = send(
            &h.state,
            Method::POST,
            "/students",
            Some(&organizer),
            Some(student_body("Mira", "online")),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body["message"].as_str().unwrap().contains("admin"));
    }

    #[tokio::test]
    async fn test_blank_name_is_400() {
        let h = harness().await;
        let admin = create_session(&h.state.db, Role::Admin).await.unwrap();
        let (status, _) = send(
            &h.state,
            Method::POST,
            "/students",
            Some(&admin),
            Some(student_body(" ", "online")),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_issue_then_scan() {
        let h = harness().await;
        let admin = create_session(&h.state.db, Role::Admin).await.unwrap();
        let gate = create_session(&h.state.db, Role::Organizer).await.unwrap();
        let paid = create_test_student(&h.state.db, "Paid", Some(PaymentMethod::Online))
            .await
            .unwrap();
        let unpaid = create_test_student(&h.state.db, "Unpaid", None).await.unwrap();

        let (status, _) = send(
            &h.state,
            Method::POST,
            &format!("/students/{}/coupon", unpaid.id),
            Some(&admin),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, report) = send(
            &h.state,
            Method::POST,
            &format!("/students/{}/coupon", paid.id),
            Some(&admin),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["delivery"]["status"], "sent");
        assert_eq!(h.mailer.coupons().len(), 1);

        let coupon = find_coupon_for_student(&h.state.db, &paid.id)
            .await
            .unwrap()
            .unwrap();
        let payload = CouponPayload::from(&coupon).to_string();

        let (status, verdict) = send(
            &h.state,
            Method::POST,
            "/scan/verify",
            Some(&gate),
            Some(json!({ "payload": payload })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(verdict["verdict"], "valid");
        assert_eq!(verdict["student"]["food"], "Veg");

        let (_, verdict) = send(
            &h.state,
            Method::POST,
            "/scan/verify",
            Some(&gate),
            Some(json!({ "payload": payload })),
        )
        .await;
        assert_eq!(verdict["verdict"], "already_redeemed");

        let (status, body) = send(
            &h.state,
            Method::POST,
            &format!("/scan/mark/{}", paid.id),
            Some(&gate),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["marked"], false);

        let (_, stats) = send(&h.state, Method::GET, "/students/stats", Some(&gate), None).await;
        assert_eq!(stats["coupons_generated"], 1);
        assert_eq!(stats["coupons_redeemed"], 1);
    }

    #[tokio::test]
    async fn test_import_preview_and_import() {
        let h = harness().await;
        let admin = create_session(&h.state.db, Role::Admin).await.unwrap();
        let request = json!({
            "csv": "Name,Email,Roll\nJane,jane@x.com,1\n,skip@x.com,2\n",
            "mapping": { "name": "Name", "email": "Email", "roll": "Roll" },
            "year": "1",
        });

        let (status, preview) = send(
            &h.state,
            Method::POST,
            "/students/import/preview",
            Some(&admin),
            Some(request.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(preview.as_array().unwrap().len(), 1);
        assert_eq!(preview[0]["food_preference"], "veg");

        let (status, summary) = send(
            &h.state,
            Method::POST,
            "/students/import",
            Some(&admin),
            Some(request),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary, json!({ "successful": 1, "failed": 0 }));
    }

    #[tokio::test]
    async fn test_editing_switch() {
        let mut h = harness().await;
        let admin = create_session(&h.state.db, Role::Admin).await.unwrap();
        let mut config = (*h.state.config).clone();
        config.features.enable_editing = false;
        h.state.config = Arc::new(config);

        let (status, _) = send(
            &h.state,
            Method::POST,
            "/students",
            Some(&admin),
            Some(student_body("Mira", "online")),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_mark_without_coupon_is_rejected() {
        let h = harness().await;
        let gate = create_session(&h.state.db, Role::Organizer).await.unwrap();
        let unpaid = create_test_student(&h.state.db, "Unpaid", None).await.unwrap();

        let (status, _) = send(
            &h.state,
            Method::POST,
            &format!("/scan/mark/{}", unpaid.id),
            Some(&gate),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, stats) = send(&h.state, Method::GET, "/students/stats", Some(&gate), None).await;
        assert_eq!(stats["coupons_redeemed"], 0);
    }

    #[tokio::test]
    async fn test_publish_after_commit_survives_store_failure() {
        let h = harness().await;
        let student = create_test_student(&h.state.db, "Paid", Some(PaymentMethod::Online))
            .await
            .unwrap();
        let mut events = h.state.feed.subscribe();

        publish_updated(&h.state, &student.id).await;
        assert!(matches!(events.try_recv(), Ok(StudentEvent::Updated { .. })));

        h.state.db.execute_unprepared("DROP TABLE students").await.unwrap();
        publish_updated(&h.state, &student.id).await;
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }
}
