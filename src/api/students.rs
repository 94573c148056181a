//! Roster endpoints: CRUD, statistics, live changes, bulk import and issuance.

use super::{AppState, publish_updated};
use crate::{
    config::FeatureRules,
    core::{
        auth::{self, Session},
        import::{self, ColumnMapping, ImportSummary},
        issuance::{self, IssueReport},
        roster::StudentEvent,
        student::{self, NewStudent, StudentInput, StudentQuery, StudentStats},
    },
    entities::{Role, StudentModel},
    errors::{Error, Result},
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use serde::Deserialize;
use std::convert::Infallible;
use tokio_stream::{Stream, StreamExt, wrappers::BroadcastStream};

fn require_editing(features: FeatureRules) -> Result<()> {
    if features.enable_editing {
        Ok(())
    } else {
        Err(Error::FeatureDisabled {
            feature: "editing".to_string(),
        })
    }
}

/// `?year=` query for the stats endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct YearFilter {
    /// Stored year value; absent means every year
    pub year: Option<String>,
}

/// CSV text plus how to map it, shared by preview and import.
#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    /// Raw CSV text, header first
    pub csv: String,
    /// Header to field mapping
    pub mapping: ColumnMapping,
    /// Year every imported row is filed under
    pub year: String,
}

impl ImportRequest {
    fn rows(&self) -> Result<Vec<NewStudent>> {
        let table = import::parse_csv(&self.csv)?;
        import::preview(&table, &self.mapping, &self.year)
    }
}

/// Lists the roster with the requested filter and order.
pub async fn list(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<StudentQuery>,
) -> Result<Json<Vec<StudentModel>>> {
    auth::authorize(&state.db, &session, Role::Organizer).await?;
    Ok(Json(student::list_students(&state.db, &query).await?))
}

/// Adds one student.
pub async fn create(
    State(state): State<AppState>,
    session: Session,
    Json(input): Json<StudentInput>,
) -> Result<(StatusCode, Json<StudentModel>)> {
    auth::authorize(&state.db, &session, Role::Admin).await?;
    require_editing(state.config.features)?;

    let created = student::create_student(&state.db, NewStudent::new(input)?).await?;
    state.feed.publish(StudentEvent::Created {
        student: created.clone(),
    });
    Ok((StatusCode::CREATED, Json(created)))
}

/// Replaces a student's fields; coupon flags are kept.
pub async fn update(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Json(input): Json<StudentInput>,
) -> Result<Json<StudentModel>> {
    auth::authorize(&state.db, &session, Role::Admin).await?;
    require_editing(state.config.features)?;

    let updated = student::update_student(&state.db, &id, NewStudent::new(input)?).await?;
    state.feed.publish(StudentEvent::Updated {
        student: updated.clone(),
    });
    Ok(Json(updated))
}

/// Deletes a student. Any coupon is left behind.
pub async fn remove(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    auth::authorize(&state.db, &session, Role::Admin).await?;
    require_editing(state.config.features)?;

    student::delete_student(&state.db, &id).await?;
    state.feed.publish(StudentEvent::Deleted { id });
    Ok(StatusCode::NO_CONTENT)
}

/// Roster counts, optionally for one year.
pub async fn stats(
    State(state): State<AppState>,
    session: Session,
    Query(filter): Query<YearFilter>,
) -> Result<Json<StudentStats>> {
    auth::authorize(&state.db, &session, Role::Organizer).await?;
    Ok(Json(
        student::student_stats(&state.db, filter.year.as_deref()).await?,
    ))
}

/// Streams [`StudentEvent`]s as server-sent events. Events missed by a lagging
/// client are skipped.
pub async fn events(
    State(state): State<AppState>,
    session: Session,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    auth::authorize(&state.db, &session, Role::Organizer).await?;

    let stream = BroadcastStream::new(state.feed.subscribe()).filter_map(|event| {
        event
            .ok()
            .and_then(|event| Event::default().json_data(event).ok())
            .map(Ok)
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Shows the rows an import would insert, without writing.
pub async fn import_preview(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<ImportRequest>,
) -> Result<Json<Vec<NewStudent>>> {
    auth::authorize(&state.db, &session, Role::Admin).await?;
    Ok(Json(request.rows()?))
}

/// Inserts the previewed rows.
pub async fn import_rows(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<ImportRequest>,
) -> Result<Json<ImportSummary>> {
    require_editing(state.config.features)?;
    let rows = request.rows()?;

    let mut summary = import::import(&state.db, &session, rows).await?;
    for student in summary.created.drain(..) {
        state.feed.publish(StudentEvent::Created { student });
    }
    Ok(Json(summary))
}

/// Issues or re-sends a student's coupon. The report is returned even when the
/// email failed.
pub async fn issue_coupon(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<Json<IssueReport>> {
    let report = issuance::issue(
        &state.db,
        state.mailer.as_ref(),
        state.config.features,
        &session,
        &id,
    )
    .await?;

    if report.coupon_created {
        publish_updated(&state, &id).await;
    }
    Ok(Json(report))
}
