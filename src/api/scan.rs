//! Gate endpoints.

use super::{AppState, publish_updated};
use crate::{
    core::{
        auth::Session,
        redemption::{self, Verdict},
    },
    errors::Result,
};
use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};

/// Body of `POST /scan/verify`.
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    /// Raw text read from the QR code
    pub payload: String,
}

/// Reply to `POST /scan/mark/{student_id}`.
#[derive(Debug, Serialize)]
pub struct MarkResponse {
    /// `false` when the coupon had already been marked
    pub marked: bool,
}

/// Judges one scan. The verdict is always returned once redemption is recorded.
pub async fn verify(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<Verdict>> {
    let verdict = redemption::verify(&state.db, &session, &request.payload).await?;
    if let Verdict::Valid { student } = &verdict {
        publish_updated(&state, &student.student_id).await;
    }
    Ok(Json(verdict))
}

/// Retries the write after a `valid_but_unmarked` verdict.
pub async fn mark(
    State(state): State<AppState>,
    session: Session,
    Path(student_id): Path<String>,
) -> Result<Json<MarkResponse>> {
    let marked = redemption::retry_mark(&state.db, &session, &student_id).await?;
    if marked {
        publish_updated(&state, &student_id).await;
    }
    Ok(Json(MarkResponse { marked }))
}
