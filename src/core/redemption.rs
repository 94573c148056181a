//! Redemption - Turning scanned text into an admission decision at the gate.
//!
//! Nothing a scanner produces is an error here. Garbage, forged, stale and reused
//! coupons all come back as a [`Verdict`] for the operator to act on; only store
//! failures and permission problems surface as [`Error`].

use crate::{
    core::{
        auth::{self, Session},
        coupon::{self, CouponPayload},
        student::{self, year_short_label},
    },
    entities::{Role, student as student_entity},
    errors::{Error, Result},
};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

/// What the gate shows about an admitted (or previously admitted) student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScannedStudent {
    /// Record id
    pub student_id: String,
    /// Full name
    pub name: String,
    /// Roll number as entered
    pub roll: String,
    /// Short label such as `"2nd"`
    pub year: String,
    /// `"Veg"` or `"Non Veg"`
    pub food: String,
}

impl From<&student_entity::Model> for ScannedStudent {
    fn from(student: &student_entity::Model) -> Self {
        Self {
            student_id: student.id.clone(),
            name: student.name.clone(),
            roll: student.roll.clone(),
            year: year_short_label(&student.year),
            food: student.food_preference.label().to_string(),
        }
    }
}

/// Outcome of verifying one scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    /// Not a coupon payload, or no stored coupon matches all three fields
    Malformed,
    /// The coupon is genuine but its student has been deleted
    StudentNotFound {
        /// Student id carried by the coupon
        student_id: String,
    },
    /// The meal was already served; nothing was changed
    AlreadyRedeemed {
        /// Whose coupon it was
        student: ScannedStudent,
    },
    /// The coupon is genuine and unused but recording the redemption failed.
    /// The operator may serve and retry with [`retry_mark`].
    ValidButUnmarked {
        /// Who to serve
        student: ScannedStudent,
        /// Store error from the failed write
        reason: String,
    },
    /// Admitted; the coupon is now spent
    Valid {
        /// Who to serve
        student: ScannedStudent,
    },
}

impl Verdict {
    /// Short name used in logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::StudentNotFound { .. } => "student_not_found",
            Self::AlreadyRedeemed { .. } => "already_redeemed",
            Self::ValidButUnmarked { .. } => "valid_but_unmarked",
            Self::Valid { .. } => "valid",
        }
    }
}

/// Checks scanned text against the coupon and student stores and, when the coupon
/// is unspent, marks it redeemed.
///
/// Requires an organizer or admin session.
#[instrument(skip(db, session, raw), fields(operator = %session.email))]
pub async fn verify(db: &DatabaseConnection, session: &Session, raw: &str) -> Result<Verdict> {
    auth::authorize(db, session, Role::Organizer).await?;

    let verdict = evaluate(db, raw).await?;
    match &verdict {
        Verdict::Valid { student } => info!(student_id = %student.student_id, "Coupon redeemed"),
        Verdict::ValidButUnmarked { student, reason } => {
            error!(student_id = %student.student_id, %reason, "Coupon valid but redemption not recorded");
        }
        other => warn!(verdict = other.as_str(), "Coupon rejected"),
    }
    Ok(verdict)
}

async fn evaluate(db: &DatabaseConnection, raw: &str) -> Result<Verdict> {
    let Some(payload) = CouponPayload::parse(raw) else {
        return Ok(Verdict::Malformed);
    };

    let coupon = coupon::get_coupon_by_id(db, &payload.coupon_id).await?;
    if !coupon.is_some_and(|c| payload.matches(&c)) {
        return Ok(Verdict::Malformed);
    }

    let Some(record) = student::get_student_by_id(db, &payload.student_id).await? else {
        return Ok(Verdict::StudentNotFound {
            student_id: payload.student_id,
        });
    };
    Ok(decide(db, &record).await)
}

/// Redeems `record` unless it is already spent. `record` may be stale; the
/// conditional write has the final say.
async fn decide(db: &DatabaseConnection, record: &student_entity::Model) -> Verdict {
    let scanned = ScannedStudent::from(record);

    if record.coupon_redeemed {
        return Verdict::AlreadyRedeemed { student: scanned };
    }

    match student::mark_redeemed(db, &record.id).await {
        Ok(true) => Verdict::Valid { student: scanned },
        // Another gate flipped the flag between our read and write.
        Ok(false) => Verdict::AlreadyRedeemed { student: scanned },
        Err(e) => Verdict::ValidButUnmarked {
            student: scanned,
            reason: e.to_string(),
        },
    }
}

/// Retries recording a redemption after [`Verdict::ValidButUnmarked`].
///
/// Returns `true` if this call flipped the flag, `false` if it was already set.
///
/// # Errors
/// [`Error::Validation`] when the student was never issued a coupon.
#[instrument(skip(db, session), fields(operator = %session.email))]
pub async fn retry_mark(db: &DatabaseConnection, session: &Session, student_id: &str) -> Result<bool> {
    auth::authorize(db, session, Role::Organizer).await?;

    if student::get_student_by_id(db, student_id).await?.is_none() {
        return Err(Error::StudentNotFound {
            id: student_id.to_string(),
        });
    }
    if coupon::find_coupon_for_student(db, student_id).await?.is_none() {
        warn!(student_id, "Redemption retry for a student without a coupon");
        return Err(Error::Validation {
            message: format!("Student {student_id} has no coupon to redeem"),
        });
    }

    let flipped = student::mark_redeemed(db, student_id).await?;
    info!(flipped, "Redemption retry recorded");
    Ok(flipped)
}
