//! Issuance - Creating a student's coupon and emailing it as a QR code.
//!
//! Every precondition is checked before anything is written, so a refused request
//! leaves no trace. Once the coupon exists it is never rolled back: a failed
//! delivery is reported and the admin can simply issue again, which reuses the
//! stored coupon.

use crate::{
    config::FeatureRules,
    core::{
        auth::{self, Session},
        coupon::{self, CouponPayload},
        student::{self, year_short_label},
    },
    entities::Role,
    errors::{Error, Result},
    mailer::{CouponEmail, EmailSender},
    qr,
};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

/// Whether the coupon email reached the email endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Delivery {
    /// The endpoint accepted the email
    Sent,
    /// The coupon exists but the email did not go out
    Failed {
        /// Transport or endpoint error
        reason: String,
    },
}

/// Result of one issuance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueReport {
    /// Who the coupon belongs to
    pub student_id: String,
    /// Stored coupon, new or existing
    pub coupon_id: String,
    /// `false` when an existing coupon was re-sent
    pub coupon_created: bool,
    /// Outcome of the email step
    pub delivery: Delivery,
}

/// Issues (or re-sends) the coupon for `student_id`.
///
/// # Errors
/// Fails before any write when the caller is not an admin, email sending is
/// switched off, the student is missing or unpaid, no email endpoint is configured,
/// or a field the email needs is blank. Delivery failures are not errors; they are
/// reported in [`IssueReport::delivery`].
#[instrument(skip(db, mailer, features, session), fields(admin = %session.email))]
pub async fn issue<M>(
    db: &DatabaseConnection,
    mailer: &M,
    features: FeatureRules,
    session: &Session,
    student_id: &str,
) -> Result<IssueReport>
where
    M: EmailSender + ?Sized,
{
    let session = auth::authorize(db, session, Role::Admin).await?;
    if !features.enable_email_sending {
        return Err(Error::FeatureDisabled {
            feature: "email sending".to_string(),
        });
    }

    let record = student::get_student_by_id(db, student_id)
        .await?
        .ok_or_else(|| Error::StudentNotFound {
            id: student_id.to_string(),
        })?;
    if record.payment_method.is_none() {
        return Err(Error::Unpaid {
            id: student_id.to_string(),
        });
    }
    if !mailer.is_configured() {
        return Err(Error::EmailNotConfigured);
    }

    let year = year_short_label(&record.year);
    if [&record.name, &record.email, &record.roll, &year]
        .iter()
        .any(|field| field.trim().is_empty())
    {
        return Err(Error::Validation {
            message: "Name, email, roll and year are required to send a coupon".to_string(),
        });
    }

    let (stored, coupon_created) = match coupon::find_coupon_for_student(db, &record.id).await? {
        Some(existing) => (existing, false),
        None => {
            let created = coupon::create_coupon(db, &record.id, &session.email).await?;
            if let Err(e) = student::set_coupon_generated(db, &record.id).await {
                error!(error = %e, "Coupon created but coupon_generated flag not set");
            }
            info!(coupon_id = %created.id, "Coupon created");
            (created, true)
        }
    };

    let qr_png = qr::encode_png(&CouponPayload::from(&stored).to_string())?;
    let email = CouponEmail {
        name: record.name,
        email: record.email,
        roll: record.roll,
        year,
        food: record.food_preference.label().to_string(),
        qr_png,
    };

    let delivery = match mailer.send_coupon(&email).await {
        Ok(()) => Delivery::Sent,
        Err(e) => {
            warn!(error = %e, "Coupon email not delivered");
            Delivery::Failed {
                reason: e.to_string(),
            }
        }
    };

    Ok(IssueReport {
        student_id: record.id,
        coupon_id: stored.id,
        coupon_created,
        delivery,
    })
}
