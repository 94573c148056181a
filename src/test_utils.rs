//! Shared test utilities for `FeastPass`.
//!
//! This module provides common helper functions for setting up test databases,
//! sessions and students with sensible defaults, plus an in-memory mailer.
#![allow(clippy::unwrap_used, missing_docs)]

use crate::{
    core::{
        auth::Session,
        new_record_id,
        student::{self, NewStudent, StudentInput},
    },
    entities::{PaymentMethod, Role, StudentModel, account, session},
    errors::{Error, Result},
    mailer::{CouponEmail, EmailSender},
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    init_test_tracing();
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Creates a test student with sensible defaults.
///
/// # Defaults
/// * email: name lowercased with spaces removed, `@example.com`
/// * roll: "21"
/// * year: "3"
/// * food: veg
pub async fn create_test_student(
    db: &DatabaseConnection,
    name: &str,
    payment: Option<PaymentMethod>,
) -> Result<StudentModel> {
    let new = NewStudent::new(StudentInput {
        name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase().replace(' ', "")),
        roll: "21".to_string(),
        year: "3".to_string(),
        payment_method: payment.map(|p| match p {
            PaymentMethod::Online => "online".to_string(),
            PaymentMethod::Offline => "offline".to_string(),
        }),
        ..StudentInput::default()
    })?;
    student::create_student(db, new).await
}

/// Creates an account with `role` and a live session for it, bypassing the
/// emailed code.
pub async fn create_session(db: &DatabaseConnection, role: Role) -> Result<Session> {
    let account = account::ActiveModel {
        id: Set(new_record_id()),
        email: Set(format!("{}-{}@example.com", role.as_str(), new_record_id())),
        role: Set(role),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await?;

    let token = new_record_id();
    let expires_at = Utc::now() + Duration::hours(1);
    session::ActiveModel {
        token: Set(token.clone()),
        account_id: Set(account.id.clone()),
        created_at: Set(Utc::now()),
        expires_at: Set(expires_at),
    }
    .insert(db)
    .await?;

    Ok(Session {
        token,
        account_id: account.id,
        email: account.email,
        role,
        expires_at,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MailerMode {
    Configured,
    Unconfigured,
    Failing,
}

/// [`EmailSender`] that records what it was asked to send.
#[derive(Debug)]
pub struct RecordingMailer {
    mode: MailerMode,
    coupons: Mutex<Vec<CouponEmail>>,
    login_codes: Mutex<Vec<(String, String)>>,
}

impl RecordingMailer {
    fn with_mode(mode: MailerMode) -> Self {
        Self {
            mode,
            coupons: Mutex::new(Vec::new()),
            login_codes: Mutex::new(Vec::new()),
        }
    }

    pub fn configured() -> Self {
        Self::with_mode(MailerMode::Configured)
    }

    pub fn unconfigured() -> Self {
        Self::with_mode(MailerMode::Unconfigured)
    }

    /// Configured, but every delivery fails as if the endpoint returned 500.
    pub fn failing() -> Self {
        Self::with_mode(MailerMode::Failing)
    }

    pub fn coupons(&self) -> Vec<CouponEmail> {
        self.coupons.lock().unwrap().clone()
    }

    pub fn login_codes(&self) -> Vec<(String, String)> {
        self.login_codes.lock().unwrap().clone()
    }

    fn outcome(&self) -> Result<()> {
        match self.mode {
            MailerMode::Configured => Ok(()),
            MailerMode::Unconfigured => Err(Error::EmailNotConfigured),
            MailerMode::Failing => Err(Error::EmailDelivery {
                reason: "endpoint responded with 500 Internal Server Error".to_string(),
            }),
        }
    }
}

#[async_trait]
impl EmailSender for RecordingMailer {
    fn is_configured(&self) -> bool {
        self.mode != MailerMode::Unconfigured
    }

    async fn send_coupon(&self, email: &CouponEmail) -> Result<()> {
        self.outcome()?;
        self.coupons.lock().unwrap().push(email.clone());
        Ok(())
    }

    async fn send_login_code(&self, to: &str, code: &str) -> Result<()> {
        self.outcome()?;
        self.login_codes
            .lock()
            .unwrap()
            .push((to.to_string(), code.to_string()));
        Ok(())
    }
}
