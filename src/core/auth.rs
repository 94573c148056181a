//! Authentication - Emailed one-time codes, bearer sessions and role checks.
//!
//! Roles are not stored as a source of truth. Every login re-reads them from the
//! `[auth]` configuration, and every privileged workflow calls [`authorize`] to
//! re-load the session from the database instead of trusting a cached [`Session`].

use crate::{
    config::AuthConfig,
    entities::{Account, LoginCode, Role, Session as SessionEntity, account, login_code, session},
    errors::{Error, Result},
    mailer::EmailSender,
};
use chrono::{DateTime, Duration, Utc};
use rand::{Rng, distributions::Alphanumeric};
use regex::Regex;
use sea_orm::{Set, prelude::*, sea_query::Expr};
use serde::Serialize;
use std::sync::LazyLock;
use tracing::{info, instrument, warn};

const TOKEN_LENGTH: usize = 48;

/// Wrong guesses a pending login code survives before it is discarded.
pub const MAX_CODE_ATTEMPTS: i32 = 5;

#[allow(clippy::expect_used)]
static EMAIL_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is a valid regex")
});

/// An authenticated caller, as resolved from a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    /// Bearer token presented by the client
    #[serde(skip)]
    pub token: String,
    /// Owning account
    pub account_id: String,
    /// Lowercased login address
    pub email: String,
    /// Role stored when the session was resolved
    pub role: Role,
    /// The token is refused from this instant on
    pub expires_at: DateTime<Utc>,
}

/// Role configured for `email`. Admin wins when an address is listed twice.
#[must_use]
pub fn role_for(config: &AuthConfig, email: &str) -> Role {
    let listed = |list: &[String]| list.iter().any(|e| e.trim().eq_ignore_ascii_case(email));
    if listed(&config.admins) {
        Role::Admin
    } else if listed(&config.organizers) {
        Role::Organizer
    } else {
        Role::Member
    }
}

fn normalize_email(raw: &str) -> Result<String> {
    let email = raw.trim().to_lowercase();
    if EMAIL_SHAPE.is_match(&email) {
        Ok(email)
    } else {
        Err(Error::Validation {
            message: format!("'{}' is not a valid email address", raw.trim()),
        })
    }
}

/// `now + amount`, refusing a configured TTL too large to represent.
fn expiry(
    now: DateTime<Utc>,
    amount: i64,
    unit: fn(i64) -> Option<Duration>,
    setting: &str,
) -> Result<DateTime<Utc>> {
    unit(amount)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| Error::Config {
            message: format!("auth.{setting} = {amount} is out of range"),
        })
}

fn generate_login_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

async fn find_account(db: &DatabaseConnection, email: &str) -> Result<Option<account::Model>> {
    Account::find()
        .filter(account::Column::Email.eq(email))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Brings the stored role in line with configuration, creating the account on first use.
async fn sync_account(
    db: &DatabaseConnection,
    config: &AuthConfig,
    email: &str,
) -> Result<account::Model> {
    let role = role_for(config, email);
    match find_account(db, email).await? {
        Some(existing) if existing.role == role => Ok(existing),
        Some(existing) => {
            info!(email, from = existing.role.as_str(), to = role.as_str(), "Role changed");
            let mut active: account::ActiveModel = existing.into();
            active.role = Set(role);
            active.update(db).await.map_err(Into::into)
        }
        None => {
            info!(email, role = role.as_str(), "Creating account");
            account::ActiveModel {
                id: Set(super::new_record_id()),
                email: Set(email.to_string()),
                role: Set(role),
                created_at: Set(Utc::now()),
            }
            .insert(db)
            .await
            .map_err(Into::into)
        }
    }
}

/// Emails a fresh six digit login code, replacing any code still pending.
#[instrument(skip(db, mailer, config))]
pub async fn request_login_code<M>(
    db: &DatabaseConnection,
    mailer: &M,
    config: &AuthConfig,
    email: &str,
) -> Result<()>
where
    M: EmailSender + ?Sized,
{
    let email = normalize_email(email)?;
    let expires_at = expiry(
        Utc::now(),
        config.code_ttl_minutes,
        Duration::try_minutes,
        "code_ttl_minutes",
    )?;
    let account = sync_account(db, config, &email).await?;

    LoginCode::delete_many()
        .filter(login_code::Column::AccountId.eq(&account.id))
        .exec(db)
        .await?;

    let code = generate_login_code();
    login_code::ActiveModel {
        account_id: Set(account.id.clone()),
        code: Set(code.clone()),
        expires_at: Set(expires_at),
        attempts: Set(0),
        ..Default::default()
    }
    .insert(db)
    .await?;

    mailer.send_login_code(&email, &code).await?;
    info!("Login code sent");
    Ok(())
}

/// Counts a wrong guess against the pending code and discards it once
/// [`MAX_CODE_ATTEMPTS`] is reached.
async fn record_failed_attempt(db: &DatabaseConnection, pending: &login_code::Model) -> Result<()> {
    LoginCode::update_many()
        .col_expr(
            login_code::Column::Attempts,
            Expr::col(login_code::Column::Attempts).add(1),
        )
        .filter(login_code::Column::Id.eq(pending.id))
        .exec(db)
        .await?;

    let burned = LoginCode::delete_many()
        .filter(login_code::Column::Id.eq(pending.id))
        .filter(login_code::Column::Attempts.gte(MAX_CODE_ATTEMPTS))
        .exec(db)
        .await?;

    if burned.rows_affected > 0 {
        warn!("Login code discarded after too many wrong guesses");
    } else {
        warn!(attempts = pending.attempts + 1, "Rejected login code");
    }
    Ok(())
}

/// Exchanges a login code for a session. Codes are single use, and a code is
/// discarded after [`MAX_CODE_ATTEMPTS`] wrong guesses.
///
/// # Errors
/// [`Error::Unauthorized`] for an unknown email, a wrong code or an expired code.
#[instrument(skip(db, config, code))]
pub async fn verify_login_code(
    db: &DatabaseConnection,
    config: &AuthConfig,
    email: &str,
    code: &str,
) -> Result<Session> {
    let email = normalize_email(email)?;
    let account = find_account(db, &email).await?.ok_or(Error::Unauthorized)?;

    let pending = LoginCode::find()
        .filter(login_code::Column::AccountId.eq(&account.id))
        .one(db)
        .await?;

    let now = Utc::now();
    let Some(pending) = pending.filter(|c| c.expires_at > now) else {
        warn!("No live login code for account");
        return Err(Error::Unauthorized);
    };
    if pending.code != code.trim() {
        record_failed_attempt(db, &pending).await?;
        return Err(Error::Unauthorized);
    }

    let expires_at = expiry(
        now,
        config.session_ttl_hours,
        Duration::try_hours,
        "session_ttl_hours",
    )?;
    LoginCode::delete_many()
        .filter(login_code::Column::AccountId.eq(&pending.account_id))
        .exec(db)
        .await?;

    let account = sync_account(db, config, &email).await?;
    let token = generate_token();
    session::ActiveModel {
        token: Set(token.clone()),
        account_id: Set(account.id.clone()),
        created_at: Set(now),
        expires_at: Set(expires_at),
    }
    .insert(db)
    .await?;

    info!(role = account.role.as_str(), "Session started");
    Ok(Session {
        token,
        account_id: account.id,
        email: account.email,
        role: account.role,
        expires_at,
    })
}

/// Resolves a bearer token. Expired sessions are deleted on sight.
pub async fn authenticate(db: &DatabaseConnection, token: &str) -> Result<Session> {
    let stored = SessionEntity::find_by_id(token.to_string())
        .one(db)
        .await?
        .ok_or(Error::Unauthorized)?;

    if stored.expires_at <= Utc::now() {
        SessionEntity::delete_by_id(stored.token).exec(db).await?;
        return Err(Error::Unauthorized);
    }

    let account = Account::find_by_id(stored.account_id.clone())
        .one(db)
        .await?
        .ok_or(Error::Unauthorized)?;

    Ok(Session {
        token: stored.token,
        account_id: account.id,
        email: account.email,
        role: account.role,
        expires_at: stored.expires_at,
    })
}

/// Re-validates `session` against the database and checks it grants `required`.
/// Returns the fresh session.
pub async fn authorize(db: &DatabaseConnection, session: &Session, required: Role) -> Result<Session> {
    let current = authenticate(db, &session.token).await?;
    if current.role.satisfies(required) {
        Ok(current)
    } else {
        warn!(email = %current.email, required = required.as_str(), "Permission denied");
        Err(Error::Forbidden {
            required: required.as_str().to_string(),
        })
    }
}

/// Ends a session. Unknown tokens are ignored.
pub async fn logout(db: &DatabaseConnection, token: &str) -> Result<()> {
    SessionEntity::delete_by_id(token.to_string()).exec(db).await?;
    Ok(())
}
