//! Outbound email delivery.
//!
//! The service never talks SMTP itself. Coupon emails and login codes are posted as
//! multipart forms to HTTP endpoints configured out of band, and any non-success
//! status counts as a failed delivery.

use crate::config::EmailConfig;
use crate::errors::{Error, Result};
use crate::qr;
use async_trait::async_trait;
use reqwest::multipart::Form;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Everything the coupon email template needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouponEmail {
    /// Student name
    pub name: String,
    /// Recipient address
    pub email: String,
    /// Roll number
    pub roll: String,
    /// Short year label such as `"2nd"`
    pub year: String,
    /// Display food label, `"Veg"` or `"Non Veg"`
    pub food: String,
    /// PNG rendering of the coupon payload
    pub qr_png: Vec<u8>,
}

/// Delivery seam used by the issuance and login workflows.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Whether a coupon endpoint is configured at all.
    fn is_configured(&self) -> bool;

    /// Delivers a coupon email.
    async fn send_coupon(&self, email: &CouponEmail) -> Result<()>;

    /// Delivers a one-time login code.
    async fn send_login_code(&self, to: &str, code: &str) -> Result<()>;
}

/// [`EmailSender`] that posts multipart forms with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    coupon_endpoint: Option<String>,
    login_code_endpoint: Option<String>,
}

impl HttpMailer {
    /// Builds a mailer from the `[email]` configuration section.
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            coupon_endpoint: non_blank(config.coupon_endpoint.as_deref()),
            login_code_endpoint: non_blank(config.login_code_endpoint.as_deref()),
        })
    }

    async fn post(&self, endpoint: &str, form: Form) -> Result<()> {
        let response = self
            .client
            .post(endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::EmailDelivery {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            debug!(%status, "Email endpoint accepted request");
            Ok(())
        } else {
            warn!(%status, "Email endpoint rejected request");
            Err(Error::EmailDelivery {
                reason: format!("endpoint responded with {status}"),
            })
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

#[async_trait]
impl EmailSender for HttpMailer {
    fn is_configured(&self) -> bool {
        self.coupon_endpoint.is_some()
    }

    #[instrument(skip(self, email), fields(to = %email.email))]
    async fn send_coupon(&self, email: &CouponEmail) -> Result<()> {
        let endpoint = self
            .coupon_endpoint
            .as_deref()
            .ok_or(Error::EmailNotConfigured)?;

        let form = Form::new()
            .text("name", email.name.clone())
            .text("email", email.email.clone())
            .text("roll", email.roll.clone())
            .text("year", email.year.clone())
            .text("food", email.food.clone())
            .text("imageUrl", qr::to_data_url(&email.qr_png));

        self.post(endpoint, form).await?;
        info!("Coupon email sent");
        Ok(())
    }

    #[instrument(skip(self, code))]
    async fn send_login_code(&self, to: &str, code: &str) -> Result<()> {
        let endpoint = self
            .login_code_endpoint
            .as_deref()
            .ok_or(Error::EmailNotConfigured)?;

        let form = Form::new()
            .text("email", to.to_string())
            .text("code", code.to_string());
        self.post(endpoint, form).await
    }
}
