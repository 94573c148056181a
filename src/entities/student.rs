//! Student entity - One registrant of the event.
//!
//! Besides identity and contact details, each row carries the two coupon flags:
//! `coupon_generated` is set once a coupon has been issued, and `coupon_redeemed`
//! is flipped at the gate. The redeemed flag only ever moves from false to true.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Meal the student registered for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum FoodPreference {
    /// Vegetarian meal
    #[sea_orm(string_value = "veg")]
    #[serde(rename = "veg")]
    Veg,
    /// Non-vegetarian meal
    #[sea_orm(string_value = "non-veg")]
    #[serde(rename = "non-veg")]
    NonVeg,
}

/// How the registration fee was paid. A missing value means unpaid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum PaymentMethod {
    /// Paid through the online form
    #[sea_orm(string_value = "online")]
    #[serde(rename = "online")]
    Online,
    /// Paid in person
    #[sea_orm(string_value = "offline")]
    #[serde(rename = "offline")]
    Offline,
}

/// Student database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "students")]
pub struct Model {
    /// Opaque identifier, 32 hex characters without hyphens
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Full name, never empty
    pub name: String,
    /// Contact email, never empty
    pub email: String,
    /// Institution roll number
    pub roll: String,
    /// Cohort as entered, either `"1"` or `"1st Year"` style
    pub year: String,
    /// Optional class section
    pub section: Option<String>,
    /// Meal choice
    pub food_preference: FoodPreference,
    /// Payment channel, `None` while unpaid
    pub payment_method: Option<PaymentMethod>,
    /// Whether a coupon has been issued for this student
    pub coupon_generated: bool,
    /// Whether the coupon has been redeemed at the gate
    pub coupon_redeemed: bool,
    /// When the record was created
    pub created_at: DateTimeUtc,
}

/// Coupons reference students by id only; no foreign key is declared so that
/// deleting a student leaves its coupon behind as an orphan.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
