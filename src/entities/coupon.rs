//! Coupon entity - The food coupon issued to a single student.
//!
//! A coupon is identified at the gate by the triple of its own id, the owning
//! student's id and its six digit random code.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Coupon database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "coupons")]
pub struct Model {
    /// Opaque identifier, 32 hex characters without hyphens
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Owning student; at most one coupon per student
    #[sea_orm(unique)]
    pub student_id: String,
    /// Six decimal digits
    pub random_code: String,
    /// When the coupon was issued
    pub created_at: DateTimeUtc,
    /// Who issued it, usually the admin's email
    pub created_by: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
