//! Login code entity - A pending one-time code sent to an account's email.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Login code database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "login_codes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Account the code was sent for
    pub account_id: String,
    /// Six decimal digits
    pub code: String,
    pub expires_at: DateTimeUtc,
    /// Wrong guesses so far
    #[sea_orm(default_value = 0)]
    pub attempts: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
