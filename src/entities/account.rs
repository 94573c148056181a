//! Account entity - A person who can log in with an emailed one-time code.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// What an account is allowed to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Full access: roster edits, imports and coupon issuance
    #[sea_orm(string_value = "admin")]
    Admin,
    /// Gate staff: may read the roster and scan coupons
    #[sea_orm(string_value = "organizer")]
    Organizer,
    /// Anyone else; may only see their own profile
    #[sea_orm(string_value = "member")]
    Member,
}

impl Role {
    const fn rank(self) -> u8 {
        match self {
            Self::Admin => 2,
            Self::Organizer => 1,
            Self::Member => 0,
        }
    }

    /// Whether this role grants at least the permissions of `required`.
    #[must_use]
    pub const fn satisfies(self, required: Self) -> bool {
        self.rank() >= required.rank()
    }

    /// Lowercase name as stored in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Organizer => "organizer",
            Self::Member => "member",
        }
    }
}

/// Account database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    /// Opaque identifier
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Lowercased login email
    #[sea_orm(unique)]
    pub email: String,
    /// Current role, re-synced from configuration on every login
    pub role: Role,
    /// When the account first logged in
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
