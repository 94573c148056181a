//! Coupon business logic - Issued coupons and the payload printed in their QR code.
//!
//! The payload is the plain text `"{coupon_id}-{student_id}-{random_code}"`. Record
//! ids are hyphen-free hex, so splitting on `-` is unambiguous.

use crate::{
    entities::{Coupon, coupon},
    errors::Result,
};
use chrono::Utc;
use rand::Rng;
use sea_orm::{Set, prelude::*};
use std::fmt;

/// The three fields encoded in a coupon's QR code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouponPayload {
    /// Id of the coupon record
    pub coupon_id: String,
    /// Id of the owning student
    pub student_id: String,
    /// Six digit code stored with the coupon
    pub random_code: String,
}

impl CouponPayload {
    /// Parses scanned text. Surrounding whitespace is ignored; anything other than
    /// exactly three non-empty `-` separated fields is rejected.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let mut fields = raw.trim().split('-');
        let (Some(coupon_id), Some(student_id), Some(random_code), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return None;
        };

        if coupon_id.is_empty() || student_id.is_empty() || random_code.is_empty() {
            return None;
        }

        Some(Self {
            coupon_id: coupon_id.to_string(),
            student_id: student_id.to_string(),
            random_code: random_code.to_string(),
        })
    }

    /// Whether a stored coupon carries the same student and code as this payload.
    #[must_use]
    pub fn matches(&self, coupon: &coupon::Model) -> bool {
        coupon.id == self.coupon_id
            && coupon.student_id == self.student_id
            && coupon.random_code == self.random_code
    }
}

impl From<&coupon::Model> for CouponPayload {
    fn from(coupon: &coupon::Model) -> Self {
        Self {
            coupon_id: coupon.id.clone(),
            student_id: coupon.student_id.clone(),
            random_code: coupon.random_code.clone(),
        }
    }
}

impl fmt::Display for CouponPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.coupon_id, self.student_id, self.random_code)
    }
}

/// Six decimal digits without a leading zero.
#[must_use]
pub fn generate_random_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

/// Finds a coupon by id.
pub async fn get_coupon_by_id(
    db: &DatabaseConnection,
    coupon_id: &str,
) -> Result<Option<coupon::Model>> {
    Coupon::find_by_id(coupon_id.to_string())
        .one(db)
        .await
        .map_err(Into::into)
}

/// Finds the coupon issued to a student, if any.
pub async fn find_coupon_for_student(
    db: &DatabaseConnection,
    student_id: &str,
) -> Result<Option<coupon::Model>> {
    Coupon::find()
        .filter(coupon::Column::StudentId.eq(student_id))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Issues a new coupon with a fresh random code. The unique index on
/// `student_id` rejects a second coupon for the same student.
pub async fn create_coupon(
    db: &DatabaseConnection,
    student_id: &str,
    created_by: &str,
) -> Result<coupon::Model> {
    let coupon = coupon::ActiveModel {
        id: Set(super::new_record_id()),
        student_id: Set(student_id.to_string()),
        random_code: Set(generate_random_code()),
        created_at: Set(Utc::now()),
        created_by: Set(created_by.to_string()),
    };

    coupon.insert(db).await.map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::errors::Error;
    use crate::test_utils::*;

    #[test]
    fn test_parse_payload() {
        let payload = CouponPayload::parse("  abc-def-123456\n").unwrap();
        assert_eq!(payload.coupon_id, "abc");
        assert_eq!(payload.student_id, "def");
        assert_eq!(payload.random_code, "123456");
        assert_eq!(payload.to_string(), "abc-def-123456");
    }

    #[test]
    fn test_parse_rejects_wrong_shapes() {
        for raw in ["", "abc", "abc-def", "abc-def-1-2", "abc--123456", "-def-123456", "abc-def-"] {
            assert!(CouponPayload::parse(raw).is_none(), "accepted {raw:?}");
        }
    }

    #[test]
    fn test_random_code_is_six_digits() {
        for _ in 0..100 {
            let code = generate_random_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
            assert!(!code.starts_with('0'));
        }
    }

    #[tokio::test]
    async fn test_create_and_find_coupon() -> Result<()> {
        let db = setup_test_db().await?;
        let coupon = create_coupon(&db, "student1", "admin@example.com").await?;

        assert!(!coupon.id.contains('-'));
        assert_eq!(coupon.created_by, "admin@example.com");

        let by_id = get_coupon_by_id(&db, &coupon.id).await?.unwrap();
        assert_eq!(by_id, coupon);
        let by_student = find_coupon_for_student(&db, "student1").await?.unwrap();
        assert_eq!(by_student, coupon);
        assert!(find_coupon_for_student(&db, "student2").await?.is_none());

        let payload = CouponPayload::from(&coupon);
        assert!(payload.matches(&coupon));
        assert_eq!(CouponPayload::parse(&payload.to_string()), Some(payload));
        Ok(())
    }

    #[tokio::test]
    async fn test_second_coupon_for_student_is_rejected() -> Result<()> {
        let db = setup_test_db().await?;
        create_coupon(&db, "student1", "admin@example.com").await?;
        let result = create_coupon(&db, "student1", "admin@example.com").await;
        assert!(matches!(result, Err(Error::Database(_))));
        Ok(())
    }
}
