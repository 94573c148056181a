//! Student business logic - Roster records and their normalization rules.
//!
//! Raw input from forms and CSV rows is normalized exactly once, in
//! [`NewStudent::new`]. Everything downstream works with typed values, so the food
//! preference is always one of the two meals and name, email and roll are never blank.
//!
//! The redemption flag is only written through [`mark_redeemed`], a conditional
//! update that can flip it from false to true and never back.

use crate::{
    entities::{FoodPreference, PaymentMethod, Student, student},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{Set, prelude::*, sea_query::Expr};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::iter::Peekable;
use std::str::Chars;

impl FoodPreference {
    /// Parses a form or CSV value. Only an exact (case-insensitive) `veg` or
    /// `non-veg` is recognized; anything else, including blanks, means veg.
    #[must_use]
    pub fn from_input(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "non-veg" => Self::NonVeg,
            _ => Self::Veg,
        }
    }

    /// Label printed on the coupon and shown at the gate.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Veg => "Veg",
            Self::NonVeg => "Non Veg",
        }
    }
}

impl PaymentMethod {
    /// Parses a loosely formatted payment column by substring, so values like
    /// `"Paid Online (UPI)"` are understood. Blank, `"null"`, `"undefined"` and
    /// anything unrecognized mean unpaid.
    #[must_use]
    pub fn from_input(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        if normalized.contains("online") {
            Some(Self::Online)
        } else if normalized.contains("offline") {
            Some(Self::Offline)
        } else {
            None
        }
    }
}

/// Normalizes a cohort to its short form: `"1"` and `"1st Year"` both become `"1st"`.
/// Unrecognized values come back trimmed but otherwise unchanged.
#[must_use]
pub fn year_short_label(year: &str) -> String {
    let year = year.trim();
    match year {
        "1" | "1st Year" => "1st",
        "2" | "2nd Year" => "2nd",
        "3" | "3rd Year" => "3rd",
        "4" | "4th Year" => "4th",
        other => other,
    }
    .to_string()
}

/// Raw student fields as they arrive from a form or a mapped CSV row.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StudentInput {
    /// Full name
    pub name: String,
    /// Contact email
    pub email: String,
    /// Roll number
    pub roll: String,
    /// Cohort as entered
    #[serde(default)]
    pub year: String,
    /// Optional class section
    #[serde(default)]
    pub section: Option<String>,
    /// `veg` / `non-veg`; anything else defaults to veg
    #[serde(default)]
    pub food_preference: Option<String>,
    /// `online` / `offline`; anything else means unpaid
    #[serde(default)]
    pub payment_method: Option<String>,
}

/// A validated, normalized student record ready to be written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewStudent {
    name: String,
    email: String,
    roll: String,
    year: String,
    section: Option<String>,
    food_preference: FoodPreference,
    payment_method: Option<PaymentMethod>,
}

impl NewStudent {
    /// Trims every field and applies the food and payment defaults.
    ///
    /// # Errors
    /// Returns [`Error::Validation`] when name, email or roll is blank after trimming.
    pub fn new(input: StudentInput) -> Result<Self> {
        let name = input.name.trim().to_string();
        let email = input.email.trim().to_string();
        let roll = input.roll.trim().to_string();

        if name.is_empty() || email.is_empty() || roll.is_empty() {
            return Err(Error::Validation {
                message: "Name, roll and email are required".to_string(),
            });
        }

        Ok(Self {
            name,
            email,
            roll,
            year: input.year.trim().to_string(),
            section: input
                .section
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            food_preference: input
                .food_preference
                .as_deref()
                .map_or(FoodPreference::Veg, FoodPreference::from_input),
            payment_method: input
                .payment_method
                .as_deref()
                .and_then(PaymentMethod::from_input),
        })
    }

    /// Overrides the cohort, used by bulk import where the year is chosen once.
    #[must_use]
    pub fn with_year(mut self, year: &str) -> Self {
        self.year = year.trim().to_string();
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    #[must_use]
    pub fn roll(&self) -> &str {
        &self.roll
    }

    #[must_use]
    pub fn year(&self) -> &str {
        &self.year
    }

    #[must_use]
    pub fn section(&self) -> Option<&str> {
        self.section.as_deref()
    }

    #[must_use]
    pub const fn food_preference(&self) -> FoodPreference {
        self.food_preference
    }

    #[must_use]
    pub const fn payment_method(&self) -> Option<PaymentMethod> {
        self.payment_method
    }
}

/// Column the roster is sorted by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    /// Natural order, so roll `"9"` sorts before `"10"`
    #[default]
    Roll,
    /// Case-insensitive name order
    Name,
}

/// Sort direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    /// Smallest first
    #[default]
    Asc,
    /// Largest first
    Desc,
}

/// Filter, search and ordering for [`list_students`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StudentQuery {
    /// Exact stored year value
    pub year: Option<String>,
    /// Case-insensitive substring of name, email or roll
    pub search: Option<String>,
    /// Column to order by
    pub sort: SortField,
    /// Applies to `sort`
    pub direction: SortDirection,
}

/// Roster counts shown on the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StudentStats {
    /// Students in scope
    pub total: usize,
    /// Veg meal count
    pub veg: usize,
    /// Non-veg meal count
    pub non_veg: usize,
    /// Students with a recorded payment method
    pub paid: usize,
    /// Coupons issued
    pub coupons_generated: usize,
    /// Coupons scanned at the gate
    pub coupons_redeemed: usize,
}

/// Inserts a new student with both coupon flags cleared.
pub async fn create_student(db: &DatabaseConnection, new: NewStudent) -> Result<student::Model> {
    let student = student::ActiveModel {
        id: Set(super::new_record_id()),
        name: Set(new.name),
        email: Set(new.email),
        roll: Set(new.roll),
        year: Set(new.year),
        section: Set(new.section),
        food_preference: Set(new.food_preference),
        payment_method: Set(new.payment_method),
        coupon_generated: Set(false),
        coupon_redeemed: Set(false),
        created_at: Set(Utc::now()),
    };

    student.insert(db).await.map_err(Into::into)
}

/// Replaces a student's editable fields. Both coupon flags are left untouched.
pub async fn update_student(
    db: &DatabaseConnection,
    student_id: &str,
    new: NewStudent,
) -> Result<student::Model> {
    let existing = get_student_by_id(db, student_id)
        .await?
        .ok_or_else(|| Error::StudentNotFound {
            id: student_id.to_string(),
        })?;

    let mut student: student::ActiveModel = existing.into();
    student.name = Set(new.name);
    student.email = Set(new.email);
    student.roll = Set(new.roll);
    student.year = Set(new.year);
    student.section = Set(new.section);
    student.food_preference = Set(new.food_preference);
    student.payment_method = Set(new.payment_method);

    student.update(db).await.map_err(Into::into)
}

/// Deletes a student. Any coupon issued to them stays behind and will scan as
/// an unknown student.
pub async fn delete_student(db: &DatabaseConnection, student_id: &str) -> Result<()> {
    let result = Student::delete_by_id(student_id.to_string()).exec(db).await?;
    if result.rows_affected == 0 {
        return Err(Error::StudentNotFound {
            id: student_id.to_string(),
        });
    }
    Ok(())
}

/// Finds a student by id.
pub async fn get_student_by_id(
    db: &DatabaseConnection,
    student_id: &str,
) -> Result<Option<student::Model>> {
    Student::find_by_id(student_id.to_string())
        .one(db)
        .await
        .map_err(Into::into)
}

/// Lists students for the roster screen.
///
/// The year filter runs in the database; search and natural sorting run in memory,
/// which is fine for a roster of a few hundred rows.
pub async fn list_students(
    db: &DatabaseConnection,
    query: &StudentQuery,
) -> Result<Vec<student::Model>> {
    let mut select = Student::find();
    if let Some(year) = query.year.as_deref() {
        select = select.filter(student::Column::Year.eq(year.trim()));
    }
    let mut students = select.all(db).await?;

    if let Some(search) = query
        .search
        .as_deref()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
    {
        students.retain(|s| {
            s.name.to_lowercase().contains(&search)
                || s.email.to_lowercase().contains(&search)
                || s.roll.to_lowercase().contains(&search)
        });
    }

    students.sort_by(|a, b| {
        let ordering = match query.sort {
            SortField::Roll => natural_cmp(&a.roll, &b.roll),
            SortField::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        };
        match query.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });

    Ok(students)
}

/// Marks that a coupon has been issued to the student.
pub async fn set_coupon_generated<C>(db: &C, student_id: &str) -> Result<()>
where
    C: ConnectionTrait,
{
    let result = Student::update_many()
        .col_expr(student::Column::CouponGenerated, Expr::value(true))
        .filter(student::Column::Id.eq(student_id))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Err(Error::StudentNotFound {
            id: student_id.to_string(),
        });
    }
    Ok(())
}

/// Flips `coupon_redeemed` from false to true in a single conditional statement:
/// `UPDATE students SET coupon_redeemed = 1 WHERE id = ? AND coupon_redeemed = 0`.
///
/// Returns `true` if this call performed the flip and `false` if the student was
/// already redeemed (or does not exist). Two gates racing on the same coupon can
/// never both get `true`.
pub async fn mark_redeemed<C>(db: &C, student_id: &str) -> Result<bool>
where
    C: ConnectionTrait,
{
    let result = Student::update_many()
        .col_expr(student::Column::CouponRedeemed, Expr::value(true))
        .filter(student::Column::Id.eq(student_id))
        .filter(student::Column::CouponRedeemed.eq(false))
        .exec(db)
        .await?;

    Ok(result.rows_affected == 1)
}

/// Counts the roster, optionally restricted to one stored year value.
pub async fn student_stats(db: &DatabaseConnection, year: Option<&str>) -> Result<StudentStats> {
    let query = StudentQuery {
        year: year.map(ToString::to_string),
        ..StudentQuery::default()
    };
    let students = list_students(db, &query).await?;

    Ok(StudentStats {
        total: students.len(),
        veg: students
            .iter()
            .filter(|s| s.food_preference == FoodPreference::Veg)
            .count(),
        non_veg: students
            .iter()
            .filter(|s| s.food_preference == FoodPreference::NonVeg)
            .count(),
        paid: students.iter().filter(|s| s.payment_method.is_some()).count(),
        coupons_generated: students.iter().filter(|s| s.coupon_generated).count(),
        coupons_redeemed: students.iter().filter(|s| s.coupon_redeemed).count(),
    })
}

/// Compares strings with digit runs ordered by numeric value ("a9" < "a10"),
/// ignoring letter case.
fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let ordering = compare_digit_runs(&take_digits(&mut left), &take_digits(&mut right));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            (Some(l), Some(r)) => {
                let ordering = l.to_lowercase().cmp(r.to_lowercase());
                if ordering != Ordering::Equal {
                    return ordering;
                }
                left.next();
                right.next();
            }
        }
    }
}

fn take_digits(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.next_if(char::is_ascii_digit) {
        digits.push(c);
    }
    digits
}

fn compare_digit_runs(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn test_year_short_label() {
        assert_eq!(year_short_label("1"), "1st");
        assert_eq!(year_short_label("1st Year"), "1st");
        assert_eq!(year_short_label(" 2 "), "2nd");
        assert_eq!(year_short_label("3rd Year"), "3rd");
        assert_eq!(year_short_label("4"), "4th");
        assert_eq!(year_short_label("5th"), "5th");
    }

    #[test]
    fn test_food_preference_defaults_to_veg() {
        assert_eq!(FoodPreference::from_input("NON-VEG"), FoodPreference::NonVeg);
        assert_eq!(FoodPreference::from_input(" veg "), FoodPreference::Veg);
        assert_eq!(FoodPreference::from_input("VEGETARIAN"), FoodPreference::Veg);
        assert_eq!(FoodPreference::from_input("non veg"), FoodPreference::Veg);
        assert_eq!(FoodPreference::from_input(""), FoodPreference::Veg);
        assert_eq!(FoodPreference::NonVeg.label(), "Non Veg");
    }

    #[test]
    fn test_payment_method_substring_match() {
        assert_eq!(PaymentMethod::from_input("Online"), Some(PaymentMethod::Online));
        assert_eq!(
            PaymentMethod::from_input("paid OFFLINE at desk"),
            Some(PaymentMethod::Offline)
        );
        assert_eq!(PaymentMethod::from_input("null"), None);
        assert_eq!(PaymentMethod::from_input("undefined"), None);
        assert_eq!(PaymentMethod::from_input("cash"), None);
        assert_eq!(PaymentMethod::from_input(""), None);
    }

    #[test]
    fn test_new_student_rejects_blank_required_fields() {
        let result = NewStudent::new(StudentInput {
            name: "   ".to_string(),
            email: "a@b.com".to_string(),
            roll: "1".to_string(),
            ..StudentInput::default()
        });
        assert!(matches!(result, Err(Error::Validation { .. })));
    }

    #[test]
    fn test_new_student_trims_and_normalizes() {
        let student = NewStudent::new(StudentInput {
            name: " Jane Doe ".to_string(),
            email: " jane@x.com ".to_string(),
            roll: " 21 ".to_string(),
            year: " 3 ".to_string(),
            section: Some("  ".to_string()),
            food_preference: Some("VEGETARIAN".to_string()),
            payment_method: None,
        })
        .unwrap();

        assert_eq!(student.name(), "Jane Doe");
        assert_eq!(student.email(), "jane@x.com");
        assert_eq!(student.roll(), "21");
        assert_eq!(student.year(), "3");
        assert_eq!(student.section(), None);
        assert_eq!(student.food_preference(), FoodPreference::Veg);
        assert_eq!(student.payment_method(), None);
    }

    #[test]
    fn test_natural_cmp() {
        assert_eq!(natural_cmp("9", "10"), Ordering::Less);
        assert_eq!(natural_cmp("CS10", "cs9"), Ordering::Greater);
        assert_eq!(natural_cmp("007", "7"), Ordering::Equal);
        assert_eq!(natural_cmp("a", "a1"), Ordering::Less);
    }

    #[tokio::test]
    async fn test_create_student_integration() -> Result<()> {
        let db = setup_test_db().await?;
        let student = create_test_student(&db, "Asha", Some(PaymentMethod::Online)).await?;

        assert_eq!(student.id.len(), 32);
        assert!(!student.id.contains('-'));
        assert!(!student.coupon_generated);
        assert!(!student.coupon_redeemed);

        let fetched = get_student_by_id(&db, &student.id).await?.unwrap();
        assert_eq!(fetched, student);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_student_preserves_coupon_flags() -> Result<()> {
        let db = setup_test_db().await?;
        let student = create_test_student(&db, "Asha", Some(PaymentMethod::Online)).await?;
        set_coupon_generated(&db, &student.id).await?;
        assert!(mark_redeemed(&db, &student.id).await?);

        let edit = NewStudent::new(StudentInput {
            name: "Asha K".to_string(),
            email: "asha@example.com".to_string(),
            roll: "42".to_string(),
            year: "2".to_string(),
            food_preference: Some("non-veg".to_string()),
            ..StudentInput::default()
        })?;
        let updated = update_student(&db, &student.id, edit).await?;

        assert_eq!(updated.name, "Asha K");
        assert_eq!(updated.food_preference, FoodPreference::NonVeg);
        assert_eq!(updated.payment_method, None);
        assert!(updated.coupon_generated);
        assert!(updated.coupon_redeemed);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_missing_student_is_not_found() -> Result<()> {
        let db = setup_test_db().await?;
        let result = delete_student(&db, "nope").await;
        assert!(matches!(result, Err(Error::StudentNotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_mark_redeemed_only_flips_once() -> Result<()> {
        let db = setup_test_db().await?;
        let student = create_test_student(&db, "Ravi", Some(PaymentMethod::Offline)).await?;

        assert!(mark_redeemed(&db, &student.id).await?);
        assert!(!mark_redeemed(&db, &student.id).await?);
        assert!(!mark_redeemed(&db, "missing").await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_list_students_filters_searches_and_sorts() -> Result<()> {
        let db = setup_test_db().await?;
        for (name, roll, year) in [("Zoya", "10", "1"), ("amit", "9", "1"), ("Bela", "2", "2")] {
            let new = NewStudent::new(StudentInput {
                name: name.to_string(),
                email: format!("{}@example.com", name.to_lowercase()),
                roll: roll.to_string(),
                year: year.to_string(),
                ..StudentInput::default()
            })?;
            create_student(&db, new).await?;
        }

        let first_years = list_students(
            &db,
            &StudentQuery {
                year: Some("1".to_string()),
                ..StudentQuery::default()
            },
        )
        .await?;
        let rolls: Vec<_> = first_years.iter().map(|s| s.roll.as_str()).collect();
        assert_eq!(rolls, vec!["9", "10"]);

        let by_name_desc = list_students(
            &db,
            &StudentQuery {
                sort: SortField::Name,
                direction: SortDirection::Desc,
                ..StudentQuery::default()
            },
        )
        .await?;
        let names: Vec<_> = by_name_desc.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Zoya", "Bela", "amit"]);

        let searched = list_students(
            &db,
            &StudentQuery {
                search: Some("BELA@".to_string()),
                ..StudentQuery::default()
            },
        )
        .await?;
        assert_eq!(searched.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_student_stats() -> Result<()> {
        let db = setup_test_db().await?;
        let paid = create_test_student(&db, "Paid", Some(PaymentMethod::Online)).await?;
        create_test_student(&db, "Unpaid", None).await?;
        set_coupon_generated(&db, &paid.id).await?;
        mark_redeemed(&db, &paid.id).await?;

        let stats = student_stats(&db, None).await?;
        assert_eq!(
            stats,
            StudentStats {
                total: 2,
                veg: 2,
                non_veg: 0,
                paid: 1,
                coupons_generated: 1,
                coupons_redeemed: 1,
            }
        );
        Ok(())
    }
}
