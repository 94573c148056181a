//! Entity module - Contains all SeaORM entity definitions for the database.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod account;
pub mod coupon;
pub mod login_code;
pub mod session;
pub mod student;

// Re-export specific types to avoid conflicts
pub use account::{Column as AccountColumn, Entity as Account, Model as AccountModel, Role};
pub use coupon::{Column as CouponColumn, Entity as Coupon, Model as CouponModel};
pub use login_code::{Column as LoginCodeColumn, Entity as LoginCode, Model as LoginCodeModel};
pub use session::{Column as SessionColumn, Entity as Session, Model as SessionModel};
pub use student::{
    Column as StudentColumn, Entity as Student, FoodPreference, Model as StudentModel,
    PaymentMethod,
};
