//! Domain models.

pub mod ids;
pub mod user;

pub use ids::{AddressId, OrderId, ProductId, UserId};
pub use user::{NewUser, ProfileUpdate, User, VerificationMethod};
