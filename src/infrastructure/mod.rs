pub mod config;
pub mod email;
pub mod identity;
pub mod postgres_billing_repo;
pub mod postgres_form_repo;
pub mod postgres_tag_repo;
pub mod postgres_testimonial_repo;
pub mod repository;
pub mod signature;
pub mod stripe;

pub use config::*;
pub use email::*;
pub use identity::*;
pub use postgres_billing_repo::*;
pub use postgres_form_repo::*;
pub use postgres_tag_repo::*;
pub use postgres_testimonial_repo::*;
pub use repository::*;
pub use signature::*;
pub use stripe::*;
