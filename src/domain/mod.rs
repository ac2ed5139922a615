pub mod branding;
pub mod capability;
pub mod export;
pub mod form;
pub mod guard;
pub mod plan;
pub mod submission;
pub mod subscription;
pub mod tag;
pub mod testimonial;

pub use branding::*;
pub use capability::*;
pub use export::*;
pub use form::*;
pub use guard::*;
pub use plan::*;
pub use submission::*;
pub use subscription::*;
pub use tag::*;
pub use testimonial::*;
