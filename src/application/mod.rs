pub mod billing;
pub mod branding;
pub mod forms;
pub mod guard;
pub mod notifications;
pub mod submission;
pub mod subscription;
pub mod tags;
pub mod testimonials;

pub use billing::*;
pub use branding::*;
pub use forms::*;
pub use guard::*;
pub use notifications::*;
pub use submission::*;
pub use subscription::*;
pub use tags::*;
pub use testimonials::*;
