//! TestiFlow
//!
//! Testimonial collection, moderation and export with plan-gated features
//! and Stripe subscription billing.
//!
//! ## Standalone
//!
//! Run the binary:
//! ```bash
//! testiflow-server
//! ```
//!
//! ## Embedded (Axum)
//!
//! With the `server` feature enabled the router can be mounted inside a larger Axum app:
//! ```rust,ignore
//! use axum::Router;
//! use testiflow::infrastructure::AppConfig;
//! use testiflow::server::{build_state_with_pool, router};
//! use sqlx::PgPool;
//!
//! let cfg = AppConfig::from_env()?;
//! let pool = PgPool::connect(&cfg.database_url).await?;
//! let state = build_state_with_pool(cfg, pool, true).await?;
//! let app = Router::new().nest("/api", router(state));
//! ```

pub mod application;
pub mod domain;
pub mod infrastructure;

// Standalone + embedded HTTP server support (Axum).
// Enabled behind the `server` feature so the core library can be used without Axum.
#[cfg(feature = "server")]
pub mod server;

pub use application::*;
pub use domain::*;
pub use infrastructure::*;

#[cfg(feature = "server")]
pub use server::*;
