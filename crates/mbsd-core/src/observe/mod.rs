//! # Observability
//!
//! The detector itself only emits `tracing` events:
//!
//! - `debug!` on every state transition
//! - `trace!` for confirmed peaks and per-sample features
//! - `warn!` when a sensitivity setting cannot be applied
//!
//! Hosts decide where those events go. [`init_logging`] installs a global
//! subscriber from a [`LogConfig`], usually the `logging` section of
//! [`MbsdConfig`](crate::config::MbsdConfig).
//!
//! ```rust,ignore
//! use mbsd_core::observe::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::development())?;
//! tracing::info!(samples = 1500, "replay complete");
//! ```

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
