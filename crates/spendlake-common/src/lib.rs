//! Spendlake Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Error taxonomy and logging shared by the spendlake workspace members.
//!
//! - **Error Handling**: [`SpendlakeError`] and the [`Result`] alias
//! - **Logging**: `tracing` subscriber setup driven by [`logging::LogConfig`]
//!
//! # Example
//!
//! ```no_run
//! use spendlake_common::logging::{init_logging, LogConfig};
//! use spendlake_common::{Result, SpendlakeError};
//!
//! fn check_year(year: i32) -> Result<i32> {
//!     if year < 2000 {
//!         return Err(SpendlakeError::Config(format!("year {} is too early", year)));
//!     }
//!     Ok(year)
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     check_year(2019)?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{Result, SpendlakeError};
