pub mod error;
pub mod time_value;
pub mod types;

#[cfg(feature = "debt")]
pub mod debt;

#[cfg(feature = "capital")]
pub mod capital;

#[cfg(feature = "waterfall")]
pub mod waterfall;

#[cfg(feature = "scenarios")]
pub mod scenarios;

#[cfg(feature = "monte_carlo")]
pub mod monte_carlo;

pub use error::CapitalError;
pub use types::*;

/// Standard result type for all realty-capital operations
pub type CapitalResult<T> = Result<T, CapitalError>;
