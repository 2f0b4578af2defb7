pub mod capital;
pub mod debt;
pub mod monte_carlo;
pub mod scenarios;
pub mod waterfall;
