//! Data models for the candidate tracker.
//!
//! These models match the dashboard's TypeScript interfaces (camelCase JSON).

mod audit;
mod candidate;
mod mention;
mod user;

pub use audit::*;
pub use candidate::*;
pub use mention::*;
pub use user::*;
