pub mod assistant;
pub mod auth;
pub mod errors;
pub mod services;
pub mod traits;
