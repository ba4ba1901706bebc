pub mod database;
pub mod entities;
pub mod gemini;
pub mod pdf;
pub mod repositories;
pub mod traits;
