pub mod chat;
pub mod health;
pub mod preferences;
pub mod translate;
