pub mod chat;
pub mod translate;
