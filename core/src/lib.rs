pub mod auth;
pub mod completion;
pub mod db;
pub mod gemini;
pub mod json_extract;
pub mod json_repair;
pub mod models;
pub mod normalize;
pub mod pattern;
pub mod prompts;
pub mod response;
pub mod service;
pub mod store;
