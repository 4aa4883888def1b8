pub mod config;
pub mod endpoint;
pub mod error;
pub mod mix;
pub mod recording_result;
pub mod state;
