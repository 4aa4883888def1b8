pub mod capture;
pub mod coordinator;
pub mod mix_console;
