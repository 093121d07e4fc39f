pub mod accounts;
pub mod commands;
pub mod scheduler;
pub mod server;
