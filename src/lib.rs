pub mod core;
pub mod infrastructure;
pub mod services;
pub mod workflow;
