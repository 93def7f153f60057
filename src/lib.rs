pub mod config;
pub mod greetings;
pub mod host;
pub mod lang;
pub mod plugin;
pub mod registry;
pub mod shutdown;
