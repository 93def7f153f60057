mod greet;
mod list;

pub use greet::greet_command;
pub use list::list_languages_command;
