//! Languages compiled into greeter
//!
//! English is registered in-process by the host. Hindi and Japanese are served
//! out-of-process by the plugin executables, but live here so every binary in
//! the workspace shares one implementation.
mod english;
mod hindi;
mod japanese;

pub use english::English;
pub use hindi::Hindi;
pub use japanese::Japanese;

use crate::greetings::Greeter;

/// Names of every built-in language
pub const BUILTIN_LANGUAGES: [&str; 3] = ["english", "hindi", "japanese"];

/// Look up a built-in provider by name
pub fn builtin(name: &str) -> Option<Box<dyn Greeter>> {
    match name {
        "english" => Some(Box::new(English)),
        "hindi" => Some(Box::new(Hindi)),
        "japanese" => Some(Box::new(Japanese)),
        _ => None,
    }
}
