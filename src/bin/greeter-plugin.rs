//! Multi-call plugin executable
//!
//! Serves whichever built-in language matches the name it was invoked under,
//! so one build can be linked as `plugins/lang/hindi`, `plugins/lang/japanese`
//! and so on.
use std::path::Path;
use std::process::ExitCode;

use greeter::lang;
use greeter::plugin::server::run_standalone;

fn main() -> ExitCode {
    let invoked_as = std::env::args_os()
        .next()
        .and_then(|arg0| {
            Path::new(&arg0)
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
        })
        .unwrap_or_default();

    match lang::builtin(&invoked_as) {
        Some(provider) => run_standalone(provider),
        None => {
            eprintln!(
                "greeter-plugin: no language named '{invoked_as}'; link this binary as one of: {}",
                lang::BUILTIN_LANGUAGES.join(", ")
            );
            ExitCode::FAILURE
        }
    }
}
