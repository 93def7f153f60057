//! Hindi greetings served over stdio gRPC
use greeter::lang::Hindi;
use std::process::ExitCode;

fn main() -> ExitCode {
    greeter::plugin::server::run_standalone(Box::new(Hindi))
}
