//! Japanese greetings served over stdio gRPC
use greeter::lang::Japanese;
use std::process::ExitCode;

fn main() -> ExitCode {
    greeter::plugin::server::run_standalone(Box::new(Japanese))
}
