//! The greeting capability shared by in-process providers and plugins

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Raised when a caller asks for a greeting outside the fixed command set
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown greeting type: {0}")]
pub struct UnknownGreeting(pub String);

/// One of the five greetings every provider can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GreetingCommand {
    Hello,
    GoodMorning,
    GoodAfternoon,
    GoodNight,
    GoodBye,
}

impl GreetingCommand {
    pub const ALL: [GreetingCommand; 5] = [
        GreetingCommand::Hello,
        GreetingCommand::GoodMorning,
        GreetingCommand::GoodAfternoon,
        GreetingCommand::GoodNight,
        GreetingCommand::GoodBye,
    ];

    /// The command name as typed on the command line
    pub fn as_str(self) -> &'static str {
        match self {
            GreetingCommand::Hello => "hello",
            GreetingCommand::GoodMorning => "goodmorning",
            GreetingCommand::GoodAfternoon => "goodafternoon",
            GreetingCommand::GoodNight => "goodnight",
            GreetingCommand::GoodBye => "goodbye",
        }
    }
}

impl FromStr for GreetingCommand {
    type Err = UnknownGreeting;

    /// Exact match only; callers normalise case before parsing
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GreetingCommand::ALL
            .into_iter()
            .find(|command| command.as_str() == s)
            .ok_or_else(|| UnknownGreeting(s.to_string()))
    }
}

impl fmt::Display for GreetingCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A language provider
///
/// Implemented by every built-in language. The same provider can be registered
/// in-process with the [`Registry`](crate::registry::Registry) or served to a
/// host from a plugin executable via [`plugin::server`](crate::plugin::server).
pub trait Greeter: Send + Sync {
    /// Name the provider is registered and discovered under (e.g. "hindi")
    fn name(&self) -> &str;

    /// Called exactly once before the first greeting
    fn init(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called once when the provider is released
    fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn hello(&self) -> &str;
    fn good_morning(&self) -> &str;
    fn good_afternoon(&self) -> &str;
    fn good_night(&self) -> &str;
    fn good_bye(&self) -> &str;

    /// Dispatch a command to the matching greeting
    fn greet(&self, command: GreetingCommand) -> &str {
        match command {
            GreetingCommand::Hello => self.hello(),
            GreetingCommand::GoodMorning => self.good_morning(),
            GreetingCommand::GoodAfternoon => self.good_afternoon(),
            GreetingCommand::GoodNight => self.good_night(),
            GreetingCommand::GoodBye => self.good_bye(),
        }
    }
}
