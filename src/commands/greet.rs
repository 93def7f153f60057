use anyhow::Result;
use colored::Colorize;

use greeter::greetings::GreetingCommand;
use greeter::host::Host;

pub async fn greet_command(host: &Host, language: &str, command: GreetingCommand) -> Result<()> {
    let message = host.greeting(language, command).await?;
    println!("{}", message.green());
    Ok(())
}
