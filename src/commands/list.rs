use anyhow::Result;

use greeter::host::Host;

pub fn list_languages_command(host: &Host) -> Result<()> {
    let languages = host.languages()?;

    println!("Available languages:");
    if languages.is_empty() {
        println!("  (none)");
    }
    for language in languages {
        println!("  - {} ({})", language.name, language.source);
    }

    Ok(())
}
