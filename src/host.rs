//! Composition root tying the in-process registry to the plugin manager
//!
//! Built-in languages answer directly; everything else is looked up under
//! `<plugins dir>/lang/<name>` and served by a plugin process.
use anyhow::{Context, Result, bail};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::LANG_CATEGORY;
use crate::greetings::GreetingCommand;
use crate::plugin::PluginManager;
use crate::registry::Registry;

/// Where a language's greetings come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageSource {
    Builtin,
    Plugin,
}

impl fmt::Display for LanguageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LanguageSource::Builtin => f.write_str("built-in"),
            LanguageSource::Plugin => f.write_str("plugin"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Language {
    pub name: String,
    pub source: LanguageSource,
}

pub struct Host {
    registry: Arc<Registry>,
    manager: Arc<PluginManager>,
}

impl Host {
    pub fn new(registry: Arc<Registry>, manager: Arc<PluginManager>) -> Self {
        Self { registry, manager }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn manager(&self) -> &PluginManager {
        &self.manager
    }

    /// Produce `command`'s greeting in `language`
    ///
    /// A plugin that fails to answer is stopped before the error is returned,
    /// so the next request starts a fresh process.
    pub async fn greeting(&self, language: &str, command: GreetingCommand) -> Result<String> {
        if let Some(provider) = self.registry.get(language) {
            debug!("Answering {command} with built-in {language}");
            return Ok(provider.greet(command).to_string());
        }

        let path = self.manager.plugin_path(LANG_CATEGORY, language);
        if !path.exists() {
            bail!(
                "language plugin '{language}' not found (looked in {})",
                path.display()
            );
        }

        self.manager
            .start_plugin(LANG_CATEGORY, language)
            .await
            .with_context(|| format!("failed to start {language} plugin"))?;

        match self
            .manager
            .get_greeting(LANG_CATEGORY, language, command.as_str())
            .await
        {
            Ok(message) => Ok(message),
            Err(err) => {
                warn!("Stopping {language} plugin after failed call");
                self.manager.stop_plugin(LANG_CATEGORY, language).await;
                Err(err)
            }
        }
    }

    /// Built-in languages first, then plugins that don't shadow a built-in
    pub fn languages(&self) -> Result<Vec<Language>> {
        let builtins = self.registry.list();
        let plugins = self.manager.discover_plugins(LANG_CATEGORY)?;

        let mut languages: Vec<Language> = builtins
            .iter()
            .map(|name| Language {
                name: name.clone(),
                source: LanguageSource::Builtin,
            })
            .collect();
        languages.extend(
            plugins
                .into_iter()
                .filter(|name| !builtins.contains(name))
                .map(|name| Language {
                    name,
                    source: LanguageSource::Plugin,
                }),
        );
        Ok(languages)
    }

    /// Close in-process providers and stop every plugin process
    pub async fn shutdown(&self) {
        self.registry.close();
        self.manager.cleanup_plugins().await;
    }
}
