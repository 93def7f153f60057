#![cfg(unix)]
//! Integration tests for the plugin system
//!
//! Runs the real `greeter-plugin` binary, linked into a temporary plugins
//! directory under each language name, through the plugin manager.
use anyhow::Result;
use futures::future::join_all;
use greeter::plugin::manager::EXIT_GRACE;
use greeter::plugin::{PluginKey, PluginManager};
use std::os::unix::fs::{PermissionsExt, symlink};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tempfile::{TempDir, tempdir};
use tokio::time::timeout;

const LANG: &str = "lang";

fn plugin_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_greeter-plugin"))
}

/// A plugins directory with `lang/<name>` linked to the multi-call plugin
fn plugins_dir(languages: &[&str]) -> Result<TempDir> {
    let dir = tempdir()?;
    let lang_dir = dir.path().join(LANG);
    std::fs::create_dir_all(&lang_dir)?;
    for language in languages {
        symlink(plugin_binary(), lang_dir.join(language))?;
    }
    Ok(dir)
}

/// Install an executable shell script as `lang/<name>`
fn write_script(dir: &Path, name: &str, body: &str) -> Result<PathBuf> {
    let lang_dir = dir.join(LANG);
    std::fs::create_dir_all(&lang_dir)?;
    let path = lang_dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n"))?;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
    Ok(path)
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("debug")
        .try_init();
}

fn process_alive(pid: u32) -> bool {
    Command::new("kill")
        .args(["-0", &pid.to_string()])
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

async fn wait_until_stopped(manager: &PluginManager, name: &str) {
    timeout(Duration::from_secs(10), async {
        while manager.is_running(LANG, name).await {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("plugin entry should be removed");
}

fn manager_for(dir: &Path) -> PluginManager {
    PluginManager::new(dir)
}

#[tokio::test]
async fn test_start_greet_stop_greet() -> Result<()> {
    init_logging();
    let dir = plugins_dir(&["hindi"])?;
    let manager = manager_for(dir.path());

    manager.start_plugin(LANG, "hindi").await?;
    assert!(manager.is_running(LANG, "hindi").await);
    let first_pid = manager.plugin_pid(LANG, "hindi").await;

    let message = manager.get_greeting(LANG, "hindi", "hello").await?;
    assert_eq!(message, "नमस्ते! (Namaste!)");

    manager.stop_plugin(LANG, "hindi").await;
    assert!(!manager.is_running(LANG, "hindi").await);

    // The next request starts a fresh process
    let message = manager.get_greeting(LANG, "hindi", "goodnight").await?;
    assert_eq!(message, "शुभ रात्रि! (Shubh Ratri!)");
    assert_ne!(manager.plugin_pid(LANG, "hindi").await, first_pid);

    manager.cleanup_plugins().await;
    Ok(())
}

#[tokio::test]
async fn test_start_is_idempotent() -> Result<()> {
    let dir = plugins_dir(&["japanese"])?;
    let manager = manager_for(dir.path());

    manager.start_plugin(LANG, "japanese").await?;
    let pid = manager.plugin_pid(LANG, "japanese").await;
    assert!(pid.is_some());

    manager.start_plugin(LANG, "japanese").await?;
    assert_eq!(manager.plugin_pid(LANG, "japanese").await, pid);
    assert_eq!(manager.running_plugins().await.len(), 1);

    manager.cleanup_plugins().await;
    Ok(())
}

#[tokio::test]
async fn test_stop_without_running_plugin_is_noop() -> Result<()> {
    let dir = plugins_dir(&["hindi"])?;
    let manager = manager_for(dir.path());

    manager.stop_plugin(LANG, "hindi").await;
    manager.stop_plugin(LANG, "hindi").await;
    assert!(manager.running_plugins().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_get_greeting_starts_plugin_lazily() -> Result<()> {
    let dir = plugins_dir(&["japanese"])?;
    let manager = manager_for(dir.path());
    assert!(!manager.is_running(LANG, "japanese").await);

    let message = manager.get_greeting(LANG, "japanese", "goodmorning").await?;
    assert_eq!(message, "おはようございます! (Ohayou gozaimasu)");
    assert!(manager.is_running(LANG, "japanese").await);

    manager.cleanup_plugins().await;
    Ok(())
}

#[tokio::test]
async fn test_concurrent_requests_share_one_process() -> Result<()> {
    let dir = plugins_dir(&[])?;

    // `lang/hindi` records its pid, then becomes the real plugin. The link
    // keeps the `hindi` file name the multi-call binary dispatches on.
    let real_dir = dir.path().join("real");
    std::fs::create_dir_all(&real_dir)?;
    let real_plugin = real_dir.join("hindi");
    symlink(plugin_binary(), &real_plugin)?;
    let spawn_log = dir.path().join("spawns.log");
    write_script(
        dir.path(),
        "hindi",
        &format!(
            "echo $$ >> '{}'\nexec '{}'",
            spawn_log.display(),
            real_plugin.display()
        ),
    )?;

    let manager = manager_for(dir.path());
    let results = join_all((0..8).map(|_| manager.get_greeting(LANG, "hindi", "hello"))).await;
    for result in results {
        assert_eq!(result?, "नमस्ते! (Namaste!)");
    }

    let spawns = std::fs::read_to_string(&spawn_log)?;
    assert_eq!(spawns.lines().count(), 1, "spawn log: {spawns:?}");
    assert_eq!(
        manager.running_plugins().await,
        vec![PluginKey::new(LANG, "hindi")]
    );

    manager.cleanup_plugins().await;
    Ok(())
}

#[tokio::test]
async fn test_stop_kills_plugin_that_ignores_stdin_close() -> Result<()> {
    let dir = plugins_dir(&[])?;
    write_script(dir.path(), "stubborn", "exec sleep 1000")?;
    let manager = manager_for(dir.path());

    manager.start_plugin(LANG, "stubborn").await?;
    let pid = manager
        .plugin_pid(LANG, "stubborn")
        .await
        .expect("running plugin should have a pid");

    let started = std::time::Instant::now();
    manager.stop_plugin(LANG, "stubborn").await;

    assert!(started.elapsed() >= EXIT_GRACE, "killed before the grace period");
    assert!(!manager.is_running(LANG, "stubborn").await);
    assert!(!process_alive(pid), "plugin process {pid} still alive");
    Ok(())
}

#[tokio::test]
async fn test_cleanup_kills_plugins_that_ignore_stdin_close() -> Result<()> {
    let dir = plugins_dir(&[])?;
    write_script(dir.path(), "stubborn", "exec sleep 1000")?;
    write_script(dir.path(), "obstinate", "exec sleep 1000")?;
    let manager = manager_for(dir.path());

    manager.start_plugin(LANG, "stubborn").await?;
    manager.start_plugin(LANG, "obstinate").await?;
    let pids: Vec<u32> = [
        manager.plugin_pid(LANG, "stubborn").await,
        manager.plugin_pid(LANG, "obstinate").await,
    ]
    .into_iter()
    .flatten()
    .collect();
    assert_eq!(pids.len(), 2);

    manager.cleanup_plugins().await;

    assert!(manager.running_plugins().await.is_empty());
    for pid in pids {
        assert!(!process_alive(pid), "plugin process {pid} still alive");
    }
    Ok(())
}

#[tokio::test]
async fn test_killed_plugin_is_forgotten() -> Result<()> {
    let dir = plugins_dir(&["hindi"])?;
    let manager = manager_for(dir.path());

    manager.start_plugin(LANG, "hindi").await?;
    let pid = manager
        .plugin_pid(LANG, "hindi")
        .await
        .expect("running plugin should have a pid");

    let status = Command::new("kill").args(["-9", &pid.to_string()]).status()?;
    assert!(status.success());

    wait_until_stopped(&manager, "hindi").await;

    // A later request gets a new process
    let message = manager.get_greeting(LANG, "hindi", "hello").await?;
    assert_eq!(message, "नमस्ते! (Namaste!)");

    manager.cleanup_plugins().await;
    Ok(())
}

#[tokio::test]
async fn test_cleanup_stops_every_plugin() -> Result<()> {
    let dir = plugins_dir(&["hindi", "japanese"])?;
    let manager = manager_for(dir.path());

    manager.start_plugin(LANG, "hindi").await?;
    manager.start_plugin(LANG, "japanese").await?;
    let pids: Vec<u32> = [
        manager.plugin_pid(LANG, "hindi").await,
        manager.plugin_pid(LANG, "japanese").await,
    ]
    .into_iter()
    .flatten()
    .collect();
    assert_eq!(pids.len(), 2);

    manager.cleanup_plugins().await;

    assert!(manager.running_plugins().await.is_empty());
    for pid in pids {
        assert!(!process_alive(pid), "plugin process {pid} still alive");
    }
    Ok(())
}

#[tokio::test]
async fn test_discovers_linked_plugins() -> Result<()> {
    let dir = plugins_dir(&["japanese", "hindi"])?;
    std::fs::write(dir.path().join(LANG).join("README"), "not a plugin")?;
    let manager = manager_for(dir.path());

    assert_eq!(manager.discover_plugins(LANG)?, vec!["hindi", "japanese"]);
    Ok(())
}
