//! Plugin manager handles plugin lifecycle and orchestration
//!
//! This module is responsible for:
//! - Plugin discovery under `<plugins_dir>/<category>`
//! - Process spawning and stdio wiring
//! - Greeting calls forwarded over gRPC, starting plugins lazily
//! - Relaying plugin stderr into our log
//! - Noticing plugin exits and stopping plugins on demand or at shutdown
//!
//! Per key, an instance moves absent → starting → running → stopping → absent.
//! A plugin that dies on its own is simply removed; nothing restarts it.
use anyhow::{Context, Result, anyhow};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::{RwLock, watch};
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

use super::client::RpcClient;
use super::discovery;
use super::stdio_transport::PipeHandle;
use crate::greetings::GreetingCommand;

/// How long a stopping plugin gets to exit on its own before it is killed
pub const EXIT_GRACE: Duration = Duration::from_secs(2);

/// Upper bound on waiting for the exit observer after a stop
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies a plugin by category and name, e.g. `lang/hindi`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PluginKey {
    pub category: String,
    pub name: String,
}

impl PluginKey {
    pub fn new(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for PluginKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.name)
    }
}

/// Cancellation shared by everything that belongs to one plugin process
///
/// Cancelling the scope tells the exit observer to terminate the process.
#[derive(Clone)]
struct LifetimeScope {
    cancelled: Arc<watch::Sender<bool>>,
}

impl LifetimeScope {
    fn new() -> Self {
        let (cancelled, _) = watch::channel(false);
        Self {
            cancelled: Arc::new(cancelled),
        }
    }

    fn cancel(&self) {
        self.cancelled.send_replace(true);
    }

    fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    async fn cancelled(&self) {
        let mut cancelled = self.cancelled.subscribe();
        let _ = cancelled.wait_for(|cancelled| *cancelled).await;
    }
}

/// A running plugin process
struct PluginInstance {
    id: u64,
    name: String,
    pid: Option<u32>,
    pipe: PipeHandle,
    client: RpcClient,
    scope: LifetimeScope,
    exited: watch::Receiver<bool>,
    span: Span,
}

impl PluginInstance {
    fn has_exited(&self) -> bool {
        *self.exited.borrow()
    }

    /// Pipes, then client, then scope, then wait for the process to go away
    ///
    /// Closing stdin first lets a well-behaved plugin see EOF and exit before
    /// the observer resorts to a kill. Every step is best effort.
    async fn shutdown(&self) {
        async {
            if let Err(err) = self.pipe.close_writer() {
                warn!("Failed to close stdin pipe: {err}");
            }
            if let Err(err) = self.pipe.close_reader() {
                warn!("Failed to close stdout pipe: {err}");
            }
            self.client.close();

            debug!("Canceling plugin scope");
            self.scope.cancel();

            if !self.has_exited() {
                debug!("Waiting for plugin to exit");
                let mut exited = self.exited.clone();
                let wait = exited.wait_for(|exited| *exited);
                if tokio::time::timeout(STOP_TIMEOUT, wait).await.is_err() {
                    warn!("Plugin {} did not exit within {STOP_TIMEOUT:?}", self.name);
                }
            }
        }
        .instrument(self.span.clone())
        .await
    }
}

type PluginTable = Arc<RwLock<HashMap<PluginKey, Arc<PluginInstance>>>>;

/// Plugin manager coordinates all plugin processes
pub struct PluginManager {
    plugins_dir: PathBuf,
    plugins: PluginTable,
}

impl PluginManager {
    /// Create a new plugin manager rooted at `plugins_dir`
    pub fn new(plugins_dir: impl Into<PathBuf>) -> Self {
        Self {
            plugins_dir: plugins_dir.into(),
            plugins: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    /// Where the executable for `category`/`name` is expected
    pub fn plugin_path(&self, category: &str, name: &str) -> PathBuf {
        self.plugins_dir.join(category).join(name)
    }

    /// Find every plugin available in `category`
    pub fn discover_plugins(&self, category: &str) -> Result<Vec<String>> {
        info!("Discovering plugins in category: {category}");
        discovery::discover_from_dir(&self.plugins_dir.join(category))
    }

    /// Spawn a plugin and connect to it; a no-op if it is already running
    pub async fn start_plugin(&self, category: &str, name: &str) -> Result<()> {
        let key = PluginKey::new(category, name);
        // Held through spawn and connect so concurrent starts of one key spawn
        // one process. Other lookups wait at most CONNECT_TIMEOUT.
        let mut plugins = self.plugins.write().await;
        if plugins.contains_key(&key) {
            return Ok(());
        }

        let exec_path = self.plugin_path(category, name);
        info!("Starting plugin: {name} ({})", exec_path.display());

        let scope = LifetimeScope::new();
        let mut child = Command::new(&exec_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start plugin {key}"))?;

        // Dropping `child` on an early return kills the process
        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            scope.cancel();
            return Err(anyhow!("Failed to capture stdio pipes of plugin {key}"));
        };

        let span = info_span!("plugin", plugin = %name);
        tokio::spawn(relay_stderr(stderr).instrument(span.clone()));

        let client = match RpcClient::connect(stdin, stdout).instrument(span.clone()).await {
            Ok(client) => client,
            Err(err) => {
                scope.cancel();
                if let Err(kill_err) = child.start_kill() {
                    warn!("Failed to kill plugin process: {kill_err}");
                }
                return Err(err).with_context(|| format!("Failed to create gRPC client for {key}"));
            }
        };

        let (exited_tx, exited_rx) = watch::channel(false);
        let instance = Arc::new(PluginInstance {
            id: NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed),
            name: name.to_string(),
            pid: child.id(),
            pipe: client.pipe(),
            client,
            scope: scope.clone(),
            exited: exited_rx,
            span: span.clone(),
        });
        plugins.insert(key.clone(), instance.clone());

        tokio::spawn(
            observe_exit(
                child,
                key,
                instance.id,
                scope,
                exited_tx,
                self.plugins.clone(),
            )
            .instrument(span),
        );

        Ok(())
    }

    /// Stop a running plugin; a no-op if it is not running
    pub async fn stop_plugin(&self, category: &str, name: &str) {
        let key = PluginKey::new(category, name);
        let mut plugins = self.plugins.write().await;
        let Some(instance) = plugins.get(&key).cloned() else {
            return;
        };

        info!("Stopping plugin: {name}");
        instance.shutdown().await;
        plugins.remove(&key);
    }

    /// Ask a plugin for a greeting, starting the plugin first if needed
    ///
    /// The command is validated before anything is spawned. Failures are not
    /// retried here; callers decide whether to stop the instance.
    pub async fn get_greeting(&self, category: &str, name: &str, command: &str) -> Result<String> {
        let command: GreetingCommand = command.parse()?;
        let key = PluginKey::new(category, name);

        let instance = match self.instance(&key).await {
            Some(instance) => instance,
            None => {
                self.start_plugin(category, name)
                    .await
                    .with_context(|| format!("Plugin {key} is not running and could not be started"))?;
                self.instance(&key)
                    .await
                    .ok_or_else(|| anyhow!("Plugin {key} exited before it could serve {command}"))?
            }
        };

        debug!("Executing command '{command}' on plugin {name}");
        instance
            .client
            .greet(command)
            .instrument(instance.span.clone())
            .await
            .with_context(|| format!("Plugin {key} failed to answer '{command}'"))
    }

    /// Stop every running plugin; meant to be called once at exit
    ///
    /// Holds the table's write lock for the whole sweep so nothing can start
    /// while shutting down.
    pub async fn cleanup_plugins(&self) {
        let mut plugins = self.plugins.write().await;
        for (key, instance) in plugins.drain() {
            info!("Stopping plugin: {key}");
            instance.shutdown().await;
        }
    }

    pub async fn is_running(&self, category: &str, name: &str) -> bool {
        self.plugins
            .read()
            .await
            .contains_key(&PluginKey::new(category, name))
    }

    /// Keys of every running plugin, sorted
    pub async fn running_plugins(&self) -> Vec<PluginKey> {
        let mut keys: Vec<_> = self.plugins.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// OS process id of a running plugin
    pub async fn plugin_pid(&self, category: &str, name: &str) -> Option<u32> {
        self.instance(&PluginKey::new(category, name))
            .await
            .and_then(|instance| instance.pid)
    }

    async fn instance(&self, key: &PluginKey) -> Option<Arc<PluginInstance>> {
        self.plugins.read().await.get(key).cloned()
    }
}

/// Forward each stderr line of a plugin into our log
async fn relay_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => info!("{line}"),
            Ok(None) => break,
            Err(err) => {
                debug!("Stopped reading plugin stderr: {err}");
                break;
            }
        }
    }
}

/// Wait for a plugin process to end, then drop it from the table
///
/// Exit is reported before the table lock is taken, so a stop holding the
/// write lock while waiting for exit cannot deadlock with us.
async fn observe_exit(
    mut child: Child,
    key: PluginKey,
    id: u64,
    scope: LifetimeScope,
    exited: watch::Sender<bool>,
    plugins: PluginTable,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        () = scope.cancelled() => terminate(&mut child).await,
    };
    exited.send_replace(true);

    {
        let mut plugins = plugins.write().await;
        // A stop followed by a fresh start may already own this key
        if plugins.get(&key).is_some_and(|instance| instance.id == id) {
            plugins.remove(&key);
        }
    }

    match status {
        Ok(status) if status.success() || scope.is_cancelled() => info!("Plugin exited"),
        Ok(status) => error!("Plugin exited with error: {status}"),
        Err(err) if scope.is_cancelled() => debug!("Plugin exited; wait failed: {err}"),
        Err(err) => error!("Failed to wait for plugin: {err}"),
    }
}

/// Give the child [`EXIT_GRACE`] to exit after its stdin closed, then kill it
async fn terminate(child: &mut Child) -> io::Result<ExitStatus> {
    match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            warn!("Plugin still running after {EXIT_GRACE:?}, killing it");
            child.kill().await?;
            child.wait().await
        }
    }
}
