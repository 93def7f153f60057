//! Plugin side: serve a [`Greeter`] over the process's own stdin/stdout
//!
//! A plugin executable is a thin `main` around [`run_standalone`]. The host
//! spawns it with piped stdio, so stdout belongs to gRPC and every log line
//! must go to stderr, where the host relays it into its own log.
use std::future::Future;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncWrite};
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{debug, error, info};

use super::client::{KEEPALIVE_INTERVAL, KEEPALIVE_TIMEOUT};
use super::protocol::{
    Empty, GreetingResponse,
    greeter_service_server::{GreeterService, GreeterServiceServer},
};
use super::stdio_transport::{PipeChannel, PipeListener};
use crate::greetings::{Greeter, GreetingCommand};
use crate::shutdown;

/// How long the runtime waits for stray blocking work (the stdin reader) on exit
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

/// Exposes a provider through the generated gRPC service
pub struct GreeterAdapter {
    provider: Arc<dyn Greeter>,
}

impl GreeterAdapter {
    pub fn new(provider: Arc<dyn Greeter>) -> Self {
        Self { provider }
    }

    fn respond(&self, command: GreetingCommand) -> Response<GreetingResponse> {
        debug!("Received {command} request");
        Response::new(GreetingResponse {
            message: self.provider.greet(command).to_string(),
        })
    }
}

#[tonic::async_trait]
impl GreeterService for GreeterAdapter {
    async fn hello(&self, _: Request<Empty>) -> Result<Response<GreetingResponse>, Status> {
        Ok(self.respond(GreetingCommand::Hello))
    }

    async fn good_morning(
        &self,
        _: Request<Empty>,
    ) -> Result<Response<GreetingResponse>, Status> {
        Ok(self.respond(GreetingCommand::GoodMorning))
    }

    async fn good_afternoon(
        &self,
        _: Request<Empty>,
    ) -> Result<Response<GreetingResponse>, Status> {
        Ok(self.respond(GreetingCommand::GoodAfternoon))
    }

    async fn good_night(&self, _: Request<Empty>) -> Result<Response<GreetingResponse>, Status> {
        Ok(self.respond(GreetingCommand::GoodNight))
    }

    async fn good_bye(&self, _: Request<Empty>) -> Result<Response<GreetingResponse>, Status> {
        Ok(self.respond(GreetingCommand::GoodBye))
    }
}

/// Runs the provider's close hook when dropped
struct CloseOnDrop(Arc<dyn Greeter>);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        if let Err(err) = self.0.close() {
            error!("Error during plugin cleanup: {err:#}");
        }
    }
}

/// Serve `provider` over `channel` until `shutdown` resolves or the host hangs up
///
/// In-flight calls are allowed to finish before this returns.
pub async fn serve<R, W, F>(
    provider: Arc<dyn Greeter>,
    channel: PipeChannel<R, W>,
    shutdown: F,
) -> Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
    F: Future<Output = ()> + Send,
{
    let pipe = channel.handle();
    let listener = Arc::new(PipeListener::new(channel));
    let incoming = listener.clone().incoming();

    let stop = async move {
        tokio::select! {
            () = shutdown => info!("Received shutdown signal, stopping server..."),
            () = pipe.closed() => info!("Host closed the pipe, stopping server..."),
        }
        listener.close();
    };

    Server::builder()
        .http2_keepalive_interval(Some(KEEPALIVE_INTERVAL))
        .http2_keepalive_timeout(Some(KEEPALIVE_TIMEOUT))
        .add_service(GreeterServiceServer::new(GreeterAdapter::new(provider)))
        .serve_with_incoming_shutdown(incoming, stop)
        .await
        .context("Plugin server failed")
}

/// Initialise `provider` and serve it over this process's stdin/stdout
///
/// Returns once a termination signal arrives or the host closes our stdin.
pub async fn run(mut provider: Box<dyn Greeter>) -> Result<()> {
    info!("Starting plugin: {}", provider.name());

    provider
        .init()
        .with_context(|| format!("Failed to initialize plugin {}", provider.name()))?;
    let provider: Arc<dyn Greeter> = Arc::from(provider);
    let _close = CloseOnDrop(provider.clone());

    let channel = PipeChannel::new(tokio::io::stdin(), tokio::io::stdout());

    info!("Server starting...");
    serve(provider, channel, shutdown::termination()).await
}

/// Entry point for plugin executables: logging, runtime, [`run`], exit status
pub fn run_standalone(provider: Box<dyn Greeter>) -> ExitCode {
    init_logging();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("Failed to start async runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(run(provider));
    // A read on our stdin may still be parked on a blocking thread
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("Failed to serve: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env(crate::config::LOG_LEVEL_ENV)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout carries gRPC frames
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .without_time()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::io::duplex;
    use tokio::sync::oneshot;
    use tokio::time::timeout;

    struct Tracked {
        closed: Arc<AtomicBool>,
    }

    impl Greeter for Tracked {
        fn name(&self) -> &str {
            "tracked"
        }
        fn close(&self) -> anyhow::Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
        fn hello(&self) -> &str {
            "hi"
        }
        fn good_morning(&self) -> &str {
            "morning"
        }
        fn good_afternoon(&self) -> &str {
            "afternoon"
        }
        fn good_night(&self) -> &str {
            "night"
        }
        fn good_bye(&self) -> &str {
            "bye"
        }
    }

    #[tokio::test]
    async fn test_adapter_returns_provider_strings() {
        let adapter = GreeterAdapter::new(Arc::new(crate::lang::Japanese));

        let response = adapter.hello(Request::new(Empty {})).await.unwrap();
        assert_eq!(response.into_inner().message, "こんにちは! (Konnichiwa)");
        let response = adapter.good_night(Request::new(Empty {})).await.unwrap();
        assert_eq!(response.into_inner().message, "おやすみなさい! (Oyasumi nasai)");
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown_signal() {
        let (_host_out, plugin_in) = duplex(1024);
        let (plugin_out, _host_in) = duplex(1024);
        let channel = PipeChannel::new(plugin_in, plugin_out);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let server = tokio::spawn(serve(Arc::new(crate::lang::English), channel, async {
            let _ = stop_rx.await;
        }));
        stop_tx.send(()).unwrap();

        let result = timeout(Duration::from_secs(5), server)
            .await
            .expect("server should stop on the shutdown signal")
            .unwrap();
        assert!(result.is_ok());
    }

    #[test]
    fn test_close_guard_runs_close_hook() {
        let closed = Arc::new(AtomicBool::new(false));
        let provider: Arc<dyn Greeter> = Arc::new(Tracked {
            closed: closed.clone(),
        });

        drop(CloseOnDrop(provider));
        assert!(closed.load(Ordering::SeqCst));
    }
}
