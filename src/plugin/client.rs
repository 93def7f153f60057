//! gRPC client bound to one plugin process's stdin/stdout
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tonic::Request;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;
use tracing::{debug, error};

use super::error::PluginError;
use super::protocol::{Empty, greeter_service_client::GreeterServiceClient};
use super::stdio_transport::{PipeChannel, PipeHandle};
use crate::greetings::GreetingCommand;

/// Upper bound for a single greeting round trip
pub const CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound for the HTTP/2 handshake over the pipes
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between HTTP/2 keepalive pings
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5);

/// How long a keepalive ping may go unanswered before the connection is dropped
pub const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Nominal target; the connector below ignores it
const PIPE_URI: &str = "http://pipe";

/// A connection to a plugin's greeting service
pub struct RpcClient {
    client: Mutex<Option<GreeterServiceClient<Channel>>>,
    pipe: PipeHandle,
}

impl RpcClient {
    /// Open a gRPC connection over a child's stdin (`writer`) and stdout (`reader`)
    ///
    /// The pipes are the only transport: the connector hands out this one
    /// channel, and any reconnect attempt fails rather than dialing anything.
    pub async fn connect<W, R>(writer: W, reader: R) -> Result<Self, PluginError>
    where
        W: AsyncWrite + Unpin + Send + 'static,
        R: AsyncRead + Unpin + Send + 'static,
    {
        let channel = PipeChannel::new(reader, writer);
        let pipe = channel.handle();
        let slot = Arc::new(Mutex::new(Some(channel)));

        let connector = service_fn(move |_: Uri| {
            let slot = slot.clone();
            async move {
                let channel = slot
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take()
                    .ok_or_else(|| {
                        io::Error::new(io::ErrorKind::NotConnected, "plugin pipes already in use")
                    })?;
                Ok::<_, io::Error>(TokioIo::new(channel))
            }
        });

        let endpoint = Endpoint::from_static(PIPE_URI)
            .http2_keep_alive_interval(KEEPALIVE_INTERVAL)
            .keep_alive_timeout(KEEPALIVE_TIMEOUT)
            .keep_alive_while_idle(true);

        let channel = tokio::time::timeout(
            CONNECT_TIMEOUT,
            endpoint.connect_with_connector(connector),
        )
        .await
        .map_err(|_| PluginError::ConnectTimeout(CONNECT_TIMEOUT))?
        .map_err(|err| {
            error!("Failed to create gRPC client connection: {err}");
            PluginError::Connect(err)
        })?;

        Ok(Self {
            client: Mutex::new(Some(GreeterServiceClient::new(channel))),
            pipe,
        })
    }

    /// Control handle for the underlying pipes
    pub fn pipe(&self) -> PipeHandle {
        self.pipe.clone()
    }

    /// Ask the plugin for a greeting by command name
    ///
    /// Unknown commands are rejected locally; nothing is sent to the plugin.
    pub async fn get_greeting(&self, command: &str) -> Result<String, PluginError> {
        let command = command.parse::<GreetingCommand>().inspect_err(|err| {
            error!("{err}");
        })?;
        self.greet(command).await
    }

    /// Ask the plugin for a greeting, bounded by [`CALL_TIMEOUT`]
    pub async fn greet(&self, command: GreetingCommand) -> Result<String, PluginError> {
        let mut client = self
            .client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(PluginError::ClientClosed)?;

        let call = async move {
            let request = Request::new(Empty {});
            let response = match command {
                GreetingCommand::Hello => client.hello(request).await,
                GreetingCommand::GoodMorning => client.good_morning(request).await,
                GreetingCommand::GoodAfternoon => client.good_afternoon(request).await,
                GreetingCommand::GoodNight => client.good_night(request).await,
                GreetingCommand::GoodBye => client.good_bye(request).await,
            }?;
            Ok::<_, PluginError>(response.into_inner().message)
        };

        match tokio::time::timeout(CALL_TIMEOUT, call).await {
            Ok(Ok(message)) => Ok(message),
            Ok(Err(err)) => {
                error!("gRPC call failed: {err}");
                Err(err)
            }
            Err(_) => {
                error!("gRPC call {command} timed out after {CALL_TIMEOUT:?}");
                Err(PluginError::Timeout(CALL_TIMEOUT))
            }
        }
    }

    /// Drop the gRPC channel; later calls fail with [`PluginError::ClientClosed`]
    pub fn close(&self) {
        let client = self
            .client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if client.is_some() {
            debug!("Closed gRPC client connection");
        }
    }
}
