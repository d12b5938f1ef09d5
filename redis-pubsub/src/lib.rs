use futures::StreamExt;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::{
    select,
    sync::{
        mpsc::{self, UnboundedReceiver, UnboundedSender},
        oneshot,
    },
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A message delivered on a channel this client is subscribed to.
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    /// Channel the message was published on
    pub channel: String,
    /// Raw message payload
    pub payload: String,
}

/// Commands handled by the background driver task that owns the
/// subscription connection.
enum DriverCommand {
    Subscribe {
        channel: String,
        ack: oneshot::Sender<Result<(), RedisPubSubError>>,
    },
    Unsubscribe {
        channel: String,
        ack: oneshot::Sender<Result<(), RedisPubSubError>>,
    },
}

/// Async Redis pub/sub client.
///
/// Publishing and subscribing use separate connections, as Redis requires: a
/// connection in subscriber mode only accepts subscription commands. Publishes
/// go through a multiplexed [`ConnectionManager`]; subscriptions are owned by a
/// background driver task that interleaves SUBSCRIBE/UNSUBSCRIBE commands with
/// reading inbound messages, forwarding every received message to the channel
/// returned by [`RedisPubSub::connect`].
///
/// `subscribe` and `unsubscribe` resolve once the server has acknowledged the
/// command on the subscription connection.
pub struct RedisPubSub {
    publisher: ConnectionManager,
    commands: UnboundedSender<DriverCommand>,
    _handler: (JoinHandle<()>, CancellationToken),
}

impl RedisPubSub {
    /// Connects to Redis and starts the subscription driver.
    ///
    /// # Arguments
    /// * `url` - Redis connection URL (`redis://host:port`)
    ///
    /// # Returns
    /// The client handle plus the receiver for all inbound channel messages
    ///
    /// # Errors
    /// Returns an error if the URL is malformed or either connection cannot be
    /// established
    pub async fn connect(
        url: &str,
    ) -> Result<(Self, UnboundedReceiver<ChannelMessage>), RedisPubSubError> {
        let client =
            redis::Client::open(url).map_err(|err| RedisPubSubError::InvalidUrl(err.to_string()))?;

        info!("Connecting to Redis at {}", url);

        let publisher = ConnectionManager::new(client.clone())
            .await
            .map_err(|err| RedisPubSubError::ConnectionError(err.to_string()))?;

        debug!("Redis publish connection established");

        let pubsub = client
            .get_async_connection()
            .await
            .map_err(|err| RedisPubSubError::ConnectionError(err.to_string()))?
            .into_pubsub();

        debug!("Redis subscribe connection established");

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let token = CancellationToken::new();
        let cloned_token = token.clone();
        let handle = tokio::spawn(async move {
            drive_subscriptions(pubsub, command_rx, inbound_tx, cloned_token).await;
        });

        Ok((
            Self {
                publisher,
                commands: command_tx,
                _handler: (handle, token),
            },
            inbound_rx,
        ))
    }

    /// Publishes a payload on a channel.
    ///
    /// # Returns
    /// The number of subscribers the server delivered the message to
    ///
    /// # Errors
    /// Returns an error if the PUBLISH command fails
    pub async fn publish(&self, channel: &str, payload: &str) -> Result<u64, RedisPubSubError> {
        let mut conn = self.publisher.clone();

        let receivers: u64 = conn
            .publish(channel, payload)
            .await
            .map_err(|err| RedisPubSubError::PublishError(err.to_string()))?;

        Ok(receivers)
    }

    /// Subscribes this client to a channel.
    ///
    /// Resolves once the server has confirmed the subscription; messages
    /// published on the channel afterwards arrive on the inbound receiver.
    ///
    /// # Errors
    /// Returns an error if the SUBSCRIBE command fails or the driver task has
    /// stopped
    pub async fn subscribe(&self, channel: &str) -> Result<(), RedisPubSubError> {
        let (ack_tx, ack_rx) = oneshot::channel();

        self.commands
            .send(DriverCommand::Subscribe {
                channel: channel.to_owned(),
                ack: ack_tx,
            })
            .map_err(|_| RedisPubSubError::DriverGone)?;

        ack_rx.await.map_err(|_| RedisPubSubError::DriverGone)?
    }

    /// Removes this client's subscription to a channel.
    ///
    /// # Errors
    /// Returns an error if the UNSUBSCRIBE command fails or the driver task
    /// has stopped
    pub async fn unsubscribe(&self, channel: &str) -> Result<(), RedisPubSubError> {
        let (ack_tx, ack_rx) = oneshot::channel();

        self.commands
            .send(DriverCommand::Unsubscribe {
                channel: channel.to_owned(),
                ack: ack_tx,
            })
            .map_err(|_| RedisPubSubError::DriverGone)?;

        ack_rx.await.map_err(|_| RedisPubSubError::DriverGone)?
    }

    /// Stops the subscription driver and waits for it to finish.
    pub async fn close(self) {
        self._handler.1.cancel();

        if let Err(err) = self._handler.0.await {
            warn!("Pub/sub driver task ended abnormally: {}", err);
        }
    }
}

/// Runs the subscription connection: interleaves incoming subscribe and
/// unsubscribe commands with reading messages off the wire.
///
/// The pub/sub connection is exclusively owned here; `on_message` borrows it
/// while waiting for traffic, so commands picked up by the select are executed
/// after the borrow is released at the end of each iteration.
async fn drive_subscriptions(
    mut pubsub: redis::aio::PubSub,
    mut commands: UnboundedReceiver<DriverCommand>,
    inbound: UnboundedSender<ChannelMessage>,
    token: CancellationToken,
) {
    loop {
        let command = select! {
            _ = token.cancelled() => break,
            command = commands.recv() => match command {
                Some(command) => Some(command),
                None => break,
            },
            message = async { pubsub.on_message().next().await } => {
                match message {
                    Some(message) => {
                        let channel = message.get_channel_name().to_owned();
                        match message.get_payload::<String>() {
                            Ok(payload) => {
                                debug!("Received message on channel {}", channel);
                                if inbound.send(ChannelMessage { channel, payload }).is_err() {
                                    // Inbound receiver dropped, nobody is listening anymore
                                    break;
                                }
                            }
                            Err(err) => {
                                warn!("Discarding non-text payload on channel {}: {}", channel, err);
                            }
                        }
                        None
                    }
                    None => {
                        warn!("Redis subscription connection closed by the server");
                        break;
                    }
                }
            }
        };

        if let Some(command) = command {
            match command {
                DriverCommand::Subscribe { channel, ack } => {
                    let result = pubsub
                        .subscribe(&channel)
                        .await
                        .map_err(|err| RedisPubSubError::SubscribeError(err.to_string()));

                    match &result {
                        Ok(()) => info!("Subscribed to channel {}", channel),
                        Err(err) => warn!("Failed to subscribe to channel {}: {}", channel, err),
                    }

                    let _ = ack.send(result);
                }
                DriverCommand::Unsubscribe { channel, ack } => {
                    let result = pubsub
                        .unsubscribe(&channel)
                        .await
                        .map_err(|err| RedisPubSubError::UnsubscribeError(err.to_string()));

                    match &result {
                        Ok(()) => info!("Unsubscribed from channel {}", channel),
                        Err(err) => warn!("Failed to unsubscribe from channel {}: {}", channel, err),
                    }

                    let _ = ack.send(result);
                }
            }
        }
    }

    debug!("Pub/sub driver stopped");
}

/// Errors produced by the Redis pub/sub client
#[derive(thiserror::Error, Debug)]
pub enum RedisPubSubError {
    /// Error in the provided URL
    #[error("Provided URL error: {0}")]
    InvalidUrl(String),
    /// Error establishing a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),
    /// Error publishing a message
    #[error("Error while publishing a message: {0}")]
    PublishError(String),
    /// Error subscribing to a channel
    #[error("Error while subscribing to a channel: {0}")]
    SubscribeError(String),
    /// Error unsubscribing from a channel
    #[error("Error while unsubscribing from a channel: {0}")]
    UnsubscribeError(String),
    /// The background driver task is no longer running
    #[error("Pub/sub driver task is no longer running")]
    DriverGone,
}
