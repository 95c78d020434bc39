//! Redis Streams implementation of the broker contract.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, RedisResult, Value};
use shopfront_messaging::transport::{
    BrokerConnection, BrokerMessage, MessageReceiver, MessageSender, MessageSettlement,
    ProcessorOptions, ReceivedMessage,
};
use shopfront_messaging::MessagingError;
use tracing::{debug, info, warn};

use crate::error::{RedisBrokerError, RedisBrokerResult};
use crate::stream::{self, FIELD_DESCRIPTION, FIELD_REASON, StreamEntry};

/// Redis transport settings.
#[derive(Debug, Clone)]
pub struct RedisBrokerConfig {
    /// Redis connection URL.
    pub url: String,
    /// Consumer name within every consumer group. Must be unique per process.
    pub consumer_name: String,
    /// How long XREADGROUP blocks waiting for new entries.
    pub block_timeout: Duration,
}

impl RedisBrokerConfig {
    /// Settings with a 5 second block timeout.
    #[must_use]
    pub fn new(url: impl Into<String>, consumer_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            consumer_name: consumer_name.into(),
            block_timeout: Duration::from_secs(5),
        }
    }
}

/// A connected Redis broker.
///
/// Senders and settlements share one multiplexed connection. Each receiver
/// opens its own, since a blocking XREADGROUP would stall everything else
/// queued on a shared one.
#[derive(Clone)]
pub struct RedisBroker {
    client: Client,
    conn: MultiplexedConnection,
    config: RedisBrokerConfig,
}

impl std::fmt::Debug for RedisBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBroker")
            .field("consumer_name", &self.config.consumer_name)
            .finish_non_exhaustive()
    }
}

impl RedisBroker {
    /// Connects to Redis.
    ///
    /// # Errors
    ///
    /// Returns `RedisBrokerError::Redis` if the URL is invalid or the
    /// connection cannot be established.
    pub async fn connect(config: RedisBrokerConfig) -> RedisBrokerResult<Self> {
        let client = Client::open(config.url.as_str())?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!(consumer = %config.consumer_name, "connected to Redis");
        Ok(Self {
            client,
            conn,
            config,
        })
    }
}

impl BrokerConnection for RedisBroker {
    fn create_sender(&self, topic: &str) -> Result<Arc<dyn MessageSender>, MessagingError> {
        Ok(Arc::new(RedisSender {
            conn: self.conn.clone(),
            stream: topic.to_owned(),
        }))
    }

    fn create_receiver(
        &self,
        topic: &str,
        subscription: &str,
        options: &ProcessorOptions,
    ) -> Result<Box<dyn MessageReceiver>, MessagingError> {
        Ok(Box::new(RedisReceiver {
            client: self.client.clone(),
            conn: None,
            settle_conn: self.conn.clone(),
            stream: topic.to_owned(),
            group: subscription.to_owned(),
            consumer: self.config.consumer_name.clone(),
            block_timeout: self.config.block_timeout,
            min_idle: options.lock_renewal,
            pending_cursor: Some("0".to_owned()),
        }))
    }
}

struct RedisSender {
    conn: MultiplexedConnection,
    stream: String,
}

#[async_trait]
impl MessageSender for RedisSender {
    async fn send(&self, message: BrokerMessage) -> Result<(), MessagingError> {
        let fields = stream::encode(&message);
        let entry_id: String = self
            .conn
            .clone()
            .xadd(&self.stream, "*", fields.as_slice())
            .await
            .map_err(RedisBrokerError::from)?;
        debug!(
            stream = %self.stream,
            entry_id = %entry_id,
            message_id = %message.message_id,
            "Added message to stream"
        );
        Ok(())
    }
}

struct RedisReceiver {
    client: Client,
    conn: Option<MultiplexedConnection>,
    settle_conn: MultiplexedConnection,
    stream: String,
    group: String,
    consumer: String,
    block_timeout: Duration,
    min_idle: Duration,
    /// Position in this consumer's own pending list, drained once after
    /// (re)start. `None` once drained.
    pending_cursor: Option<String>,
}

impl RedisReceiver {
    async fn connection(&mut self) -> RedisBrokerResult<MultiplexedConnection> {
        if let Some(conn) = &self.conn {
            return Ok(conn.clone());
        }
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        ensure_consumer_group(&mut conn, &self.stream, &self.group).await?;
        self.conn = Some(conn.clone());
        Ok(conn)
    }

    async fn next_entries(
        &mut self,
        conn: &mut MultiplexedConnection,
        max: usize,
    ) -> RedisBrokerResult<Vec<StreamEntry>> {
        if let Some(cursor) = self.pending_cursor.clone() {
            let entries = self.read_group(conn, &cursor, max, None).await?;
            match entries.last() {
                Some(last) => {
                    self.pending_cursor = Some(last.entry_id.clone());
                    return Ok(entries);
                }
                None => self.pending_cursor = None,
            }
        }

        let claimed = self.autoclaim(conn, max).await?;
        if !claimed.is_empty() {
            debug!(stream = %self.stream, group = %self.group, count = claimed.len(), "Claimed idle entries");
            return Ok(claimed);
        }

        self.read_group(conn, ">", max, Some(self.block_timeout)).await
    }

    async fn read_group(
        &self,
        conn: &mut MultiplexedConnection,
        id: &str,
        max: usize,
        block: Option<Duration>,
    ) -> RedisBrokerResult<Vec<StreamEntry>> {
        // XREADGROUP GROUP group consumer COUNT n [BLOCK ms] STREAMS key id
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.group)
            .arg(&self.consumer)
            .arg("COUNT")
            .arg(max);
        if let Some(block) = block {
            cmd.arg("BLOCK").arg(millis(block));
        }
        cmd.arg("STREAMS").arg(&self.stream).arg(id);
        let value: Value = cmd.query_async(conn).await?;
        stream::parse_read_reply(&value)
    }

    async fn autoclaim(
        &self,
        conn: &mut MultiplexedConnection,
        max: usize,
    ) -> RedisBrokerResult<Vec<StreamEntry>> {
        // XAUTOCLAIM key group consumer min-idle-time start COUNT n
        let value: Value = redis::cmd("XAUTOCLAIM")
            .arg(&self.stream)
            .arg(&self.group)
            .arg(&self.consumer)
            .arg(millis(self.min_idle))
            .arg("0-0")
            .arg("COUNT")
            .arg(max)
            .query_async(conn)
            .await?;
        stream::parse_autoclaim_reply(&value)
    }
}

#[async_trait]
impl MessageReceiver for RedisReceiver {
    async fn receive(&mut self, max_messages: usize) -> Result<Vec<ReceivedMessage>, MessagingError> {
        let mut conn = self.connection().await?;
        let entries = match self.next_entries(&mut conn, max_messages).await {
            Ok(entries) => entries,
            Err(error) => {
                // Reconnect on the next call.
                self.conn = None;
                return Err(error.into());
            }
        };
        Ok(entries
            .into_iter()
            .map(|entry| ReceivedMessage {
                message: entry.message.clone(),
                settlement: Box::new(RedisSettlement {
                    conn: self.settle_conn.clone(),
                    stream: self.stream.clone(),
                    group: self.group.clone(),
                    entry_id: entry.entry_id,
                    message: entry.message,
                }),
            })
            .collect())
    }
}

struct RedisSettlement {
    conn: MultiplexedConnection,
    stream: String,
    group: String,
    entry_id: String,
    message: BrokerMessage,
}

#[async_trait]
impl MessageSettlement for RedisSettlement {
    async fn complete(&self) -> Result<(), MessagingError> {
        let acked: i64 = self
            .conn
            .clone()
            .xack(&self.stream, &self.group, &[self.entry_id.as_str()])
            .await
            .map_err(RedisBrokerError::from)?;
        if acked == 0 {
            warn!(
                stream = %self.stream,
                entry_id = %self.entry_id,
                "XACK returned 0, entry may have been claimed by another consumer"
            );
        }
        Ok(())
    }

    async fn abandon(&self) -> Result<(), MessagingError> {
        let fields = stream::encode(&self.message);
        let mut conn = self.conn.clone();
        let result: RedisResult<()> = redis::pipe()
            .atomic()
            .xadd(&self.stream, "*", fields.as_slice())
            .ignore()
            .xack(&self.stream, &self.group, &[self.entry_id.as_str()])
            .ignore()
            .query_async(&mut conn)
            .await;
        result.map_err(RedisBrokerError::from)?;
        debug!(stream = %self.stream, entry_id = %self.entry_id, "Requeued entry");
        Ok(())
    }

    async fn dead_letter(&self, reason: &str, description: &str) -> Result<(), MessagingError> {
        let dead_letter_key = stream::dead_letter_key(&self.stream, &self.group);
        let mut fields = stream::encode(&self.message);
        fields.push((FIELD_REASON, reason.to_owned()));
        fields.push((FIELD_DESCRIPTION, description.to_owned()));
        let mut conn = self.conn.clone();
        let result: RedisResult<()> = redis::pipe()
            .atomic()
            .xadd(&dead_letter_key, "*", fields.as_slice())
            .ignore()
            .xack(&self.stream, &self.group, &[self.entry_id.as_str()])
            .ignore()
            .query_async(&mut conn)
            .await;
        result.map_err(RedisBrokerError::from)?;
        info!(
            stream = %dead_letter_key,
            entry_id = %self.entry_id,
            reason,
            "Dead-lettered entry"
        );
        Ok(())
    }
}

/// Creates the consumer group if it does not exist yet.
async fn ensure_consumer_group(
    conn: &mut MultiplexedConnection,
    stream: &str,
    group: &str,
) -> RedisBrokerResult<()> {
    // XGROUP CREATE key group $ MKSTREAM; a new group only sees entries
    // added after it exists.
    let result: RedisResult<()> = redis::cmd("XGROUP")
        .arg("CREATE")
        .arg(stream)
        .arg(group)
        .arg("$")
        .arg("MKSTREAM")
        .query_async(conn)
        .await;

    match result {
        Ok(()) => {
            info!(stream, group, "Created consumer group");
            Ok(())
        }
        Err(e) if e.to_string().contains("BUSYGROUP") => {
            debug!(stream, group, "Consumer group already exists");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
