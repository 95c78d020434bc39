//! Relay configuration read from the environment.

use std::str::FromStr;
use std::time::Duration;

use shopfront_messaging::{
    InboxPollerConfig, OutboxPublisherConfig, ProcessorOptions, SubscriptionKey,
};
use uuid::Uuid;

use crate::error::AppError;

/// Everything the relay needs to start.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// `PostgreSQL` connection URL.
    pub database_url: String,
    /// HTTP bind host.
    pub host: String,
    /// HTTP bind port.
    pub port: u16,
    /// Redis URL. `None` selects the in-process broker.
    pub redis_url: Option<String>,
    /// Consumer name registered with the broker.
    pub consumer_name: String,
    /// Outbox publisher settings.
    pub outbox: OutboxPublisherConfig,
    /// Inbox poller settings.
    pub inbox: InboxPollerConfig,
    /// Subscription to consume. `None` runs the relay publish-only.
    pub subscription: Option<SubscriptionKey>,
    /// Receive-loop tuning for the subscription.
    pub processor: ProcessorOptions,
}

impl RelayConfig {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a required variable is missing or a
    /// value cannot be parsed.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a required variable is missing or a
    /// value cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let database_url = var("DATABASE_URL").ok_or_else(|| {
            AppError::Config("DATABASE_URL environment variable must be set".into())
        })?;
        let host = var("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or(&var, "PORT", 3000_u16)?;

        let sweep_interval = Duration::from_secs(parse_or(&var, "SWEEP_INTERVAL_SECS", 60_u64)?);
        if sweep_interval.is_zero() {
            return Err(AppError::Config("SWEEP_INTERVAL_SECS must be positive".into()));
        }

        let topic = var("OUTBOX_TOPIC");
        let enabled = match var("OUTBOX_PUBLISH_ENABLED") {
            Some(value) => parse_bool("OUTBOX_PUBLISH_ENABLED", &value)?,
            None => topic.is_some(),
        };
        let outbox = OutboxPublisherConfig {
            enabled,
            topic,
            sweep_interval,
        };
        outbox
            .validate()
            .map_err(|e| AppError::Config(format!("OUTBOX_TOPIC: {e}")))?;

        let inbox = InboxPollerConfig {
            batch_size: parse_or(&var, "INBOX_BATCH_SIZE", 100_usize)?,
            poll_interval: sweep_interval,
        };
        if inbox.batch_size == 0 {
            return Err(AppError::Config("INBOX_BATCH_SIZE must be positive".into()));
        }

        let subscription = match (var("INBOX_TOPIC"), var("INBOX_SUBSCRIPTION")) {
            (Some(topic), Some(subscription)) => Some(SubscriptionKey {
                topic,
                subscription,
            }),
            (None, None) => None,
            _ => {
                return Err(AppError::Config(
                    "INBOX_TOPIC and INBOX_SUBSCRIPTION must be set together".into(),
                ));
            }
        };

        let defaults = ProcessorOptions::default();
        let processor = ProcessorOptions {
            max_concurrent_calls: parse_or(
                &var,
                "MAX_CONCURRENT_CALLS",
                defaults.max_concurrent_calls,
            )?,
            prefetch_count: parse_or(&var, "PREFETCH_COUNT", defaults.prefetch_count)?,
            lock_renewal: Duration::from_secs(parse_or(
                &var,
                "LOCK_RENEWAL_SECS",
                defaults.lock_renewal.as_secs(),
            )?),
        };
        if processor.max_concurrent_calls == 0 || processor.prefetch_count == 0 {
            return Err(AppError::Config(
                "MAX_CONCURRENT_CALLS and PREFETCH_COUNT must be positive".into(),
            ));
        }

        Ok(Self {
            database_url,
            host,
            port,
            redis_url: var("REDIS_URL"),
            consumer_name: var("CONSUMER_NAME")
                .unwrap_or_else(|| format!("relay-{}", Uuid::new_v4())),
            outbox,
            inbox,
            subscription,
            processor,
        })
    }
}

fn parse_or<T>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{key} must be a valid number: {e}"))),
        None => Ok(default),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, AppError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(AppError::Config(format!("{key} must be true or false, got {other}"))),
    }
}
