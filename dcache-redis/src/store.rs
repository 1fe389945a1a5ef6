//! Redis remote-store implementation.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dcache::{MessageStream, RemoteStore, StoreResult};
use futures::StreamExt;
use redis::Client;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use tokio::sync::OnceCell;

use crate::error::Error;

/// [`RemoteStore`] backed by a single Redis node.
///
/// Commands run over a lazily-established [`ConnectionManager`] that
/// reconnects with exponential backoff; each pub/sub subscription gets its
/// own dedicated connection, as Redis requires.
///
/// Use [`RedisStore::builder`] to construct one:
///
/// ```no_run
/// use dcache_redis::RedisStore;
/// use std::time::Duration;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = RedisStore::builder("redis://localhost:6379/0")
///     .response_timeout(Duration::from_secs(2))
///     .retries(3)
///     .build();
/// # Ok(())
/// # }
/// ```
///
/// The first cache operation fails if Redis is unreachable; construction
/// itself never connects.
pub struct RedisStore {
    url: String,
    username: Option<String>,
    password: Option<String>,
    connection_timeout: Option<Duration>,
    response_timeout: Option<Duration>,
    number_of_retries: Option<usize>,

    manager: OnceCell<ConnectionManager>,
}

/// Builder for [`RedisStore`].
pub struct RedisStoreBuilder {
    url: String,
    username: Option<String>,
    password: Option<String>,
    connection_timeout: Option<Duration>,
    response_timeout: Option<Duration>,
    number_of_retries: Option<usize>,
}

impl RedisStoreBuilder {
    /// Sets the username for Redis 6+ ACL authentication.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Sets the password for Redis authentication.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Timeout for establishing connections. Default: none.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = Some(timeout);
        self
    }

    /// Timeout for awaiting command responses. Default: none.
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = Some(timeout);
        self
    }

    /// Maximum reconnection attempts before a command fails.
    /// Default: the redis crate's own default.
    pub fn retries(mut self, count: usize) -> Self {
        self.number_of_retries = Some(count);
        self
    }

    /// Builds the store. The connection is established lazily on first use.
    pub fn build(self) -> RedisStore {
        RedisStore {
            url: self.url,
            username: self.username,
            password: self.password,
            connection_timeout: self.connection_timeout,
            response_timeout: self.response_timeout,
            number_of_retries: self.number_of_retries,
            manager: OnceCell::new(),
        }
    }
}

impl RedisStore {
    /// Creates a builder for the given connection URL, in the usual
    /// `redis://[:<password>@]<host>[:<port>][/<database>]` format.
    pub fn builder(url: impl Into<String>) -> RedisStoreBuilder {
        RedisStoreBuilder {
            url: url.into(),
            username: None,
            password: None,
            connection_timeout: None,
            response_timeout: None,
            number_of_retries: None,
        }
    }

    /// Connection parameters with builder auth applied.
    fn connection_info(&self) -> Result<redis::ConnectionInfo, Error> {
        let mut info: redis::ConnectionInfo = self.url.as_str().parse().map_err(Error::Redis)?;
        if let Some(username) = &self.username {
            info.redis.username = Some(username.clone());
        }
        if let Some(password) = &self.password {
            info.redis.password = Some(password.clone());
        }
        Ok(info)
    }

    /// Gets or lazily initializes the shared command connection.
    async fn manager(&self) -> Result<ConnectionManager, Error> {
        let manager = self
            .manager
            .get_or_try_init(|| async {
                let client = Client::open(self.connection_info()?)?;
                let mut config = ConnectionManagerConfig::new();
                if let Some(timeout) = self.connection_timeout {
                    config = config.set_connection_timeout(timeout);
                }
                if let Some(timeout) = self.response_timeout {
                    config = config.set_response_timeout(timeout);
                }
                if let Some(retries) = self.number_of_retries {
                    config = config.set_number_of_retries(retries);
                }
                let manager = client.get_connection_manager_with_config(config).await?;
                Ok::<_, Error>(manager)
            })
            .await?;
        Ok(manager.clone())
    }
}

#[async_trait]
impl RemoteStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Bytes>> {
        let mut conn = self.manager().await?;
        let raw: Option<Vec<u8>> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(Error::Redis)?;
        Ok(raw.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.manager().await?;
        redis::cmd("SET")
            .arg(key)
            .arg(&value[..])
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async::<()>(&mut conn)
            .await
            .map_err(Error::Redis)?;
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: Bytes, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.manager().await?;
        // SET NX replies OK on acquisition and nil otherwise.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(&value[..])
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(Error::Redis)?;
        Ok(reply.is_some())
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.manager().await?;
        redis::cmd("DEL")
            .arg(key)
            .query_async::<()>(&mut conn)
            .await
            .map_err(Error::Redis)?;
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: String) -> StoreResult<()> {
        let mut conn = self.manager().await?;
        redis::cmd("PUBLISH")
            .arg(topic)
            .arg(payload)
            .query_async::<()>(&mut conn)
            .await
            .map_err(Error::Redis)?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> StoreResult<MessageStream> {
        let client = Client::open(self.connection_info()?).map_err(Error::Redis)?;
        let mut pubsub = client.get_async_pubsub().await.map_err(Error::Redis)?;
        pubsub.subscribe(topic).await.map_err(Error::Redis)?;
        let messages = pubsub
            .into_on_message()
            .filter_map(|message| async move { message.get_payload::<String>().ok() });
        Ok(messages.boxed())
    }
}
