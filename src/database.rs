use crate::prelude::*;
use crate::event_log::TIMESTAMP_FORMAT;

use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelData {
    /// Block average in watts.
    Reading(i64),
    Shutdown,
}

pub type Sender = broadcast::Sender<ChannelData>;
pub type Receiver = broadcast::Receiver<ChannelData>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct StoredReading {
    pub timestamp: String,
    pub value: i64,
}

#[derive(Clone, Debug)]
pub struct Database {
    url: String,
    channels: Channels,
    pool: Arc<RwLock<Option<SqlitePool>>>,
}

impl Database {
    pub fn new(url: &str, channels: Channels) -> Self {
        Self {
            url: url.to_string(),
            channels,
            pool: Arc::new(RwLock::new(None)),
        }
    }

    /// Connects and brings the schema up to date.
    pub async fn open(&self) -> Result<()> {
        info!("initializing database at {}", self.url);

        self.connect().await?;
        self.migrate().await
    }

    /// Stores every reading that arrives on `receiver` until a `Shutdown` is
    /// received. The database must already be open.
    pub async fn start(&self, receiver: Receiver) -> Result<()> {
        self.connection()?;
        self.inserter(receiver).await?;

        info!("database loop exiting");

        Ok(())
    }

    pub fn stop(&self) {
        let _ = self.channels.to_database.send(ChannelData::Shutdown);
    }

    pub async fn connect(&self) -> Result<()> {
        let options = SqliteConnectOptions::from_str(&self.url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect_with(options)
            .await?;
        *self
            .pool
            .write()
            .map_err(|_| anyhow!("Failed to acquire write lock"))? = Some(pool);
        Ok(())
    }

    pub fn connection(&self) -> Result<SqlitePool> {
        match &*self
            .pool
            .read()
            .map_err(|_| anyhow!("Failed to acquire read lock"))?
        {
            Some(pool) => Ok(pool.clone()),
            None => Err(crate::file_error!("database {} not connected", self.url)),
        }
    }

    pub async fn migrate(&self) -> Result<()> {
        let pool = self.connection()?;
        sqlx::migrate!("db/migrations").run(&pool).await?;
        Ok(())
    }

    async fn inserter(&self, mut receiver: Receiver) -> Result<()> {
        use broadcast::error::RecvError;

        loop {
            match receiver.recv().await {
                Ok(ChannelData::Shutdown) | Err(RecvError::Closed) => break,
                Ok(ChannelData::Reading(value)) => {
                    let mut retry_count = 0;
                    let max_retries = 3;
                    let mut backoff = 1;

                    while retry_count < max_retries {
                        match self.insert_reading(value).await {
                            Ok(_) => break,
                            Err(err) => {
                                error!("INSERT failed: {:?} - retrying in {}s", err, backoff);
                                tokio::time::sleep(std::time::Duration::from_secs(backoff)).await;
                                retry_count += 1;
                                backoff *= 2;
                            }
                        }
                    }

                    if retry_count == max_retries {
                        error!("Failed to insert reading {} after {} retries", value, max_retries);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("database fell behind, {} readings dropped", skipped);
                }
            }
        }

        Ok(())
    }

    pub async fn insert_reading(&self, value: i64) -> Result<()> {
        let pool = self.connection()?;
        let timestamp = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();

        sqlx::query("INSERT INTO readings (timestamp, value) VALUES (?, ?)")
            .bind(timestamp)
            .bind(value)
            .execute(&pool)
            .await?;

        debug!("stored {} W", value);
        Ok(())
    }

    /// The newest `limit` readings, oldest first. A `limit` of zero or less
    /// returns everything.
    pub async fn fetch_recent(&self, limit: i64) -> Result<Vec<StoredReading>> {
        let pool = self.connection()?;

        let rows = if limit > 0 {
            sqlx::query_as::<_, StoredReading>(
                "SELECT timestamp, value FROM readings
                 WHERE ROWID > (SELECT MAX(ROWID) FROM readings) - ?
                 ORDER BY ROWID",
            )
            .bind(limit)
            .fetch_all(&pool)
            .await?
        } else {
            sqlx::query_as::<_, StoredReading>(
                "SELECT timestamp, value FROM readings ORDER BY ROWID",
            )
            .fetch_all(&pool)
            .await?
        };

        Ok(rows)
    }

    /// Closing an unconnected or already closed database does nothing.
    pub async fn close(&self) -> Result<()> {
        let pool = self
            .pool
            .write()
            .map_err(|_| anyhow!("Failed to acquire write lock"))?
            .take();

        if let Some(pool) = pool {
            pool.close().await;
            info!("database {} closed", self.url);
        }

        Ok(())
    }
}
