use redis::aio::Connection;
use redis::{AsyncCommands, Client, RedisError, RedisResult};

pub const REDIS_URL_DEFAULT: &str = "redis://127.0.0.1/";

/* Thin handle over the Redis client. Connections are grabbed per operation;
 * the async client multiplexes them cheaply and nothing here may block the
 * event loop.
 */
pub struct RedisHandle {
    client: Client,
}

impl RedisHandle {
    pub fn open(url: &str) -> Result<Self, RedisError> {
        Ok(RedisHandle {
            client: Client::open(url)?,
        })
    }

    pub async fn connection(&self) -> Result<Connection, RedisError> {
        self.client.get_async_connection().await
    }

    // Tests connection to Redis
    pub async fn ping(&self) -> RedisResult<bool> {
        let mut con = self.connection().await?;
        let _: () = con.set("streamscribe:ping", 42).await?;
        let res: i32 = con.get("streamscribe:ping").await?;
        let _: () = con.del("streamscribe:ping").await?;
        Ok(res == 42)
    }
}
