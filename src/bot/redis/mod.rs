// Exported structs and types
pub use self::connect::{RedisHandle, REDIS_URL_DEFAULT};
pub use self::points::RedisLedger;

// Submodules
mod connect;
mod points;
