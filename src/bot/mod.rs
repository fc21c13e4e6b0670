// bot/mod.rs

// Exported functions
pub use self::heartrate::run_heart_rate_feed;

// Exported structs and types
pub use self::commands::{Command, CommandRouter, Services, LEADER};
pub use self::dispatcher::{
    BotError, ChatSender, Dispatcher, HandlerResult, LogSender, Observer, ObserverId,
    SingletonKind,
};
pub use self::market::HeartStockMarket;
pub use self::message::{ChatMessage, ChatUser, Role};
pub use self::processor::Economy;

// Declare submodules
pub mod api;
pub mod bus;
pub mod clock;
pub mod commands;
pub mod constants;
pub mod dispatcher;
pub mod handler;
pub mod heartrate;
pub mod ledger;
pub mod market;
pub mod message;
pub mod observer;
pub mod processor;
pub mod redis;
