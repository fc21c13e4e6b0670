use std::env;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use streamscribe::bot::api::{
    AttachmentStore, HttpAttachmentStore, HttpLedger, PermissiveAttachmentStore,
};
use streamscribe::bot::bus::LogBus;
use streamscribe::bot::clock::SystemClock;
use streamscribe::bot::ledger::{Ledger, MemoryLedger};
use streamscribe::bot::redis::{RedisHandle, RedisLedger, REDIS_URL_DEFAULT};
use streamscribe::bot::{
    run_heart_rate_feed, ChatMessage, ChatUser, CommandRouter, Dispatcher, Economy,
    HeartStockMarket, LogSender, Role, Services,
};

/* Local harness: reads chat lines from stdin and feeds them through the
 * dispatcher. Lines look like "name message...". A leading '@' on the name
 * marks a moderator; the name matching STREAMSCRIBE_CHANNEL is the
 * broadcaster.
 */

// Ledger backend, in order of preference: points service, redis, in-memory.
fn select_ledger() -> Arc<dyn Ledger> {
    if let Ok(url) = env::var("POINTS_URL") {
        log::info!("using points service at {url}");
        return Arc::new(HttpLedger::new(&url));
    }
    let redis_url = env::var("REDIS_URL").unwrap_or_else(|_| REDIS_URL_DEFAULT.to_string());
    match RedisHandle::open(&redis_url) {
        Ok(handle) => {
            log::info!("using redis ledger at {redis_url}");
            Arc::new(RedisLedger::new(handle))
        }
        Err(err) => {
            log::warn!("redis unavailable ({err}), falling back to in-memory ledger");
            Arc::new(MemoryLedger::new())
        }
    }
}

fn select_attachments() -> Arc<dyn AttachmentStore> {
    match env::var("ATTACHMENTS_URL") {
        Ok(url) => Arc::new(HttpAttachmentStore::new(&url)),
        Err(_) => Arc::new(PermissiveAttachmentStore),
    }
}

fn parse_line(channel: &str, line: &str) -> Option<ChatMessage> {
    let (name, text) = line.trim().split_once(char::is_whitespace)?;
    let (name, roles) = match name.strip_prefix('@') {
        Some(name) => (name, vec![Role::Moderator]),
        None if name.eq_ignore_ascii_case(channel) => (name, vec![Role::Broadcaster]),
        None => (name, vec![]),
    };
    Some(ChatMessage::new(
        channel,
        ChatUser::new(name, name, roles),
        text,
    ))
}

#[tokio::main]
pub async fn main() {
    dotenv::dotenv().ok();
    pretty_env_logger::init();
    log::info!("Starting StreamScribe bot...");

    let channel = env::var("STREAMSCRIBE_CHANNEL").unwrap_or_else(|_| "local".to_string());
    let approvers: Vec<String> = env::var("STREAMSCRIBE_APPROVERS")
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let economy = Arc::new(Economy::new(select_ledger()));
    let market = Arc::new(HeartStockMarket::default());
    let clock = Arc::new(SystemClock);

    let bot = Arc::new(Dispatcher::new(&channel, Arc::new(LogSender), clock.clone()));
    bot.add_observer(Arc::new(CommandRouter::standard(
        clock,
        Services {
            economy,
            market: market.clone(),
            bus: Arc::new(LogBus),
            attachments: select_attachments(),
            approvers,
        },
    )));

    let timer_bot = bot.clone();
    tokio::spawn(async move { timer_bot.run_timers().await });

    if let Ok(url) = env::var("HEART_RATE_URL") {
        let feed_market = market.clone();
        tokio::spawn(async move { run_heart_rate_feed(&url, feed_market).await });
    } else {
        log::warn!("HEART_RATE_URL not set, the stock market has no feed");
    }

    log::info!("StreamScribe bot started successfully!");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match parse_line(&channel, &line) {
            Some(message) => bot.dispatch(&message).await,
            None => log::debug!("ignoring malformed line"),
        }
    }
}
