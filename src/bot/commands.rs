use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::api::AttachmentStore;
use super::bus::NotificationBus;
use super::clock::Clock;
use super::constants::COMMAND_COOLDOWN;
use super::dispatcher::{BotError, Dispatcher, HandlerResult, Observer};
use super::handler::{
    CancelCommand, CaptchaCommand, CloseMarketCommand, DisableCommand, GrantCommand,
    InvestCommand, PointsCommand, PollCommand, PortfolioCommand, SellAllCommand,
    ShowImageCommand, TransferCommand, UninvestCommand,
};
use super::market::HeartStockMarket;
use super::message::ChatMessage;
use super::processor::Economy;

/* The command router.
 * An observer that matches the first token of a message against a fixed
 * table and runs the handler. A subset of commands shares one cooldown
 * bucket; attempts inside the window are dropped without a reply. Handler
 * errors stop here: one bad handler must never halt dispatch for the
 * messages behind it.
 */

pub const LEADER: char = '%';

#[async_trait]
pub trait Command: Send + Sync {
    async fn process_command_message(
        &self,
        bot: &Dispatcher,
        message: &ChatMessage,
    ) -> HandlerResult;
}

/* Capacity-one token bucket shared by the gated commands: one firing per
 * cooldown window, everything else inside the window is suppressed.
 */
pub struct Cooldown {
    clock: Arc<dyn Clock>,
    window: Duration,
    last_fired: Mutex<Option<Instant>>,
}

impl Cooldown {
    pub fn new(clock: Arc<dyn Clock>, window: Duration) -> Self {
        Cooldown {
            clock,
            window,
            last_fired: Mutex::new(None),
        }
    }

    pub fn try_fire(&self) -> bool {
        let now = self.clock.now();
        let mut last = self.last_fired.lock().unwrap();
        if let Some(last_fired) = *last {
            if now < last_fired + self.window {
                return false;
            }
        }
        *last = Some(now);
        true
    }
}

// Everything the handlers need from the outside world.
pub struct Services {
    pub economy: Arc<Economy>,
    pub market: Arc<HeartStockMarket>,
    pub bus: Arc<dyn NotificationBus>,
    pub attachments: Arc<dyn AttachmentStore>,
    // Extra users allowed to approve purchase requests, besides mods and
    // the broadcaster.
    pub approvers: Vec<String>,
}

struct CommandEntry {
    handler: Box<dyn Command>,
    gated: bool,
}

pub struct CommandRouter {
    commands: HashMap<&'static str, CommandEntry>,
    cooldown: Cooldown,
}

impl CommandRouter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        CommandRouter {
            commands: HashMap::new(),
            cooldown: Cooldown::new(clock, COMMAND_COOLDOWN),
        }
    }

    pub fn register(mut self, token: &'static str, handler: impl Command + 'static) -> Self {
        self.commands.insert(
            token,
            CommandEntry {
                handler: Box::new(handler),
                gated: false,
            },
        );
        self
    }

    pub fn register_gated(mut self, token: &'static str, handler: impl Command + 'static) -> Self {
        self.commands.insert(
            token,
            CommandEntry {
                handler: Box::new(handler),
                gated: true,
            },
        );
        self
    }

    // The full production command table.
    pub fn standard(clock: Arc<dyn Clock>, services: Services) -> Self {
        let Services {
            economy,
            market,
            bus,
            attachments,
            approvers,
        } = services;

        Self::new(clock)
            .register("%points", PointsCommand::new(economy.clone()))
            .register("%transfer", TransferCommand::new(economy.clone()))
            .register("%grant", GrantCommand::new(economy.clone()))
            .register("%invest", InvestCommand::new(economy.clone(), market.clone()))
            .register(
                "%uninvest",
                UninvestCommand::new(economy.clone(), market.clone()),
            )
            .register(
                "%sellall",
                SellAllCommand::new(economy.clone(), market.clone()),
            )
            .register("%portfolio", PortfolioCommand::new(market.clone()))
            .register(
                "%closemarket",
                CloseMarketCommand::new(economy.clone(), market),
            )
            .register("%poll", PollCommand)
            .register("%captcha", CaptchaCommand::new(economy.clone()))
            .register_gated(
                "%showimage",
                ShowImageCommand::new(economy.clone(), attachments, approvers.clone()),
            )
            .register_gated(
                "%disable",
                DisableCommand::new(economy, bus.clone(), approvers),
            )
            .register_gated("%cancel", CancelCommand::new(bus))
    }
}

#[async_trait]
impl Observer for CommandRouter {
    async fn on_message(&self, bot: &Dispatcher, message: &ChatMessage) {
        let token = message.first_token();
        if !token.starts_with(LEADER) {
            return;
        }
        let entry = match self.commands.get(token.as_str()) {
            Some(entry) => entry,
            None => return,
        };

        if entry.gated && !self.cooldown.try_fire() {
            log::debug!("dropping {token} from {}: under cooldown", message.user.name);
            return;
        }

        match entry.handler.process_command_message(bot, message).await {
            Ok(()) => {}
            // User-facing failures are reported inline; the rest only logged.
            Err(BotError::UserError(text)) => bot.send_message_as_user(&text).await,
            Err(BotError::MarketError(err)) => bot.send_message_as_user(&err.to_string()).await,
            Err(err) => log::error!("{token} from {} failed: {err}", message.user.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::{Command, CommandRouter, Cooldown};
    use crate::bot::clock::ManualClock;
    use crate::bot::dispatcher::{
        BotError, Dispatcher, HandlerResult, Observer, RecordingSender,
    };
    use crate::bot::ledger::LedgerError;
    use crate::bot::message::{ChatMessage, ChatUser};

    struct Counting {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Command for Counting {
        async fn process_command_message(
            &self,
            _bot: &Dispatcher,
            _message: &ChatMessage,
        ) -> HandlerResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing {
        error: fn() -> BotError,
    }

    #[async_trait]
    impl Command for Failing {
        async fn process_command_message(
            &self,
            _bot: &Dispatcher,
            _message: &ChatMessage,
        ) -> HandlerResult {
            Err((self.error)())
        }
    }

    fn msg(text: &str) -> ChatMessage {
        ChatMessage::new("chan", ChatUser::new("1", "alice", []), text)
    }

    #[test]
    fn test_cooldown_refills_after_window() {
        let clock = Arc::new(ManualClock::new());
        let cooldown = Cooldown::new(clock.clone(), Duration::from_secs(10));

        assert!(cooldown.try_fire());
        assert!(!cooldown.try_fire());

        clock.advance(Duration::from_secs(9));
        assert!(!cooldown.try_fire());

        clock.advance(Duration::from_secs(1));
        assert!(cooldown.try_fire());
    }

    #[tokio::test]
    async fn test_routes_by_first_token() {
        let clock = Arc::new(ManualClock::new());
        let bot = Dispatcher::new("chan", Arc::new(RecordingSender::new()), clock.clone());
        let calls = Arc::new(AtomicU32::new(0));
        let router =
            CommandRouter::new(clock).register("%ping", Counting { calls: calls.clone() });

        router.on_message(&bot, &msg("%ping")).await;
        router.on_message(&bot, &msg("%PING with args")).await;
        router.on_message(&bot, &msg("%pong")).await;
        router.on_message(&bot, &msg("not a command")).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gated_commands_share_one_bucket() {
        let clock = Arc::new(ManualClock::new());
        let bot = Dispatcher::new("chan", Arc::new(RecordingSender::new()), clock.clone());
        let first = Arc::new(AtomicU32::new(0));
        let second = Arc::new(AtomicU32::new(0));
        let router = CommandRouter::new(clock.clone())
            .register_gated("%one", Counting { calls: first.clone() })
            .register_gated("%two", Counting { calls: second.clone() });

        router.on_message(&bot, &msg("%one")).await;
        // Different gated command, same bucket: silently dropped.
        router.on_message(&bot, &msg("%two")).await;
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);

        clock.advance(Duration::from_secs(11));
        router.on_message(&bot, &msg("%two")).await;
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ungated_commands_ignore_the_bucket() {
        let clock = Arc::new(ManualClock::new());
        let bot = Dispatcher::new("chan", Arc::new(RecordingSender::new()), clock.clone());
        let gated = Arc::new(AtomicU32::new(0));
        let free = Arc::new(AtomicU32::new(0));
        let router = CommandRouter::new(clock)
            .register_gated("%rare", Counting { calls: gated.clone() })
            .register("%often", Counting { calls: free.clone() });

        router.on_message(&bot, &msg("%rare")).await;
        router.on_message(&bot, &msg("%often")).await;
        router.on_message(&bot, &msg("%often")).await;
        assert_eq!(free.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_user_errors_are_replied_inline() {
        let clock = Arc::new(ManualClock::new());
        let sender = Arc::new(RecordingSender::new());
        let bot = Dispatcher::new("chan", sender.clone(), clock.clone());
        let router = CommandRouter::new(clock).register(
            "%fail",
            Failing {
                error: || BotError::UserError("alice can't afford that!".to_string()),
            },
        );

        router.on_message(&bot, &msg("%fail")).await;
        assert_eq!(sender.sent(), vec!["alice can't afford that!"]);
    }

    #[tokio::test]
    async fn test_collaborator_errors_never_reach_chat() {
        let clock = Arc::new(ManualClock::new());
        let sender = Arc::new(RecordingSender::new());
        let bot = Dispatcher::new("chan", sender.clone(), clock.clone());
        let router = CommandRouter::new(clock).register(
            "%fail",
            Failing {
                error: || BotError::LedgerError(LedgerError::Unavailable("redis down".to_string())),
            },
        );

        router.on_message(&bot, &msg("%fail")).await;
        assert!(sender.sent().is_empty());
    }
}
