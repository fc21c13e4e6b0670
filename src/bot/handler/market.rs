use std::sync::Arc;

use async_trait::async_trait;

use super::utils::{display_points, parse_amount};
use crate::bot::commands::Command;
use crate::bot::dispatcher::{Dispatcher, HandlerResult};
use crate::bot::market::HeartStockMarket;
use crate::bot::message::ChatMessage;
use crate::bot::processor::Economy;

/* Stock market commands. Points move between the ledger and the market:
 * investing debits the ledger first, exits credit it back. Every failure
 * leaves both sides untouched, except a market rejection after a successful
 * debit, which is refunded on the spot.
 */

pub struct InvestCommand {
    economy: Arc<Economy>,
    market: Arc<HeartStockMarket>,
}

impl InvestCommand {
    pub fn new(economy: Arc<Economy>, market: Arc<HeartStockMarket>) -> Self {
        InvestCommand { economy, market }
    }
}

#[async_trait]
impl Command for InvestCommand {
    async fn process_command_message(
        &self,
        bot: &Dispatcher,
        message: &ChatMessage,
    ) -> HandlerResult {
        let amount = parse_amount(message.rest())?;
        let user = message.user.name.to_lowercase();

        self.economy.check_cost_add_if_enough(&user, -amount).await?;
        if let Err(err) = self.market.invest(&user, amount) {
            // The debit went through but the market refused; hand it back.
            self.economy.payout(&user, amount).await;
            return Err(err.into());
        }

        let rate = self.market.latest_heart_rate().unwrap_or(0.0);
        bot.send_message_as_user(&format!(
            "{user} invested {} points at {rate:.0} bpm!",
            display_points(amount)
        ))
        .await;
        Ok(())
    }
}

pub struct UninvestCommand {
    economy: Arc<Economy>,
    market: Arc<HeartStockMarket>,
}

impl UninvestCommand {
    pub fn new(economy: Arc<Economy>, market: Arc<HeartStockMarket>) -> Self {
        UninvestCommand { economy, market }
    }
}

#[async_trait]
impl Command for UninvestCommand {
    async fn process_command_message(
        &self,
        bot: &Dispatcher,
        message: &ChatMessage,
    ) -> HandlerResult {
        let amount = parse_amount(message.rest())?;
        let user = message.user.name.to_lowercase();

        let withdrawn = self.market.uninvest(&user, amount)?;
        self.economy.payout(&user, withdrawn).await;
        bot.send_message_as_user(&format!(
            "{user} withdrew {} points from the market.",
            display_points(withdrawn)
        ))
        .await;
        Ok(())
    }
}

pub struct SellAllCommand {
    economy: Arc<Economy>,
    market: Arc<HeartStockMarket>,
}

impl SellAllCommand {
    pub fn new(economy: Arc<Economy>, market: Arc<HeartStockMarket>) -> Self {
        SellAllCommand { economy, market }
    }
}

#[async_trait]
impl Command for SellAllCommand {
    async fn process_command_message(
        &self,
        bot: &Dispatcher,
        message: &ChatMessage,
    ) -> HandlerResult {
        let user = message.user.name.to_lowercase();
        let value = self.market.uninvest_all(&user);
        if value <= 0.0 {
            bot.send_message_as_user(&format!("{user} has nothing in the market."))
                .await;
            return Ok(());
        }

        self.economy.payout(&user, value).await;
        bot.send_message_as_user(&format!(
            "{user} cashed out {} points!",
            display_points(value)
        ))
        .await;
        Ok(())
    }
}

pub struct PortfolioCommand {
    market: Arc<HeartStockMarket>,
}

impl PortfolioCommand {
    pub fn new(market: Arc<HeartStockMarket>) -> Self {
        PortfolioCommand { market }
    }
}

#[async_trait]
impl Command for PortfolioCommand {
    async fn process_command_message(
        &self,
        bot: &Dispatcher,
        message: &ChatMessage,
    ) -> HandlerResult {
        let user = message.user.name.to_lowercase();
        match self.market.price(&user) {
            Some(value) => {
                bot.send_message_as_user(&format!(
                    "{user}'s position is worth {} points.",
                    display_points(value)
                ))
                .await;
            }
            None => {
                bot.send_message_as_user(&format!("{user} has no open position."))
                    .await;
            }
        }
        Ok(())
    }
}

pub struct CloseMarketCommand {
    economy: Arc<Economy>,
    market: Arc<HeartStockMarket>,
}

impl CloseMarketCommand {
    pub fn new(economy: Arc<Economy>, market: Arc<HeartStockMarket>) -> Self {
        CloseMarketCommand { economy, market }
    }
}

#[async_trait]
impl Command for CloseMarketCommand {
    async fn process_command_message(
        &self,
        bot: &Dispatcher,
        message: &ChatMessage,
    ) -> HandlerResult {
        if !message.user.is_broadcaster() {
            return Ok(());
        }

        let returns = self.market.close()?;
        let paid = returns.len();
        for user_return in returns {
            self.economy
                .payout(&user_return.user, user_return.payout)
                .await;
        }
        bot.send_message_as_user(&format!(
            "The stock market has closed! {paid} positions paid out."
        ))
        .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{
        CloseMarketCommand, InvestCommand, PortfolioCommand, SellAllCommand, UninvestCommand,
    };
    use crate::bot::clock::ManualClock;
    use crate::bot::commands::Command;
    use crate::bot::dispatcher::{BotError, Dispatcher, RecordingSender};
    use crate::bot::ledger::MemoryLedger;
    use crate::bot::market::{HeartStockMarket, MarketError};
    use crate::bot::message::{ChatMessage, ChatUser, Role};
    use crate::bot::processor::Economy;

    struct Fixture {
        bot: Dispatcher,
        sender: Arc<RecordingSender>,
        economy: Arc<Economy>,
        market: Arc<HeartStockMarket>,
    }

    fn fixture_with(user: &str, balance: f64) -> Fixture {
        let sender = Arc::new(RecordingSender::new());
        Fixture {
            bot: Dispatcher::new("chan", sender.clone(), Arc::new(ManualClock::new())),
            sender,
            economy: Arc::new(Economy::new(Arc::new(MemoryLedger::with_balance(
                user, balance,
            )))),
            market: Arc::new(HeartStockMarket::default()),
        }
    }

    fn from(name: &str, text: &str) -> ChatMessage {
        ChatMessage::new("chan", ChatUser::new("1", name, []), text)
    }

    fn from_broadcaster(text: &str) -> ChatMessage {
        ChatMessage::new(
            "chan",
            ChatUser::new("0", "streamer", [Role::Broadcaster]),
            text,
        )
    }

    #[tokio::test]
    async fn test_invest_debits_ledger_and_opens_position() {
        let f = fixture_with("alice", 100.0);
        f.market.push_sample(80.0);
        let command = InvestCommand::new(f.economy.clone(), f.market.clone());

        command
            .process_command_message(&f.bot, &from("alice", "%invest 60"))
            .await
            .unwrap();
        assert_eq!(f.economy.balance_of("alice").await, 40.0);
        assert_eq!(f.market.price("alice"), Some(60.0));
        assert_eq!(f.sender.sent(), vec!["alice invested 60 points at 80 bpm!"]);
    }

    #[tokio::test]
    async fn test_invest_without_heart_rate_refunds() {
        let f = fixture_with("alice", 100.0);
        let command = InvestCommand::new(f.economy.clone(), f.market.clone());

        let err = command
            .process_command_message(&f.bot, &from("alice", "%invest 60"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BotError::MarketError(MarketError::NoHeartRate)
        ));
        // The debit was rolled back.
        assert_eq!(f.economy.balance_of("alice").await, 100.0);
    }

    #[tokio::test]
    async fn test_invest_beyond_balance_touches_nothing() {
        let f = fixture_with("alice", 10.0);
        f.market.push_sample(80.0);
        let command = InvestCommand::new(f.economy.clone(), f.market.clone());

        let err = command
            .process_command_message(&f.bot, &from("alice", "%invest 60"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("can't afford"));
        assert_eq!(f.economy.balance_of("alice").await, 10.0);
        assert_eq!(f.market.position("alice"), None);
    }

    #[tokio::test]
    async fn test_uninvest_credits_ledger() {
        let f = fixture_with("alice", 100.0);
        f.market.push_sample(80.0);
        let invest = InvestCommand::new(f.economy.clone(), f.market.clone());
        invest
            .process_command_message(&f.bot, &from("alice", "%invest 100"))
            .await
            .unwrap();

        let command = UninvestCommand::new(f.economy.clone(), f.market.clone());
        command
            .process_command_message(&f.bot, &from("alice", "%uninvest 30"))
            .await
            .unwrap();
        assert_eq!(f.economy.balance_of("alice").await, 30.0);
        assert_eq!(f.market.price("alice"), Some(70.0));
    }

    #[tokio::test]
    async fn test_sellall_is_the_full_exit() {
        let f = fixture_with("alice", 100.0);
        f.market.push_sample(80.0);
        let invest = InvestCommand::new(f.economy.clone(), f.market.clone());
        invest
            .process_command_message(&f.bot, &from("alice", "%invest 100"))
            .await
            .unwrap();

        // Withdrawing the full stake through %uninvest is rejected.
        let uninvest = UninvestCommand::new(f.economy.clone(), f.market.clone());
        let err = uninvest
            .process_command_message(&f.bot, &from("alice", "%uninvest 100"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BotError::MarketError(MarketError::InsufficientFunds)
        ));

        let sellall = SellAllCommand::new(f.economy.clone(), f.market.clone());
        sellall
            .process_command_message(&f.bot, &from("alice", "%sellall"))
            .await
            .unwrap();
        assert_eq!(f.economy.balance_of("alice").await, 100.0);
        assert_eq!(f.market.position("alice"), None);
    }

    #[tokio::test]
    async fn test_portfolio_replies_for_both_cases() {
        let f = fixture_with("alice", 100.0);
        f.market.push_sample(80.0);
        let command = PortfolioCommand::new(f.market.clone());

        command
            .process_command_message(&f.bot, &from("alice", "%portfolio"))
            .await
            .unwrap();
        assert_eq!(f.sender.sent(), vec!["alice has no open position."]);

        f.market.invest("alice", 25.0).unwrap();
        command
            .process_command_message(&f.bot, &from("alice", "%portfolio"))
            .await
            .unwrap();
        assert_eq!(f.sender.sent()[1], "alice's position is worth 25 points.");
    }

    #[tokio::test]
    async fn test_closemarket_pays_everyone_once() {
        let f = fixture_with("alice", 0.0);
        f.market.push_sample(100.0);
        f.market.invest("alice", 40.0).unwrap();
        f.market.invest("bob", 10.0).unwrap();
        f.market.push_sample(200.0);

        let command = CloseMarketCommand::new(f.economy.clone(), f.market.clone());

        // Not the broadcaster: nothing happens.
        command
            .process_command_message(&f.bot, &from("mallory", "%closemarket"))
            .await
            .unwrap();
        assert!(!f.market.is_closed());

        command
            .process_command_message(&f.bot, &from_broadcaster("%closemarket"))
            .await
            .unwrap();
        assert_eq!(f.economy.balance_of("alice").await, 80.0);
        assert_eq!(f.economy.balance_of("bob").await, 20.0);
        assert!(f.market.is_closed());

        let err = command
            .process_command_message(&f.bot, &from_broadcaster("%closemarket"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BotError::MarketError(MarketError::MarketClosed)
        ));
    }
}
