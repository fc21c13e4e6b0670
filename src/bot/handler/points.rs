use std::sync::Arc;

use async_trait::async_trait;

use super::utils::{display_points, parse_amount, parse_signed_amount, parse_username};
use crate::bot::commands::Command;
use crate::bot::dispatcher::{BotError, Dispatcher, HandlerResult};
use crate::bot::message::ChatMessage;
use crate::bot::processor::Economy;

/* Point economy commands: balance lookup, viewer-to-viewer transfers, and
 * the broadcaster's administrative grant.
 */

pub struct PointsCommand {
    economy: Arc<Economy>,
}

impl PointsCommand {
    pub fn new(economy: Arc<Economy>) -> Self {
        PointsCommand { economy }
    }
}

#[async_trait]
impl Command for PointsCommand {
    async fn process_command_message(
        &self,
        bot: &Dispatcher,
        message: &ChatMessage,
    ) -> HandlerResult {
        let user = message.user.name.to_lowercase();
        let balance = self.economy.balance_of(&user).await;
        bot.send_message_as_user(&format!("{user} has {} points.", display_points(balance)))
            .await;
        Ok(())
    }
}

pub struct TransferCommand {
    economy: Arc<Economy>,
}

impl TransferCommand {
    pub fn new(economy: Arc<Economy>) -> Self {
        TransferCommand { economy }
    }
}

#[async_trait]
impl Command for TransferCommand {
    async fn process_command_message(
        &self,
        bot: &Dispatcher,
        message: &ChatMessage,
    ) -> HandlerResult {
        let mut args = message.rest().split_whitespace();
        let (recipient, amount) = match (args.next(), args.next()) {
            (Some(recipient), Some(amount)) => (parse_username(recipient), amount),
            _ => {
                return Err(BotError::UserError(
                    "Usage: %transfer <user> <amount>".to_string(),
                ))
            }
        };
        let amount = parse_amount(amount)?;
        let sender = message.user.name.to_lowercase();
        if recipient == sender {
            return Err(BotError::UserError(
                "You cannot transfer points to yourself.".to_string(),
            ));
        }

        self.economy.transfer(&sender, &recipient, amount).await?;
        bot.send_message_as_user(&format!(
            "{sender} sent {} points to {recipient}!",
            display_points(amount)
        ))
        .await;
        Ok(())
    }
}

pub struct GrantCommand {
    economy: Arc<Economy>,
}

impl GrantCommand {
    pub fn new(economy: Arc<Economy>) -> Self {
        GrantCommand { economy }
    }
}

#[async_trait]
impl Command for GrantCommand {
    async fn process_command_message(
        &self,
        bot: &Dispatcher,
        message: &ChatMessage,
    ) -> HandlerResult {
        // Administrative override; anyone else typing it is ignored outright.
        if !message.user.is_broadcaster() {
            return Ok(());
        }

        let mut args = message.rest().split_whitespace();
        let (target, value) = match (args.next(), args.next()) {
            (Some(target), Some(value)) => (parse_username(target), value),
            _ => {
                return Err(BotError::UserError(
                    "Usage: %grant <user> <amount>".to_string(),
                ))
            }
        };
        let value = parse_signed_amount(value)?;

        self.economy.grant(&target, value).await?;
        bot.send_message_as_user(&format!(
            "{target}'s points were set to {}.",
            display_points(value)
        ))
        .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{GrantCommand, PointsCommand, TransferCommand};
    use crate::bot::clock::ManualClock;
    use crate::bot::commands::Command;
    use crate::bot::dispatcher::{Dispatcher, RecordingSender};
    use crate::bot::ledger::MemoryLedger;
    use crate::bot::message::{ChatMessage, ChatUser, Role};
    use crate::bot::processor::Economy;

    struct Fixture {
        bot: Dispatcher,
        sender: Arc<RecordingSender>,
        economy: Arc<Economy>,
    }

    fn fixture_with(user: &str, balance: f64) -> Fixture {
        let sender = Arc::new(RecordingSender::new());
        Fixture {
            bot: Dispatcher::new("chan", sender.clone(), Arc::new(ManualClock::new())),
            sender,
            economy: Arc::new(Economy::new(Arc::new(MemoryLedger::with_balance(
                user, balance,
            )))),
        }
    }

    fn from(name: &str, text: &str) -> ChatMessage {
        ChatMessage::new("chan", ChatUser::new("1", name, []), text)
    }

    fn from_broadcaster(name: &str, text: &str) -> ChatMessage {
        ChatMessage::new("chan", ChatUser::new("0", name, [Role::Broadcaster]), text)
    }

    #[tokio::test]
    async fn test_points_reports_balance() {
        let f = fixture_with("alice", 120.0);
        let command = PointsCommand::new(f.economy.clone());
        command
            .process_command_message(&f.bot, &from("alice", "%points"))
            .await
            .unwrap();
        assert_eq!(f.sender.sent(), vec!["alice has 120 points."]);
    }

    #[tokio::test]
    async fn test_transfer_scenario() {
        let f = fixture_with("alice", 100.0);
        let command = TransferCommand::new(f.economy.clone());

        command
            .process_command_message(&f.bot, &from("alice", "%transfer bob 50"))
            .await
            .unwrap();
        assert_eq!(f.economy.balance_of("alice").await, 50.0);
        assert_eq!(f.economy.balance_of("bob").await, 50.0);
        assert_eq!(f.sender.sent(), vec!["alice sent 50 points to bob!"]);

        // Overdraft: both balances untouched, exactly one error surfaced.
        let err = command
            .process_command_message(&f.bot, &from("alice", "%transfer bob 1000"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("can't afford"));
        assert_eq!(f.economy.balance_of("alice").await, 50.0);
        assert_eq!(f.economy.balance_of("bob").await, 50.0);
        assert_eq!(f.sender.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_transfer_argument_validation() {
        let f = fixture_with("alice", 100.0);
        let command = TransferCommand::new(f.economy.clone());

        for text in ["%transfer", "%transfer bob", "%transfer bob -5", "%transfer bob x"] {
            assert!(command
                .process_command_message(&f.bot, &from("alice", text))
                .await
                .is_err());
        }
        assert_eq!(f.economy.balance_of("alice").await, 100.0);
    }

    #[tokio::test]
    async fn test_grant_is_broadcaster_only() {
        let f = fixture_with("alice", 0.0);
        let command = GrantCommand::new(f.economy.clone());

        command
            .process_command_message(&f.bot, &from("mallory", "%grant mallory 9999"))
            .await
            .unwrap();
        assert_eq!(f.economy.balance_of("mallory").await, 0.0);
        assert!(f.sender.sent().is_empty());

        command
            .process_command_message(&f.bot, &from_broadcaster("streamer", "%grant bob -50"))
            .await
            .unwrap();
        assert_eq!(f.economy.balance_of("bob").await, -50.0);
    }
}
