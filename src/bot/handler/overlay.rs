use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::utils::{display_points, extract_tag};
use crate::bot::api::AttachmentStore;
use crate::bot::bus::{BusMessage, NotificationBus};
use crate::bot::commands::Command;
use crate::bot::constants::{
    AUTHORIZATION_PERIOD, CAPTCHA_POINTS, DISABLE_COST, SHOW_IMAGE_COST, SHOW_IMAGE_PERIOD,
};
use crate::bot::dispatcher::{BotError, Dispatcher, HandlerResult, SingletonKind};
use crate::bot::message::ChatMessage;
use crate::bot::observer::{ApprovalAction, ApprovalObserver, CaptchaObserver, PollObserver};
use crate::bot::processor::Economy;

/* Overlay commands. These spawn the stateful observers (polls, captchas,
 * approval requests) and forward side effects to the notification bus.
 * Expensive actions are approved by a moderator before points move.
 */

pub struct PollCommand;

#[async_trait]
impl Command for PollCommand {
    async fn process_command_message(
        &self,
        bot: &Dispatcher,
        message: &ChatMessage,
    ) -> HandlerResult {
        if !message.user.is_elevated() {
            return Ok(());
        }

        let mut parts = message.rest().split(';').map(str::trim);
        let title = parts.next().unwrap_or("").to_string();
        let seconds = parts.next().and_then(|raw| raw.parse::<u64>().ok());
        let options: Vec<String> = parts
            .filter(|option| !option.is_empty())
            .map(str::to_string)
            .collect();

        let seconds = match seconds {
            Some(seconds) if !title.is_empty() && seconds > 0 && options.len() >= 2 => seconds,
            _ => {
                return Err(BotError::UserError(
                    "Usage: %poll <title>;<seconds>;<option>;<option>;...".to_string(),
                ));
            }
        };

        let listing = options
            .iter()
            .enumerate()
            .map(|(index, option)| format!("{}: {option}", index + 1))
            .collect::<Vec<_>>()
            .join(", ");

        PollObserver::spawn(bot, &title, Duration::from_secs(seconds), options);
        bot.send_message_as_user(&format!(
            "Poll started: {title} ({listing}). Vote with %vote <number>!"
        ))
        .await;
        Ok(())
    }
}

pub struct CaptchaCommand {
    economy: Arc<Economy>,
}

impl CaptchaCommand {
    pub fn new(economy: Arc<Economy>) -> Self {
        CaptchaCommand { economy }
    }
}

#[async_trait]
impl Command for CaptchaCommand {
    async fn process_command_message(
        &self,
        bot: &Dispatcher,
        message: &ChatMessage,
    ) -> HandlerResult {
        if !message.user.is_broadcaster() {
            return Ok(());
        }

        let captcha = CaptchaObserver::spawn(bot, self.economy.clone());
        // The answer only reaches chat through the overlay render.
        log::info!("captcha spawned with answer {}", captcha.value());
        bot.send_message_as_user(&format!(
            "Captcha up! First to type it wins {CAPTCHA_POINTS:.0} points."
        ))
        .await;
        Ok(())
    }
}

pub struct ShowImageCommand {
    economy: Arc<Economy>,
    attachments: Arc<dyn AttachmentStore>,
    approvers: Vec<String>,
}

impl ShowImageCommand {
    pub fn new(
        economy: Arc<Economy>,
        attachments: Arc<dyn AttachmentStore>,
        approvers: Vec<String>,
    ) -> Self {
        ShowImageCommand {
            economy,
            attachments,
            approvers,
        }
    }
}

#[async_trait]
impl Command for ShowImageCommand {
    async fn process_command_message(
        &self,
        bot: &Dispatcher,
        message: &ChatMessage,
    ) -> HandlerResult {
        let tag = extract_tag(message.rest()).ok_or_else(|| {
            BotError::UserError("Usage: %showimage {tag}".to_string())
        })?;
        if !self.attachments.tag_exists(&tag).await {
            return Err(BotError::UserError(format!(
                "No attachment registered for {{{tag}}}."
            )));
        }

        let user = message.user.name.to_lowercase();
        if self.economy.balance_of(&user).await < SHOW_IMAGE_COST {
            return Err(BotError::UserError(format!("{user} can't afford that!")));
        }

        // Points only move once a moderator approves; the balance may have
        // changed by then, so the charge is re-checked inside the callback.
        let economy = self.economy.clone();
        let sender = bot.sender();
        let channel = bot.channel_id().to_string();
        let approve_user = user.clone();
        let approve_tag = tag.clone();
        let on_approve: ApprovalAction = Box::pin(async move {
            match economy
                .check_cost_add_if_enough(&approve_user, -SHOW_IMAGE_COST)
                .await
            {
                Ok(_) => {
                    let text = format!(
                        "{approve_user} paid {} points to show {{{approve_tag}}}!",
                        display_points(SHOW_IMAGE_COST)
                    );
                    if let Err(err) = sender.send_message(&channel, &text).await {
                        log::error!("failed to announce approval: {err}");
                    }
                }
                Err(err) => log::warn!("approved purchase no longer affordable: {err}"),
            }
        });

        let deny_sender = bot.sender();
        let deny_channel = bot.channel_id().to_string();
        let deny_user = user.clone();
        let on_deny: ApprovalAction = Box::pin(async move {
            let text = format!("{deny_user}'s image request was denied.");
            if let Err(err) = deny_sender.send_message(&deny_channel, &text).await {
                log::error!("failed to announce denial: {err}");
            }
        });

        ApprovalObserver::spawn(
            bot,
            SingletonKind::ShowImage,
            self.approvers.clone(),
            SHOW_IMAGE_PERIOD,
            on_approve,
            Some(on_deny),
        );
        bot.send_message_as_user(&format!(
            "{user} wants to show {{{tag}}} for {} points. Mods, approve or deny?",
            display_points(SHOW_IMAGE_COST)
        ))
        .await;
        Ok(())
    }
}

pub struct DisableCommand {
    economy: Arc<Economy>,
    bus: Arc<dyn NotificationBus>,
    approvers: Vec<String>,
}

impl DisableCommand {
    pub fn new(
        economy: Arc<Economy>,
        bus: Arc<dyn NotificationBus>,
        approvers: Vec<String>,
    ) -> Self {
        DisableCommand {
            economy,
            bus,
            approvers,
        }
    }
}

#[async_trait]
impl Command for DisableCommand {
    async fn process_command_message(
        &self,
        bot: &Dispatcher,
        message: &ChatMessage,
    ) -> HandlerResult {
        let duration = message
            .rest()
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|seconds| *seconds > 0)
            .ok_or_else(|| BotError::UserError("Usage: %disable <seconds>".to_string()))?;

        let user = message.user.name.to_lowercase();
        if self.economy.balance_of(&user).await < DISABLE_COST {
            return Err(BotError::UserError(format!("{user} can't afford that!")));
        }

        let economy = self.economy.clone();
        let bus = self.bus.clone();
        let approve_user = user.clone();
        let on_approve: ApprovalAction = Box::pin(async move {
            match economy
                .check_cost_add_if_enough(&approve_user, -DISABLE_COST)
                .await
            {
                Ok(_) => {
                    if let Err(err) = bus.forward(&BusMessage::Disable { duration }).await {
                        log::error!("failed to forward disable: {err}");
                    }
                }
                Err(err) => log::warn!("approved disable no longer affordable: {err}"),
            }
        });

        ApprovalObserver::spawn(
            bot,
            SingletonKind::Approval,
            self.approvers.clone(),
            AUTHORIZATION_PERIOD,
            on_approve,
            None,
        );
        bot.send_message_as_user(&format!(
            "{user} wants to disable the overlay for {duration}s ({} points). Approve or deny?",
            display_points(DISABLE_COST)
        ))
        .await;
        Ok(())
    }
}

pub struct CancelCommand {
    bus: Arc<dyn NotificationBus>,
}

impl CancelCommand {
    pub fn new(bus: Arc<dyn NotificationBus>) -> Self {
        CancelCommand { bus }
    }
}

#[async_trait]
impl Command for CancelCommand {
    async fn process_command_message(
        &self,
        _bot: &Dispatcher,
        message: &ChatMessage,
    ) -> HandlerResult {
        if !message.user.is_mod() && !message.user.is_broadcaster() {
            return Ok(());
        }
        self.bus.forward(&BusMessage::Cancel).await?;
        Ok(())
    }
}
