use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::bot::clock::TimerId;
use crate::bot::dispatcher::{Dispatcher, Observer, ObserverId, SingletonKind};
use crate::bot::message::ChatMessage;

/* Approval request.
 * Waits for a plain "approve" or "deny" from a moderator, the broadcaster,
 * or one of the explicitly authorized users. Resolving (either way, or by
 * timeout) unregisters the observer; the one-shot callbacks fire at most
 * once. NOTE: at any one point in time there is only one pending request per
 * kind; spawning a new one evicts the old, whose callbacks never fire.
 */

pub type ApprovalAction = BoxFuture<'static, ()>;

pub struct ApprovalObserver {
    kind: SingletonKind,
    auth_users: Vec<String>,
    on_approve: Mutex<Option<ApprovalAction>>,
    on_deny: Mutex<Option<ApprovalAction>>,
    id: OnceLock<ObserverId>,
    timer: OnceLock<TimerId>,
}

impl ApprovalObserver {
    pub fn spawn(
        bot: &Dispatcher,
        kind: SingletonKind,
        authorized_users: Vec<String>,
        period: Duration,
        on_approve: ApprovalAction,
        on_deny: Option<ApprovalAction>,
    ) -> Arc<Self> {
        let observer = Arc::new(ApprovalObserver {
            kind,
            auth_users: authorized_users
                .into_iter()
                .map(|user| user.to_lowercase())
                .collect(),
            on_approve: Mutex::new(Some(on_approve)),
            on_deny: Mutex::new(on_deny),
            id: OnceLock::new(),
            timer: OnceLock::new(),
        });

        let id = bot.register_singleton(kind, observer.clone());
        let _ = observer.id.set(id);
        let _ = observer.timer.set(bot.schedule_deadline(period, id));
        observer
    }

    fn is_authorized(&self, message: &ChatMessage) -> bool {
        message.user.is_mod()
            || message.user.is_broadcaster()
            || self.auth_users.contains(&message.user.name.to_lowercase())
    }

    fn unregister(&self, bot: &Dispatcher) {
        if let Some(timer) = self.timer.get() {
            bot.cancel_deadline(*timer);
        }
        if let Some(id) = self.id.get() {
            bot.remove_observer(*id);
        }
    }
}

#[async_trait]
impl Observer for ApprovalObserver {
    async fn on_message(&self, bot: &Dispatcher, message: &ChatMessage) {
        if !self.is_authorized(message) {
            return;
        }

        match message.text.trim() {
            "approve" => {
                log::debug!("{:?} request approved by {}", self.kind, message.user.name);
                self.unregister(bot);
                // take() keeps the callback one-shot even if a second
                // "approve" lands in the same broadcast snapshot.
                let action = self.on_approve.lock().unwrap().take();
                if let Some(action) = action {
                    action.await;
                }
            }
            "deny" => {
                log::debug!("{:?} request denied by {}", self.kind, message.user.name);
                self.unregister(bot);
                let action = self.on_deny.lock().unwrap().take();
                if let Some(action) = action {
                    action.await;
                }
            }
            _ => {}
        }
    }

    // Timed out: the request simply disappears, neither callback fires.
    async fn on_deadline(&self, bot: &Dispatcher) {
        log::debug!("{:?} request timed out", self.kind);
        self.unregister(bot);
        self.on_approve.lock().unwrap().take();
        self.on_deny.lock().unwrap().take();
    }
}
