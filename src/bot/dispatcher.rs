use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::clock::{Clock, Scheduler, TimerId};
use super::ledger::LedgerError;
use super::market::MarketError;
use super::message::ChatMessage;

/* Dispatcher is the sole ingress for chat events.
 * It keeps an ordered registry of observers and broadcasts every message to
 * all of them, in registration order. It also owns the two pieces of shared
 * machinery the stateful observers need: the singleton slots (one pending
 * instance per kind) and the deadline scheduler.
 */

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("chat send failed: {0}")]
    SendFailed(String),
}

#[derive(thiserror::Error, Debug)]
pub enum BotError {
    // Reported inline to chat, never fatal.
    #[error("{0}")]
    UserError(String),
    #[error("{0}")]
    MarketError(#[from] MarketError),
    // Collaborator failures; logged, never surfaced verbatim to chat.
    #[error("{0}")]
    LedgerError(#[from] LedgerError),
    #[error("{0}")]
    TransportError(#[from] TransportError),
}

pub type HandlerResult = Result<(), BotError>;

// Issued at registration; identity for removal, timers and singleton slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

#[cfg(test)]
impl ObserverId {
    pub fn for_tests(raw: u64) -> Self {
        ObserverId(raw)
    }
}

// At most one pending instance of each kind may exist at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SingletonKind {
    Poll,
    Approval,
    ShowImage,
    Captcha,
}

#[async_trait]
pub trait Observer: Send + Sync {
    async fn on_message(&self, bot: &Dispatcher, message: &ChatMessage);

    // Fired once when a deadline scheduled for this observer expires.
    async fn on_deadline(&self, _bot: &Dispatcher) {}
}

#[async_trait]
pub trait ChatSender: Send + Sync {
    async fn send_message(&self, channel_id: &str, text: &str) -> Result<(), TransportError>;
}

// Sender that only logs. Useful when no transport is wired up.
pub struct LogSender;

#[async_trait]
impl ChatSender for LogSender {
    async fn send_message(&self, channel_id: &str, text: &str) -> Result<(), TransportError> {
        log::info!("[{channel_id}] {text}");
        Ok(())
    }
}

// Records outbound replies; the test double for the reply capability.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<String>>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatSender for RecordingSender {
    async fn send_message(&self, _channel_id: &str, text: &str) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

pub struct Dispatcher {
    channel_id: String,
    sender: Arc<dyn ChatSender>,
    observers: Mutex<Vec<(ObserverId, Arc<dyn Observer>)>>,
    singletons: Mutex<HashMap<SingletonKind, ObserverId>>,
    scheduler: Scheduler,
    next_observer: AtomicU64,
}

impl Dispatcher {
    pub fn new(channel_id: &str, sender: Arc<dyn ChatSender>, clock: Arc<dyn Clock>) -> Self {
        Dispatcher {
            channel_id: channel_id.to_string(),
            sender,
            observers: Mutex::new(Vec::new()),
            singletons: Mutex::new(HashMap::new()),
            scheduler: Scheduler::new(clock),
            next_observer: AtomicU64::new(1),
        }
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    // Handed to deferred actions that must outlive the borrow of the bot.
    pub fn sender(&self) -> Arc<dyn ChatSender> {
        self.sender.clone()
    }

    /* Registers an observer at the end of the dispatch order.
     * Idempotent: adding the same instance again keeps its original slot
     * and returns the id it already has.
     */
    pub fn add_observer(&self, observer: Arc<dyn Observer>) -> ObserverId {
        let mut observers = self.observers.lock().unwrap();
        for (id, existing) in observers.iter() {
            if Arc::ptr_eq(existing, &observer) {
                return *id;
            }
        }
        let id = ObserverId(self.next_observer.fetch_add(1, Ordering::Relaxed));
        observers.push((id, observer));
        id
    }

    // No-op when the id is not registered.
    pub fn remove_observer(&self, id: ObserverId) {
        let mut observers = self.observers.lock().unwrap();
        observers.retain(|(existing, _)| *existing != id);
        drop(observers);

        let mut singletons = self.singletons.lock().unwrap();
        singletons.retain(|_, held| *held != id);
    }

    pub fn observer(&self, id: ObserverId) -> Option<Arc<dyn Observer>> {
        let observers = self.observers.lock().unwrap();
        observers
            .iter()
            .find(|(existing, _)| *existing == id)
            .map(|(_, observer)| observer.clone())
    }

    /* Registers an observer into its kind's singleton slot. The previous
     * holder of the slot, if any, is unregistered immediately: its callbacks
     * never fire. Eviction is expected behavior, not an error.
     */
    pub fn register_singleton(
        &self,
        kind: SingletonKind,
        observer: Arc<dyn Observer>,
    ) -> ObserverId {
        let evicted = self.singletons.lock().unwrap().get(&kind).copied();
        if let Some(evicted) = evicted {
            log::debug!("evicting pending {kind:?} observer");
            self.remove_observer(evicted);
        }

        let id = self.add_observer(observer);
        self.singletons.lock().unwrap().insert(kind, id);
        id
    }

    pub fn singleton(&self, kind: SingletonKind) -> Option<ObserverId> {
        self.singletons.lock().unwrap().get(&kind).copied()
    }

    /* Broadcasts one message to every observer.
     * The observer list is snapshotted before iterating, so a handler that
     * adds or removes observers mid-broadcast never changes the in-flight
     * delivery order and never causes skipped or duplicate calls.
     */
    pub async fn dispatch(&self, message: &ChatMessage) {
        let snapshot: Vec<Arc<dyn Observer>> = {
            let observers = self.observers.lock().unwrap();
            observers
                .iter()
                .map(|(_, observer)| observer.clone())
                .collect()
        };

        for observer in snapshot {
            observer.on_message(self, message).await;
        }
    }

    // Reply capability. Failures are logged, not retried.
    pub async fn send_message_as_user(&self, text: &str) {
        if let Err(err) = self.sender.send_message(&self.channel_id, text).await {
            log::error!("could not send chat message: {err}");
        }
    }

    pub fn schedule_deadline(&self, delay: Duration, observer: ObserverId) -> TimerId {
        self.scheduler.schedule(delay, observer)
    }

    pub fn cancel_deadline(&self, timer: TimerId) {
        self.scheduler.cancel(timer);
    }

    /* Fires every deadline that is due. Timers whose observer has already
     * been unregistered (resolved early, or evicted) are dropped silently.
     */
    pub async fn fire_due(&self) {
        for (_, observer_id) in self.scheduler.take_due() {
            if let Some(observer) = self.observer(observer_id) {
                observer.on_deadline(self).await;
            }
        }
    }

    // Production timer driver. Tests call fire_due with a manual clock instead.
    pub async fn run_timers(&self) {
        loop {
            match self.scheduler.next_delay() {
                Some(delay) if delay.is_zero() => self.fire_due().await,
                Some(delay) => {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => self.fire_due().await,
                        _ = self.scheduler.wait_for_change() => {}
                    }
                }
                None => self.scheduler.wait_for_change().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::{ChatSender, Dispatcher, Observer, RecordingSender, SingletonKind};
    use crate::bot::clock::ManualClock;
    use crate::bot::message::{ChatMessage, ChatUser};

    fn new_bot() -> Dispatcher {
        Dispatcher::new(
            "chan",
            Arc::new(RecordingSender::new()),
            Arc::new(ManualClock::new()),
        )
    }

    fn msg(text: &str) -> ChatMessage {
        ChatMessage::new("chan", ChatUser::new("1", "alice", []), text)
    }

    // Counts deliveries, and optionally registers another observer when poked.
    struct Probe {
        seen: Mutex<Vec<String>>,
        register_on_message: Mutex<Option<Arc<dyn Observer>>>,
    }

    impl Probe {
        fn new() -> Arc<Self> {
            Arc::new(Probe {
                seen: Mutex::new(Vec::new()),
                register_on_message: Mutex::new(None),
            })
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Observer for Probe {
        async fn on_message(&self, bot: &Dispatcher, message: &ChatMessage) {
            self.seen.lock().unwrap().push(message.text.clone());
            if let Some(other) = self.register_on_message.lock().unwrap().take() {
                bot.add_observer(other);
            }
        }
    }

    #[tokio::test]
    async fn test_broadcast_in_registration_order() {
        let bot = new_bot();
        let first = Probe::new();
        let second = Probe::new();
        bot.add_observer(first.clone());
        bot.add_observer(second.clone());

        bot.dispatch(&msg("hello")).await;
        assert_eq!(first.seen(), vec!["hello"]);
        assert_eq!(second.seen(), vec!["hello"]);
    }

    #[tokio::test]
    async fn test_add_observer_is_idempotent() {
        let bot = new_bot();
        let probe = Probe::new();
        let id = bot.add_observer(probe.clone());
        assert_eq!(bot.add_observer(probe.clone()), id);

        bot.dispatch(&msg("once")).await;
        assert_eq!(probe.seen(), vec!["once"]);
    }

    #[tokio::test]
    async fn test_remove_absent_observer_is_noop() {
        let bot = new_bot();
        let probe = Probe::new();
        let id = bot.add_observer(probe.clone());
        bot.remove_observer(id);
        bot.remove_observer(id);

        bot.dispatch(&msg("gone")).await;
        assert!(probe.seen().is_empty());
    }

    #[tokio::test]
    async fn test_observer_added_mid_broadcast_misses_current_message() {
        let bot = new_bot();
        let late = Probe::new();
        let adder = Probe::new();
        *adder.register_on_message.lock().unwrap() = Some(late.clone() as Arc<dyn Observer>);
        bot.add_observer(adder.clone());

        bot.dispatch(&msg("first")).await;
        // The snapshot was taken before the new observer existed.
        assert!(late.seen().is_empty());

        bot.dispatch(&msg("second")).await;
        assert_eq!(late.seen(), vec!["second"]);
    }

    #[tokio::test]
    async fn test_singleton_registration_evicts_prior() {
        let bot = new_bot();
        let first = Probe::new();
        let second = Probe::new();

        let first_id = bot.register_singleton(SingletonKind::Poll, first.clone());
        assert_eq!(bot.singleton(SingletonKind::Poll), Some(first_id));

        let second_id = bot.register_singleton(SingletonKind::Poll, second.clone());
        assert_eq!(bot.singleton(SingletonKind::Poll), Some(second_id));

        bot.dispatch(&msg("after eviction")).await;
        assert!(first.seen().is_empty());
        assert_eq!(second.seen(), vec!["after eviction"]);
    }

    #[tokio::test]
    async fn test_singleton_kinds_are_independent() {
        let bot = new_bot();
        let poll = Probe::new();
        let approval = Probe::new();
        bot.register_singleton(SingletonKind::Poll, poll.clone());
        bot.register_singleton(SingletonKind::Approval, approval.clone());

        bot.dispatch(&msg("both live")).await;
        assert_eq!(poll.seen(), vec!["both live"]);
        assert_eq!(approval.seen(), vec!["both live"]);
    }

    #[tokio::test]
    async fn test_send_failures_are_swallowed() {
        struct FailingSender;

        #[async_trait]
        impl ChatSender for FailingSender {
            async fn send_message(
                &self,
                _channel_id: &str,
                _text: &str,
            ) -> Result<(), super::TransportError> {
                Err(super::TransportError::SendFailed("down".to_string()))
            }
        }

        let bot = Dispatcher::new("chan", Arc::new(FailingSender), Arc::new(ManualClock::new()));
        // Must not panic or propagate.
        bot.send_message_as_user("hello").await;
    }
}
