use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;

use crate::bot::clock::TimerId;
use crate::bot::dispatcher::{Dispatcher, Observer, ObserverId, SingletonKind};
use crate::bot::message::ChatMessage;

/* Chat poll.
 * Starts the moment it is spawned and runs until its deadline, or until an
 * elevated user ends it early with %endpoll. Everyone gets one vote for the
 * poll's lifetime; the winner announcement joins tied options into one label.
 */

#[derive(Debug, Clone, PartialEq)]
pub struct PollOption {
    pub name: String,
    pub votes: u32,
}

pub struct PollObserver {
    title: String,
    options: Mutex<Vec<PollOption>>,
    already_voted: Mutex<HashSet<String>>,
    resolved: AtomicBool,
    id: OnceLock<ObserverId>,
    timer: OnceLock<TimerId>,
}

impl PollObserver {
    /* Registers the poll into its singleton slot and arms the expiry timer.
     * A poll already pending is evicted by this registration.
     */
    pub fn spawn(
        bot: &Dispatcher,
        title: &str,
        duration: Duration,
        option_names: Vec<String>,
    ) -> Arc<Self> {
        let poll = Arc::new(PollObserver {
            title: title.to_string(),
            options: Mutex::new(
                option_names
                    .into_iter()
                    .map(|name| PollOption { name, votes: 0 })
                    .collect(),
            ),
            already_voted: Mutex::new(HashSet::new()),
            resolved: AtomicBool::new(false),
            id: OnceLock::new(),
            timer: OnceLock::new(),
        });

        let id = bot.register_singleton(SingletonKind::Poll, poll.clone());
        let _ = poll.id.set(id);
        let _ = poll.timer.set(bot.schedule_deadline(duration, id));
        poll
    }

    pub fn options(&self) -> Vec<PollOption> {
        self.options.lock().unwrap().clone()
    }

    fn register_vote(&self, voter: &str, choice: &str) {
        let mut voted = self.already_voted.lock().unwrap();
        if voted.contains(voter) {
            return;
        }

        // Non-numeric or out-of-range votes are ignored outright.
        let choice: usize = match choice.trim().parse() {
            Ok(n) => n,
            Err(_) => return,
        };
        let mut options = self.options.lock().unwrap();
        if choice < 1 || choice > options.len() {
            return;
        }

        options[choice - 1].votes += 1;
        voted.insert(voter.to_string());
    }

    // Tied options are concatenated into a single winner label.
    fn winner_label(&self) -> Option<String> {
        let options = self.options.lock().unwrap();
        let best = options.iter().map(|option| option.votes).max()?;
        let winners: Vec<&str> = options
            .iter()
            .filter(|option| option.votes == best)
            .map(|option| option.name.as_str())
            .collect();
        Some(winners.join(" & "))
    }

    // Idempotent: the first resolution wins, anything later is ignored.
    async fn resolve(&self, bot: &Dispatcher) {
        if self.resolved.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(timer) = self.timer.get() {
            bot.cancel_deadline(*timer);
        }
        if let Some(id) = self.id.get() {
            bot.remove_observer(*id);
        }

        if let Some(winner) = self.winner_label() {
            bot.send_message_as_user(&format!("Poll \"{}\" is over! Winner: {winner}", self.title))
                .await;
        }
    }
}

#[async_trait]
impl Observer for PollObserver {
    async fn on_message(&self, bot: &Dispatcher, message: &ChatMessage) {
        if self.resolved.load(Ordering::SeqCst) {
            return;
        }

        match message.first_token().as_str() {
            "%endpoll" => {
                if message.user.is_elevated() {
                    self.resolve(bot).await;
                }
            }
            "%vote" => {
                self.register_vote(&message.user.name.to_lowercase(), message.rest());
            }
            _ => {}
        }
    }

    async fn on_deadline(&self, bot: &Dispatcher) {
        self.resolve(bot).await;
    }
}
