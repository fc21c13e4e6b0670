use std::collections::HashSet;
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use rand::seq::SliceRandom;

use crate::bot::clock::TimerId;
use crate::bot::constants::{
    CAPTCHA_ALPHABET, CAPTCHA_CLAIM_WINDOW, CAPTCHA_LENGTH, CAPTCHA_POINTS,
};
use crate::bot::dispatcher::{Dispatcher, Observer, ObserverId, SingletonKind};
use crate::bot::message::ChatMessage;
use crate::bot::processor::Economy;

/* Chat captcha.
 * The overlay renders a short random code; anyone who types it back earns
 * points, once each. The first correct answer starts the claim window, and
 * when it runs out the captcha unregisters itself.
 */
pub struct CaptchaObserver {
    answer: String,
    economy: Arc<Economy>,
    already_claimed: Mutex<HashSet<String>>,
    window: Mutex<Option<TimerId>>,
    id: OnceLock<ObserverId>,
}

fn random_answer() -> String {
    let characters: Vec<char> = CAPTCHA_ALPHABET.chars().collect();
    let mut rng = rand::thread_rng();
    (0..CAPTCHA_LENGTH)
        .map(|_| *characters.choose(&mut rng).unwrap())
        .collect()
}

impl CaptchaObserver {
    pub fn spawn(bot: &Dispatcher, economy: Arc<Economy>) -> Arc<Self> {
        Self::spawn_with_answer(bot, economy, random_answer())
    }

    // Deterministic constructor; the overlay host and tests pick the code.
    pub fn spawn_with_answer(bot: &Dispatcher, economy: Arc<Economy>, answer: String) -> Arc<Self> {
        let captcha = Arc::new(CaptchaObserver {
            answer,
            economy,
            already_claimed: Mutex::new(HashSet::new()),
            window: Mutex::new(None),
            id: OnceLock::new(),
        });
        let id = bot.register_singleton(SingletonKind::Captcha, captcha.clone());
        let _ = captcha.id.set(id);
        captcha
    }

    // The code the overlay should render.
    pub fn value(&self) -> &str {
        &self.answer
    }
}

#[async_trait]
impl Observer for CaptchaObserver {
    async fn on_message(&self, bot: &Dispatcher, message: &ChatMessage) {
        if message.text.trim() != self.answer {
            return;
        }

        let claimer = message.user.name.to_lowercase();
        {
            let mut claimed = self.already_claimed.lock().unwrap();
            if !claimed.insert(claimer.clone()) {
                return;
            }
        }

        self.economy.payout(&claimer, CAPTCHA_POINTS).await;
        bot.send_message_as_user(&format!("{claimer} claimed {CAPTCHA_POINTS:.0}!"))
            .await;

        // First claim arms the window; later claims ride it out.
        let mut window = self.window.lock().unwrap();
        if window.is_none() {
            if let Some(id) = self.id.get() {
                *window = Some(bot.schedule_deadline(CAPTCHA_CLAIM_WINDOW, *id));
            }
        }
    }

    async fn on_deadline(&self, bot: &Dispatcher) {
        if let Some(id) = self.id.get() {
            bot.remove_observer(*id);
        }
    }
}
