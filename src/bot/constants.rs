use std::time::Duration;

/* Tunables for the monetizable interactions.
 * Costs are in channel points; durations are wall-clock windows handed to
 * the dispatcher's scheduler.
 */

// Shared cooldown bucket for the gated (nuisance) commands.
pub const COMMAND_COOLDOWN: Duration = Duration::from_secs(10);

// Heart-rate stock market.
pub const MAX_HEART_RATE_SAMPLES: usize = 500;
// Stakes below this are treated as fully withdrawn and evicted.
pub const BASICALLY_ZERO: f64 = 0.000_000_000_000_1;

// Captcha.
pub const CAPTCHA_POINTS: f64 = 1000.0;
pub const CAPTCHA_CLAIM_WINDOW: Duration = Duration::from_secs(10);
pub const CAPTCHA_ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const CAPTCHA_LENGTH: usize = 6;

// Approvals.
pub const AUTHORIZATION_PERIOD: Duration = Duration::from_secs(300);

// Show-image purchases.
pub const SHOW_IMAGE_COST: f64 = 10_000.0;
pub const SHOW_IMAGE_PERIOD: Duration = Duration::from_secs(60);

// Overlay disable purchases.
pub const DISABLE_COST: f64 = 500.0;

// Heart-rate feed reconnect backoff.
pub const HEART_RATE_RECONNECT: Duration = Duration::from_secs(5);
