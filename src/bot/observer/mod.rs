// Exported structs and types
pub use self::approval::{ApprovalAction, ApprovalObserver};
pub use self::captcha::CaptchaObserver;
pub use self::poll::PollObserver;

// Submodules
mod approval;
mod captcha;
mod poll;
