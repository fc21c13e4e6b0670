// Exported functions
pub use self::utils::{display_points, extract_tag, parse_amount, parse_signed_amount, parse_username};

// Exported structs and types
pub use self::market::{
    CloseMarketCommand, InvestCommand, PortfolioCommand, SellAllCommand, UninvestCommand,
};
pub use self::overlay::{
    CancelCommand, CaptchaCommand, DisableCommand, PollCommand, ShowImageCommand,
};
pub use self::points::{GrantCommand, PointsCommand, TransferCommand};

// Submodules
mod market;
mod overlay;
mod points;
mod utils;
