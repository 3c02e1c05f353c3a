pub mod rate_limiter;
pub mod relay;
pub mod session_store;
pub mod sweeper;
pub mod upstream;

pub use rate_limiter::RateLimiter;
pub use relay::{CookieSnapshot, CreatedSession, LoginOutcome, PollOutcome, RelayService};
pub use session_store::SessionStore;
pub use sweeper::spawn_sweeper;
pub use upstream::{QrProvider, UpstreamClient};
