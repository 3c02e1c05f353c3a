pub mod session;

pub use session::{Session, SessionId, SessionStatus};
