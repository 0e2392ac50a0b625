//! Phone number and one-time-code sessions.

pub mod clock;
pub mod delivery;
mod error;
pub mod service;
pub mod store;
pub mod tokens;

pub use clock::{Clock, ManualClock, SystemClock};
pub use delivery::{CodeSender, LogCodeSender};
pub use error::AuthError;
pub use service::{IssuedCode, SessionGrant, SessionService, SessionSettings, is_valid_phone};
pub use store::{InMemoryVerificationStore, VerificationEntry, VerificationStore};
pub use tokens::{Claims, TokenIssuer};
