/// Authentication module
///
/// Token signing/verification, the refresh token ledger, the injected
/// clock, and the session service that combines them.

mod claims;
mod clock;
mod jwt;
mod refresh_token;
mod session;

pub use claims::{Claims, TokenKind};
pub use clock::{Clock, FixedClock, SystemClock};
pub use jwt::TokenCodec;
pub use refresh_token::{token_fingerprint, RefreshTokenLedger};
pub use session::{SessionService, TokenPair};
