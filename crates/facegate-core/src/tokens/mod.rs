pub mod clock;
pub mod ledger;
pub mod repository;
pub mod sweeper;
pub mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use ledger::{TokenAudit, TokenLedger, TOKEN_ID_BYTES};
pub use repository::{FilesystemTokenRepository, MemoryTokenRepository, TokenRepository};
pub use sweeper::{spawn_sweeper, SweeperHandle};
pub use token::{Deactivation, DeactivationReason, Token, TokenInfo, TokenState};
