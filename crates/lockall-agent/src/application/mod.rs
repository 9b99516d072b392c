//! Application layer use cases for the agent.
//!
//! # What lives here (for beginners)
//!
//! Use cases orchestrate the protocol without touching the OS directly.
//! They depend on traits ([`crate::infrastructure::network::PeerEndpoint`],
//! [`crate::infrastructure::render::CodeRenderer`], [`intents::OutcomeSink`])
//! so tests can run them against in-memory collaborators.
//!
//! # Sub-modules
//!
//! - **`pairing`**  – One out-of-band bootstrap: render a code, accept one
//!   companion, exchange one command, verify the reply.
//! - **`dispatch`** – Chooses between the browser bridge and a fresh pairing
//!   session for each command.
//! - **`intents`**  – Turns user requests into dispatcher calls and reports
//!   what came of them.

pub mod dispatch;
pub mod intents;
pub mod pairing;

pub use dispatch::{DispatchError, Dispatcher, Timeouts};
pub use intents::{handle_intent, run_intent_loop, IntentOutcome, OutcomeSink, UserIntent};
pub use pairing::{PairingSession, SessionError, SessionOutcome, SessionState, SessionTimeouts};
