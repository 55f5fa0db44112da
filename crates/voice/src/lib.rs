//! Voice-recovery subsystem: abandoned-cart detection, guardrailed call
//! dispatch through the SuperU provider, webhook ingestion, and
//! outcome-driven follow-ups.

mod callback;
mod followup;
mod quiet;
mod recovery;
mod superu;

pub use callback::CallbackResult;
pub use quiet::{in_quiet_hours, next_non_quiet_time};
pub use recovery::{ProcessCounters, TickReport, VoiceRecoveryService};
pub use superu::{HttpSuperUClient, VoiceProvider};
