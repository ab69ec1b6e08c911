//! locator-engine: drives tags from discovery to sampling.
//!
//! [`Locator`] owns the tag registry and exposes one operation per kind of
//! transport event; [`binding::dispatch`] maps raw transport events onto
//! those operations for the configured binding, and [`event_loop::run`]
//! feeds them in from a channel one at a time.

pub mod adv;
pub mod binding;
pub mod event_loop;
pub mod handshake;
pub mod locator;
pub mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use binding::dispatch;
pub use event_loop::{run, LoopStats};
pub use handshake::{HandshakeEngine, HandshakeEvent};
pub use locator::{HandshakeError, Locator, LocatorError, ReportSource};
pub use transport::{CommandError, CteParameters, ScanMode, TransportCommands, TransportEvent};
