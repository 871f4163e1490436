//! WebSocket transport layer.
//!
//! Internal module owning the live connection: the protocol client and
//! its receive loop, the command/response correlation table, and the
//! event router.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | [`Client`] and its receive loop |
//! | `correlation` | Id-keyed pending-slot table |
//! | `router` | Event subscription registry |

// ============================================================================
// Submodules
// ============================================================================

/// Protocol client and receive loop.
pub mod connection;

/// Command/response correlation table.
pub mod correlation;

/// Event routing fabric.
pub mod router;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::Client;
pub use correlation::CorrelationTable;
pub use router::{EventHandler, EventRouter};
