//! Wire protocol message types.
//!
//! This module defines the JSON envelopes exchanged with the remote end
//! over the WebSocket connection.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | [`CommandEnvelope`] | Local → Remote | Command request |
//! | [`ResponseEnvelope`] | Remote → Local | Command response (success or error) |
//! | [`EventEnvelope`] | Remote → Local | Unsolicited browser notification |
//!
//! # Method Naming
//!
//! Methods follow `module.methodName` format. Methods carrying the
//! `vibium:` prefix are vendor extensions; unprefixed methods are the
//! baseline protocol:
//!
//! - `browsingContext.handleUserPrompt` (baseline)
//! - `network.failRequest` (baseline)
//! - `vibium:page.navigate` (extension)
//! - `vibium:network.fulfill` (extension)

// ============================================================================
// Submodules
// ============================================================================

/// Envelope definitions and the incoming-message parser.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use message::{CommandEnvelope, ErrorData, EventEnvelope, IncomingMessage, ResponseEnvelope};
