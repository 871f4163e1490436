//! Blocking façade over the non-blocking client.
//!
//! The [`SyncBridge`] runs the non-blocking client on a background
//! runtime thread; every type here is a mechanical wrapper forwarding
//! through [`SyncBridge::run`], so the two façades cannot drift apart.
//!
//! ```no_run
//! use vibium::sync::Browser;
//! use vibium::LaunchOptions;
//!
//! fn main() -> vibium::Result<()> {
//!     let browser = Browser::launch(LaunchOptions::new().headless())?;
//!     let page = browser.page()?;
//!     page.go("https://example.com")?;
//!     println!("title: {}", page.title()?);
//!     browser.close()?;
//!     Ok(())
//! }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Background runtime bridge.
pub mod bridge;

/// Blocking Browser and Page.
pub mod browser;

/// Blocking event-backed objects.
pub mod objects;

// ============================================================================
// Re-exports
// ============================================================================

pub use bridge::SyncBridge;
pub use browser::{Browser, Page};
pub use objects::{Clock, Dialog, Download, Response, Route};
