//! Dialog handle.
//!
//! Created when a `browsingContext.userPromptOpened` event arrives.
//! Accepting or dismissing races against the user or the page closing
//! the dialog first; those races resolve to the desired end state, so a
//! narrow allow-list of remote errors is absorbed as success.

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::transport::Client;

// ============================================================================
// Race allow-list
// ============================================================================

/// Returns `true` for errors that mean the dialog is already gone.
///
/// Matched on error text because the servers do not emit structured
/// codes for these cases yet.
fn is_dialog_race_error(e: &Error) -> bool {
    if matches!(e, Error::ConnectionClosed) {
        return true;
    }
    match e.remote_message() {
        Some(msg) => msg.contains("no such alert") || msg.contains("No dialog"),
        None => false,
    }
}

// ============================================================================
// Dialog
// ============================================================================

/// A browser dialog: alert, confirm, prompt, or beforeunload.
#[derive(Clone)]
pub struct Dialog {
    client: Client,
    context: String,
    data: Value,
}

impl Dialog {
    /// Creates a dialog handle from a `userPromptOpened` event payload.
    pub(crate) fn new(client: Client, context: String, data: Value) -> Self {
        Self {
            client,
            context,
            data,
        }
    }

    /// The dialog type: `alert`, `confirm`, `prompt`, or `beforeunload`.
    #[must_use]
    pub fn kind(&self) -> &str {
        self.data
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("alert")
    }

    /// The dialog message text.
    #[must_use]
    pub fn message(&self) -> &str {
        self.data
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// The default value for prompt dialogs.
    #[must_use]
    pub fn default_value(&self) -> &str {
        self.data
            .get("defaultValue")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// The browsing context the dialog belongs to.
    #[must_use]
    pub fn context(&self) -> &str {
        &self.context
    }

    /// Accepts the dialog. For prompt dialogs, optionally provides text.
    ///
    /// # Errors
    ///
    /// Propagates remote errors except the already-closed races, which
    /// complete without raising.
    pub async fn accept(&self, prompt_text: Option<&str>) -> Result<()> {
        let mut params = json!({
            "context": self.context,
            "accept": true,
        });
        if let Some(text) = prompt_text {
            params["userText"] = Value::String(text.to_string());
        }

        match self
            .client
            .send("browsingContext.handleUserPrompt", params)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_dialog_race_error(&e) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Dismisses the dialog (cancel/close).
    ///
    /// # Errors
    ///
    /// Same tolerance policy as [`accept`](Self::accept).
    pub async fn dismiss(&self) -> Result<()> {
        let params = json!({
            "context": self.context,
            "accept": false,
        });

        match self
            .client
            .send("browsingContext.handleUserPrompt", params)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_dialog_race_error(&e) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for Dialog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dialog")
            .field("context", &self.context)
            .field("kind", &self.kind())
            .field("message", &self.message())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_race_allow_list() {
        assert!(is_dialog_race_error(&Error::ConnectionClosed));
        assert!(is_dialog_race_error(&Error::remote(
            "no such alert",
            "no such alert: already handled"
        )));
        assert!(is_dialog_race_error(&Error::remote(
            "invalid argument",
            "No dialog is open"
        )));

        // Anything else propagates.
        assert!(!is_dialog_race_error(&Error::remote(
            "unknown command",
            "unknown command: browsingContext.handleUserPrompt"
        )));
        assert!(!is_dialog_race_error(&Error::protocol("bad frame")));
    }
}
