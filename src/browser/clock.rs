//! Page-scoped clock control.
//!
//! Fakes timers and `Date` on the remote end through the
//! `vibium:clock.*` vendor extension. All times are epoch
//! milliseconds; ticks are milliseconds of fake time.

// ============================================================================
// Imports
// ============================================================================

use serde_json::json;

use crate::error::Result;
use crate::transport::Client;

// ============================================================================
// Clock
// ============================================================================

/// Clock control for one browsing context.
///
/// Obtained via [`crate::Page::clock`]. Thin command caller; the fake
/// clock state lives entirely on the remote end.
#[derive(Clone)]
pub struct Clock {
    client: Client,
    context: String,
}

impl Clock {
    pub(crate) fn new(client: Client, context: String) -> Self {
        Self { client, context }
    }

    /// Installs the fake clock, overriding `Date`, `setTimeout`,
    /// `setInterval` and friends.
    ///
    /// `time` sets the initial fake time; `timezone` overrides the
    /// browser timezone. Both default to the real values when omitted.
    pub async fn install(&self, time: Option<u64>, timezone: Option<&str>) -> Result<()> {
        let mut params = json!({ "context": self.context });
        if let Some(time) = time {
            params["time"] = json!(time);
        }
        if let Some(timezone) = timezone {
            params["timezone"] = json!(timezone);
        }
        self.client.send("vibium:clock.install", params).await?;
        Ok(())
    }

    /// Jumps forward by `ticks` ms, firing each due timer at most once.
    pub async fn fast_forward(&self, ticks: u64) -> Result<()> {
        self.client
            .send(
                "vibium:clock.fastForward",
                json!({ "context": self.context, "ticks": ticks }),
            )
            .await?;
        Ok(())
    }

    /// Advances `ticks` ms, firing every callback systematically.
    pub async fn run_for(&self, ticks: u64) -> Result<()> {
        self.client
            .send(
                "vibium:clock.runFor",
                json!({ "context": self.context, "ticks": ticks }),
            )
            .await?;
        Ok(())
    }

    /// Jumps to `time` and pauses the fake clock there.
    pub async fn pause_at(&self, time: u64) -> Result<()> {
        self.client
            .send(
                "vibium:clock.pauseAt",
                json!({ "context": self.context, "time": time }),
            )
            .await?;
        Ok(())
    }

    /// Resumes real-time progression from the current fake time.
    pub async fn resume(&self) -> Result<()> {
        self.client
            .send("vibium:clock.resume", json!({ "context": self.context }))
            .await?;
        Ok(())
    }

    /// Freezes `Date.now()` at `time`. Timers keep running.
    pub async fn set_fixed_time(&self, time: u64) -> Result<()> {
        self.client
            .send(
                "vibium:clock.setFixedTime",
                json!({ "context": self.context, "time": time }),
            )
            .await?;
        Ok(())
    }

    /// Sets `Date.now()` to `time` without triggering timers.
    pub async fn set_system_time(&self, time: u64) -> Result<()> {
        self.client
            .send(
                "vibium:clock.setSystemTime",
                json!({ "context": self.context, "time": time }),
            )
            .await?;
        Ok(())
    }

    /// Overrides the browser timezone.
    pub async fn set_timezone(&self, timezone: &str) -> Result<()> {
        self.client
            .send(
                "vibium:clock.setTimezone",
                json!({ "context": self.context, "timezone": timezone }),
            )
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for Clock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clock")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}
