use std::time::Duration;

use tokio_util::sync::CancellationToken;

const POLL_ATTEMPTS: u32 = 30;

/// Delays used by the extraction loop, all derived from one time unit.
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    pub poll_interval: Duration,
    pub poll_attempts: u32,
    /// Pause once cards show up, before reading them.
    pub content_settle: Duration,
    /// Pause after clicking "next".
    pub click_settle: Duration,
    /// Pause between pages.
    pub page_settle: Duration,
}

impl Timing {
    pub fn from_unit(unit: Duration) -> Self {
        Self {
            poll_interval: unit / 2,
            poll_attempts: POLL_ATTEMPTS,
            content_settle: unit * 2,
            click_settle: unit * 3,
            page_settle: unit * 4,
        }
    }

    #[cfg(test)]
    pub fn zero() -> Self {
        Self::from_unit(Duration::ZERO)
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self::from_unit(Duration::from_secs(1))
    }
}

/// Sleep for `d`, returning early if the run is cancelled.
pub async fn pause(d: Duration, cancel: &CancellationToken) {
    if d.is_zero() {
        return;
    }
    tokio::select! {
        _ = tokio::time::sleep(d) => {}
        _ = cancel.cancelled() => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_from_unit() {
        let t = Timing::default();
        assert_eq!(t.poll_interval, Duration::from_millis(500));
        assert_eq!(t.poll_attempts, 30);
        assert_eq!(t.click_settle, Duration::from_secs(3));
        assert_eq!(t.page_settle, Duration::from_secs(4));
    }

    #[tokio::test]
    async fn pause_ends_on_cancel() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), pause(Duration::from_secs(3600), &cancel))
            .await
            .expect("pause should return once cancelled");
    }
}
