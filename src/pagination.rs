use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Result;
use scraper::{Html, Selector};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::page::{NextControl, Page};
use crate::timing::pause;

static NEXT_BUTTON: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".artdeco-pagination__button--next:not([disabled])").unwrap()
});

/// Finds the enabled "next" control in the markup, if any.
pub fn find_next(html: &str) -> Option<NextControl> {
    let doc = Html::parse_document(html);
    let button = doc.select(&NEXT_BUTTON).next()?;
    if button.value().attr("aria-disabled") == Some("true") {
        return None;
    }
    Some(NextControl {
        href: button.value().attr("href").map(str::to_string),
    })
}

pub struct PaginationDriver {
    settle: Duration,
}

impl PaginationDriver {
    pub fn new(settle: Duration) -> Self {
        Self { settle }
    }

    /// Activate the next control and wait for the new page to start
    /// rendering. `false` means there is no further page; nothing is touched.
    pub async fn advance(&self, page: &mut dyn Page, cancel: &CancellationToken) -> Result<bool> {
        let html = page.content().await?;
        let Some(next) = find_next(&html) else {
            info!("No next button found or it is disabled");
            return Ok(false);
        };

        info!("Clicking next page");
        page.activate(&next).await?;
        pause(self.settle, cancel).await;
        Ok(true)
    }
}
