use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};
use url::Url;

/// The "next page" control as found in the markup.
#[derive(Debug, Clone, PartialEq)]
pub struct NextControl {
    pub href: Option<String>,
}

/// A rendered results page that can be read and moved forward.
#[async_trait]
pub trait Page: Send {
    /// Markup as currently rendered.
    async fn content(&mut self) -> Result<String>;

    /// Perform the page-changing action behind `next`.
    async fn activate(&mut self, next: &NextControl) -> Result<()>;

    /// Forget any cached markup so the next `content` call reads it afresh.
    fn refresh(&mut self) {}

    /// Where the page currently points, for logs and base-URL resolution.
    fn location(&self) -> String;
}

// ── Saved pages ──

/// Replays an ordered set of saved result pages.
pub struct SnapshotPages {
    names: Vec<String>,
    pages: Vec<String>,
    pos: usize,
}

impl SnapshotPages {
    /// Load every `*.html` file in `dir`, ordered by file name.
    pub fn open(dir: &Path) -> Result<Self> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read snapshot dir {}", dir.display()))?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "html"))
            .collect();
        files.sort();

        if files.is_empty() {
            bail!("No .html snapshots in {}", dir.display());
        }

        let mut names = Vec::with_capacity(files.len());
        let mut pages = Vec::with_capacity(files.len());
        for f in &files {
            pages.push(
                std::fs::read_to_string(f)
                    .with_context(|| format!("Failed to read {}", f.display()))?,
            );
            names.push(f.display().to_string());
        }
        info!("Loaded {} page snapshots from {}", pages.len(), dir.display());
        Ok(Self { names, pages, pos: 0 })
    }

    #[cfg(test)]
    pub fn from_html(pages: Vec<String>) -> Self {
        let names = (1..=pages.len()).map(|i| format!("snapshot #{}", i)).collect();
        Self { names, pages, pos: 0 }
    }

    #[cfg(test)]
    pub fn position(&self) -> usize {
        self.pos
    }
}

#[async_trait]
impl Page for SnapshotPages {
    async fn content(&mut self) -> Result<String> {
        Ok(self.pages.get(self.pos).cloned().unwrap_or_default())
    }

    async fn activate(&mut self, _next: &NextControl) -> Result<()> {
        if self.pos + 1 >= self.pages.len() {
            bail!("Next control is enabled on the last snapshot ({})", self.location());
        }
        self.pos += 1;
        Ok(())
    }

    fn location(&self) -> String {
        self.names.get(self.pos).cloned().unwrap_or_default()
    }
}

// ── Live pages ──

/// Fetches result pages over HTTP. Navigation follows the next control's
/// link, or bumps the `page` query parameter when the control has none.
pub struct HttpPages {
    client: reqwest::Client,
    url: Url,
    cached: Option<String>,
}

impl HttpPages {
    pub fn new(client: reqwest::Client, url: Url) -> Self {
        Self {
            client,
            url,
            cached: None,
        }
    }

    async fn fetch(&self) -> Result<String> {
        debug!("GET {}", self.url);
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", self.url))?;

        let status = response.status();
        if !status.is_success() {
            bail!("HTTP {} for {}", status, self.url);
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl Page for HttpPages {
    async fn content(&mut self) -> Result<String> {
        if let Some(html) = &self.cached {
            return Ok(html.clone());
        }
        let html = self.fetch().await?;
        self.cached = Some(html.clone());
        Ok(html)
    }

    async fn activate(&mut self, next: &NextControl) -> Result<()> {
        self.url = next_url(&self.url, next)?;
        self.cached = None;
        info!("Navigated to {}", self.url);
        Ok(())
    }

    fn refresh(&mut self) {
        self.cached = None;
    }

    fn location(&self) -> String {
        self.url.to_string()
    }
}

fn next_url(current: &Url, next: &NextControl) -> Result<Url> {
    if let Some(href) = next.href.as_deref().filter(|h| !h.is_empty() && *h != "#") {
        return current
            .join(href)
            .with_context(|| format!("Bad next link {:?}", href));
    }

    let page: u32 = current
        .query_pairs()
        .find(|(k, _)| k == "page")
        .and_then(|(_, v)| v.parse().ok())
        .unwrap_or(1);

    let pairs: Vec<(String, String)> = current
        .query_pairs()
        .filter(|(k, _)| k != "page")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut url = current.clone();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(pairs)
        .append_pair("page", &(page + 1).to_string());
    Ok(url)
}
