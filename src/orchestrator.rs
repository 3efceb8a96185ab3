use std::sync::Arc;

use anyhow::Result;
use indicatif::ProgressBar;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::backend::Uploader;
use crate::control::ProgressEvent;
use crate::dedup::Deduplicator;
use crate::lead::{FilterFingerprint, Lead};
use crate::page::Page;
use crate::pagination::PaginationDriver;
use crate::reader::{filter_fingerprint, ResultReader};
use crate::timing::{pause, Timing};

pub const MAX_PAGES_PER_SESSION: usize = 30;
pub const DEFAULT_EMAIL_TARGET: u32 = 100;

/// Feature switches covering both flavours of the extraction pipeline.
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    /// Recognise search configurations that were already walked.
    pub check_filters: bool,
    /// Parse "N months in role/company" from card text.
    pub parse_tenure: bool,
    pub max_pages: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            check_filters: true,
            parse_tenure: true,
            max_pages: MAX_PAGES_PER_SESSION,
        }
    }
}

/// Asked before re-walking a search configuration seen in an earlier run.
pub trait ConfirmGate: Send + Sync {
    fn confirm_reprocess(&self, filter: &FilterFingerprint) -> bool;
}

pub struct AlwaysProceed;

impl ConfirmGate for AlwaysProceed {
    fn confirm_reprocess(&self, _filter: &FilterFingerprint) -> bool {
        true
    }
}

pub struct AlwaysDecline;

impl ConfirmGate for AlwaysDecline {
    fn confirm_reprocess(&self, _filter: &FilterFingerprint) -> bool {
        false
    }
}

type Ask = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Asks on the terminal. Anything but an explicit yes declines.
///
/// The question blocks the calling thread, so the run must be on a
/// multi-threaded runtime.
pub struct PromptGate {
    ask: Ask,
    progress: Option<ProgressBar>,
}

impl Default for PromptGate {
    fn default() -> Self {
        Self {
            ask: Box::new(ask_terminal),
            progress: None,
        }
    }
}

impl PromptGate {
    /// Hide `pb` while the question is on screen.
    pub fn suspending(mut self, pb: ProgressBar) -> Self {
        self.progress = Some(pb);
        self
    }

    #[cfg(test)]
    fn answering(ask: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            ask: Box::new(ask),
            progress: None,
        }
    }
}

impl ConfirmGate for PromptGate {
    fn confirm_reprocess(&self, filter: &FilterFingerprint) -> bool {
        let prompt = format!("Filters [{}] were already processed. Extract again?", filter);
        let ask = || (self.ask)(&prompt);
        tokio::task::block_in_place(|| match &self.progress {
            Some(pb) => pb.suspend(ask),
            None => ask(),
        })
    }
}

fn ask_terminal(prompt: &str) -> bool {
    dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .unwrap_or(false)
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunEnd {
    Stopped,
    /// A page came back without any leads.
    Exhausted,
    /// No enabled next control.
    LastPage,
    PageBudget,
    /// Reprocessing an old search was refused; nothing ran.
    Declined,
    Failed(String),
}

#[derive(Debug)]
pub struct RunReport {
    pub end: RunEnd,
    pub pages: usize,
    pub total: usize,
    pub leads: Vec<Lead>,
}

#[derive(Debug, Default)]
struct Session {
    email_target: u32,
    current_page: usize,
    extracted: Vec<Lead>,
}

enum Gate {
    Proceed(Option<FilterFingerprint>),
    Declined,
}

/// Walks result pages: wait, read, dedup, upload, advance.
pub struct Orchestrator {
    page: Box<dyn Page>,
    reader: ResultReader,
    driver: PaginationDriver,
    dedup: Deduplicator,
    uploader: Arc<dyn Uploader>,
    gate: Box<dyn ConfirmGate>,
    timing: Timing,
    options: PipelineOptions,
    session: Session,
}

impl Orchestrator {
    pub fn new(
        page: Box<dyn Page>,
        dedup: Deduplicator,
        uploader: Arc<dyn Uploader>,
        gate: Box<dyn ConfirmGate>,
        timing: Timing,
        options: PipelineOptions,
    ) -> Self {
        Self {
            page,
            reader: ResultReader::new(options.parse_tenure),
            driver: PaginationDriver::new(timing.click_settle),
            dedup,
            uploader,
            gate,
            timing,
            options,
            session: Session::default(),
        }
    }

    pub fn with_reader(mut self, reader: ResultReader) -> Self {
        self.reader = reader;
        self
    }

    /// One extraction run. Errors inside the loop end the run; they are
    /// reported in the returned `RunEnd`, never propagated.
    pub async fn run(
        &mut self,
        email_target: u32,
        cancel: &CancellationToken,
        events: &UnboundedSender<ProgressEvent>,
    ) -> RunReport {
        self.session = Session {
            email_target,
            ..Session::default()
        };
        info!(
            "Starting extraction - Target: {} emails ({} page budget)",
            self.session.email_target, self.options.max_pages
        );

        let filter = match self.pass_gate().await {
            Ok(Gate::Proceed(filter)) => filter,
            Ok(Gate::Declined) => {
                info!("Reprocessing declined, nothing extracted");
                return self.report(RunEnd::Declined);
            }
            Err(e) => {
                error!("Extraction error: {:#}", e);
                return self.finish(None, RunEnd::Failed(format!("{:#}", e)), events);
            }
        };

        let end = match self.walk(cancel, events).await {
            Ok(end) => end,
            Err(e) => {
                error!("Extraction error: {:#}", e);
                RunEnd::Failed(format!("{:#}", e))
            }
        };
        self.finish(filter.as_ref(), end, events)
    }

    async fn pass_gate(&mut self) -> Result<Gate> {
        if !self.options.check_filters {
            return Ok(Gate::Proceed(None));
        }

        let html = self.page.content().await?;
        let filter = filter_fingerprint(&html);
        if filter.is_empty() {
            return Ok(Gate::Proceed(None));
        }

        if self.dedup.was_filter_processed(&filter)? {
            warn!("Filters already processed: {}", filter);
            if !self.gate.confirm_reprocess(&filter) {
                return Ok(Gate::Declined);
            }
        }
        Ok(Gate::Proceed(Some(filter)))
    }

    async fn walk(
        &mut self,
        cancel: &CancellationToken,
        events: &UnboundedSender<ProgressEvent>,
    ) -> Result<RunEnd> {
        let max_pages = self.options.max_pages;

        for page in 1..=max_pages {
            if cancel.is_cancelled() {
                info!("Extraction stopped");
                return Ok(RunEnd::Stopped);
            }
            self.session.current_page = page;
            info!("Processing page {} ({})", page, self.page.location());

            let html = self.wait_for_results(cancel).await?;
            let read = self.reader.read(&html);
            if read.leads.is_empty() {
                info!("No leads found on this page");
                return Ok(RunEnd::Exhausted);
            }
            info!(
                "Found {} leads on page {} ({} skipped)",
                read.leads.len(),
                page,
                read.skipped
            );

            let novel = self.dedup.filter_novel(read.leads)?;
            let mut upload_error = None;
            if !novel.is_empty() {
                match self.uploader.upload(&novel).await {
                    Ok(_) => self.session.extracted.extend(novel),
                    Err(e) => upload_error = Some(e),
                }
            }

            let total = self.session.extracted.len();
            let status = match upload_error {
                Some(e) => format!("Page {}: error saving leads ({}), {} leads extracted", page, e, total),
                None => format!("Page {}: {} leads extracted", page, total),
            };
            let _ = events.send(ProgressEvent::Progress {
                page,
                total,
                status: Some(status),
            });

            if page >= max_pages {
                break;
            }
            if cancel.is_cancelled() {
                info!("Extraction stopped");
                return Ok(RunEnd::Stopped);
            }
            if !self.driver.advance(self.page.as_mut(), cancel).await? {
                info!("No more pages");
                return Ok(RunEnd::LastPage);
            }
            pause(self.timing.page_settle, cancel).await;
        }

        Ok(RunEnd::PageBudget)
    }

    /// Poll until result cards render, then give them a moment to fill in.
    /// Gives up quietly after the poll budget and returns whatever is there.
    async fn wait_for_results(&mut self, cancel: &CancellationToken) -> Result<String> {
        let mut html = String::new();
        for _ in 0..self.timing.poll_attempts {
            html = self.page.content().await?;
            let cards = self.reader.card_count(&html);
            if cards > 0 {
                info!("Found {} results", cards);
                if self.timing.content_settle.is_zero() {
                    return Ok(html);
                }
                pause(self.timing.content_settle, cancel).await;
                self.page.refresh();
                return self.page.content().await;
            }
            self.page.refresh();
            pause(self.timing.poll_interval, cancel).await;
        }
        warn!("No results found after waiting");
        Ok(html)
    }

    fn finish(
        &mut self,
        filter: Option<&FilterFingerprint>,
        end: RunEnd,
        events: &UnboundedSender<ProgressEvent>,
    ) -> RunReport {
        if let Some(filter) = filter {
            if let Err(e) = self.dedup.mark_filter_processed(filter) {
                error!("Failed to record processed filters: {:#}", e);
            }
        }

        let total = self.session.extracted.len();
        let _ = events.send(ProgressEvent::Complete { total });
        info!("Extraction complete ({:?}): {} leads", end, total);
        self.report(end)
    }

    fn report(&mut self, end: RunEnd) -> RunReport {
        let leads = std::mem::take(&mut self.session.extracted);
        RunReport {
            end,
            pages: self.session.current_page,
            total: leads.len(),
            leads,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::*;
    use crate::backend::{BatchReceipt, UploadError};
    use crate::page::{NextControl, SnapshotPages};
    use crate::store::{MemoryStore, SetStore, LEAD_HASHES, PROCESSED_FILTERS};

    #[derive(Default)]
    pub(crate) struct RecordingUploader {
        pub batches: Mutex<Vec<Vec<Lead>>>,
        pub fail: bool,
        pub cancel_on_upload: Option<CancellationToken>,
    }

    impl RecordingUploader {
        pub fn batch_sizes(&self) -> Vec<usize> {
            self.batches.lock().unwrap().iter().map(Vec::len).collect()
        }
    }

    #[async_trait]
    impl Uploader for RecordingUploader {
        async fn upload(&self, leads: &[Lead]) -> Result<BatchReceipt, UploadError> {
            self.batches.lock().unwrap().push(leads.to_vec());
            if let Some(token) = &self.cancel_on_upload {
                token.cancel();
            }
            if self.fail {
                return Err(UploadError::Rejected("boom".into()));
            }
            Ok(BatchReceipt {
                success: true,
                message: None,
            })
        }
    }

    /// Shares one `MemoryStore` between runs.
    struct SharedStore(Arc<MemoryStore>);

    impl SetStore for SharedStore {
        fn load_set(&self, key: &str) -> Result<std::collections::BTreeSet<String>> {
            self.0.load_set(key)
        }
        fn save_set(&self, key: &str, set: &std::collections::BTreeSet<String>) -> Result<()> {
            self.0.save_set(key, set)
        }
    }

    pub(crate) fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    pub(crate) fn build(
        pages: Vec<String>,
        store: Arc<MemoryStore>,
        uploader: Arc<RecordingUploader>,
        gate: Box<dyn ConfirmGate>,
    ) -> Orchestrator {
        Orchestrator::new(
            Box::new(SnapshotPages::from_html(pages)),
            Deduplicator::new(Box::new(SharedStore(store))),
            uploader,
            gate,
            Timing::zero(),
            PipelineOptions::default(),
        )
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    fn progress_pages(events: &[ProgressEvent]) -> Vec<(usize, usize)> {
        events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Progress { page, total, .. } => Some((*page, *total)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn walks_until_last_page() {
        let store = Arc::new(MemoryStore::new());
        let uploader = Arc::new(RecordingUploader::default());
        let mut orch = build(
            vec![fixture("search_page_1"), fixture("search_page_2")],
            store.clone(),
            uploader.clone(),
            Box::new(AlwaysDecline),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();

        let report = orch.run(100, &CancellationToken::new(), &tx).await;

        assert_eq!(report.end, RunEnd::LastPage);
        assert_eq!(report.pages, 2);
        // Card without a title is dropped; Jane reappears on page 2.
        assert_eq!(uploader.batch_sizes(), [2, 1]);
        assert_eq!(report.total, 3);

        let events = drain(&mut rx);
        assert_eq!(progress_pages(&events), [(1, 2), (2, 3)]);
        assert_eq!(events.last(), Some(&ProgressEvent::Complete { total: 3 }));

        let filters = store.load_set(PROCESSED_FILTERS).unwrap();
        assert!(filters.contains("senior|software engineer"));
        assert_eq!(store.load_set(LEAD_HASHES).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn processed_filters_hit_the_gate() {
        let store = Arc::new(MemoryStore::new().with_set(PROCESSED_FILTERS, ["senior|software engineer"]));
        let uploader = Arc::new(RecordingUploader::default());
        let mut orch = build(
            vec![fixture("search_page_1")],
            store.clone(),
            uploader.clone(),
            Box::new(AlwaysDecline),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();

        let report = orch.run(100, &CancellationToken::new(), &tx).await;

        assert_eq!(report.end, RunEnd::Declined);
        assert_eq!(report.pages, 0);
        assert!(uploader.batch_sizes().is_empty());
        assert!(drain(&mut rx).is_empty());
        assert!(store.load_set(LEAD_HASHES).unwrap().is_empty());
    }

    #[tokio::test]
    async fn confirmed_reprocess_runs() {
        let store = Arc::new(MemoryStore::new().with_set(PROCESSED_FILTERS, ["senior|software engineer"]));
        let uploader = Arc::new(RecordingUploader::default());
        let mut orch = build(
            vec![fixture("search_page_1"), fixture("search_page_2")],
            store,
            uploader.clone(),
            Box::new(AlwaysProceed),
        );
        let (tx, _rx) = mpsc::unbounded_channel();

        let report = orch.run(100, &CancellationToken::new(), &tx).await;
        assert_eq!(report.end, RunEnd::LastPage);
        assert_eq!(uploader.batch_sizes(), [2, 1]);
    }

    #[tokio::test]
    async fn never_exceeds_page_budget() {
        let pages = vec![fixture("search_page_1"); MAX_PAGES_PER_SESSION + 10];
        let uploader = Arc::new(RecordingUploader::default());
        let mut orch = build(pages, Arc::new(MemoryStore::new()), uploader.clone(), Box::new(AlwaysProceed));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let report = orch.run(100, &CancellationToken::new(), &tx).await;

        assert_eq!(report.end, RunEnd::PageBudget);
        assert_eq!(report.pages, MAX_PAGES_PER_SESSION);
        // Same leads every page: only the first page uploads.
        assert_eq!(uploader.batch_sizes(), [2]);
        assert_eq!(progress_pages(&drain(&mut rx)).len(), MAX_PAGES_PER_SESSION);
    }

    #[tokio::test]
    async fn stop_lets_inflight_upload_finish() {
        let cancel = CancellationToken::new();
        let uploader = Arc::new(RecordingUploader {
            cancel_on_upload: Some(cancel.clone()),
            ..Default::default()
        });
        let mut orch = build(
            vec![fixture("search_page_1"), fixture("search_page_2")],
            Arc::new(MemoryStore::new()),
            uploader.clone(),
            Box::new(AlwaysProceed),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();

        let report = orch.run(100, &cancel, &tx).await;

        assert_eq!(report.end, RunEnd::Stopped);
        assert_eq!(report.pages, 1);
        assert_eq!(report.total, 2);
        assert_eq!(uploader.batch_sizes(), [2]);
        let events = drain(&mut rx);
        assert_eq!(progress_pages(&events), [(1, 2)]);
        assert_eq!(events.last(), Some(&ProgressEvent::Complete { total: 2 }));
    }

    #[tokio::test]
    async fn cancelled_before_start_reads_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let uploader = Arc::new(RecordingUploader::default());
        let store = Arc::new(MemoryStore::new());
        let mut orch = build(vec![fixture("search_page_1")], store.clone(), uploader.clone(), Box::new(AlwaysProceed));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let report = orch.run(100, &cancel, &tx).await;

        assert_eq!(report.end, RunEnd::Stopped);
        assert_eq!(report.pages, 0);
        assert!(uploader.batch_sizes().is_empty());
        assert_eq!(drain(&mut rx), [ProgressEvent::Complete { total: 0 }]);
        assert_eq!(store.load_set(PROCESSED_FILTERS).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_page_ends_run() {
        let uploader = Arc::new(RecordingUploader::default());
        let mut orch = build(
            vec!["<html><body><p>No results</p></body></html>".into()],
            Arc::new(MemoryStore::new()),
            uploader.clone(),
            Box::new(AlwaysProceed),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();

        let report = orch.run(100, &CancellationToken::new(), &tx).await;
        assert_eq!(report.end, RunEnd::Exhausted);
        assert_eq!(drain(&mut rx), [ProgressEvent::Complete { total: 0 }]);
    }

    /// Renders nothing for the first `blank_polls` reads, then `html`.
    struct LatePage {
        html: String,
        blank_polls: usize,
        reads: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Page for LatePage {
        async fn content(&mut self) -> Result<String> {
            let n = self.reads.fetch_add(1, Ordering::SeqCst);
            if n < self.blank_polls {
                Ok("<html><body></body></html>".into())
            } else {
                Ok(self.html.clone())
            }
        }

        async fn activate(&mut self, _next: &NextControl) -> Result<()> {
            anyhow::bail!("no further pages")
        }

        fn location(&self) -> String {
            "late page".into()
        }
    }

    fn late_page(blank_polls: usize, timing: Timing) -> (Orchestrator, Arc<AtomicUsize>) {
        let reads = Arc::new(AtomicUsize::new(0));
        let page = LatePage {
            html: fixture("search_page_2"),
            blank_polls,
            reads: reads.clone(),
        };
        let orch = Orchestrator::new(
            Box::new(page),
            Deduplicator::new(Box::new(MemoryStore::new())),
            Arc::new(RecordingUploader::default()),
            Box::new(AlwaysProceed),
            timing,
            PipelineOptions::default(),
        );
        (orch, reads)
    }

    #[tokio::test]
    async fn wait_gives_up_after_poll_budget() {
        let (mut orch, reads) = late_page(usize::MAX, Timing::zero());
        let html = orch.wait_for_results(&CancellationToken::new()).await.unwrap();

        assert_eq!(orch.reader.card_count(&html), 0);
        assert_eq!(reads.load(Ordering::SeqCst), Timing::zero().poll_attempts as usize);
    }

    #[tokio::test]
    async fn wait_picks_up_late_results() {
        let (mut orch, reads) = late_page(3, Timing::zero());
        let html = orch.wait_for_results(&CancellationToken::new()).await.unwrap();

        assert_eq!(orch.reader.card_count(&html), 2);
        assert_eq!(reads.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn wait_rereads_after_settling() {
        let timing = Timing {
            content_settle: Duration::from_millis(1),
            ..Timing::zero()
        };
        let (mut orch, reads) = late_page(1, timing);
        let html = orch.wait_for_results(&CancellationToken::new()).await.unwrap();

        assert_eq!(orch.reader.card_count(&html), 2);
        // One blank poll, one hit, one read after the settle.
        assert_eq!(reads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn late_results_are_extracted() {
        let (mut orch, _reads) = late_page(5, Timing::zero());
        let (tx, _rx) = mpsc::unbounded_channel();

        let report = orch.run(100, &CancellationToken::new(), &tx).await;
        assert_eq!(report.end, RunEnd::LastPage);
        assert_eq!(report.total, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn prompt_gate_asks_with_filters() {
        let asked = Arc::new(Mutex::new(Vec::new()));
        let seen = asked.clone();
        let gate = PromptGate::answering(move |q| {
            seen.lock().unwrap().push(q.to_string());
            true
        })
        .suspending(ProgressBar::hidden());
        let store = Arc::new(MemoryStore::new().with_set(PROCESSED_FILTERS, ["senior|software engineer"]));
        let uploader = Arc::new(RecordingUploader::default());
        let mut orch = build(
            vec![fixture("search_page_1"), fixture("search_page_2")],
            store,
            uploader.clone(),
            Box::new(gate),
        );
        let (tx, _rx) = mpsc::unbounded_channel();

        let report = orch.run(100, &CancellationToken::new(), &tx).await;

        assert_eq!(report.end, RunEnd::LastPage);
        assert_eq!(uploader.batch_sizes(), [2, 1]);
        let asked = asked.lock().unwrap();
        assert_eq!(asked.len(), 1);
        assert!(asked[0].contains("senior|software engineer"), "{}", asked[0]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn prompt_gate_decline_skips_run() {
        let store = Arc::new(MemoryStore::new().with_set(PROCESSED_FILTERS, ["senior|software engineer"]));
        let uploader = Arc::new(RecordingUploader::default());
        let mut orch = build(
            vec![fixture("search_page_1")],
            store,
            uploader.clone(),
            Box::new(PromptGate::answering(|_| false)),
        );
        let (tx, _rx) = mpsc::unbounded_channel();

        let report = orch.run(100, &CancellationToken::new(), &tx).await;
        assert_eq!(report.end, RunEnd::Declined);
        assert!(uploader.batch_sizes().is_empty());
    }

    #[tokio::test]
    async fn upload_failure_does_not_stop_run() {
        let store = Arc::new(MemoryStore::new());
        let uploader = Arc::new(RecordingUploader {
            fail: true,
            ..Default::default()
        });
        let mut orch = build(
            vec![fixture("search_page_1"), fixture("search_page_2")],
            store.clone(),
            uploader.clone(),
            Box::new(AlwaysProceed),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();

        let report = orch.run(100, &CancellationToken::new(), &tx).await;

        assert_eq!(report.end, RunEnd::LastPage);
        assert_eq!(report.total, 0);
        assert_eq!(uploader.batch_sizes(), [2, 1]);
        let events = drain(&mut rx);
        match &events[0] {
            ProgressEvent::Progress { status: Some(s), total: 0, .. } => {
                assert!(s.contains("error saving leads"), "{}", s)
            }
            other => panic!("unexpected event {:?}", other),
        }
        // Failed batches are not re-queued: the fingerprints stay recorded.
        assert_eq!(store.load_set(LEAD_HASHES).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn page_error_ends_run_as_failed() {
        // Next control enabled on the only snapshot: activating it errors.
        let uploader = Arc::new(RecordingUploader::default());
        let mut orch = build(
            vec![fixture("search_page_1")],
            Arc::new(MemoryStore::new()),
            uploader.clone(),
            Box::new(AlwaysProceed),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();

        let report = orch.run(100, &CancellationToken::new(), &tx).await;

        assert!(matches!(report.end, RunEnd::Failed(_)));
        assert_eq!(report.total, 2);
        assert_eq!(drain(&mut rx).last(), Some(&ProgressEvent::Complete { total: 2 }));
    }

    #[tokio::test]
    async fn filter_check_can_be_disabled() {
        let store = Arc::new(MemoryStore::new().with_set(PROCESSED_FILTERS, ["senior|software engineer"]));
        let uploader = Arc::new(RecordingUploader::default());
        let mut orch = Orchestrator::new(
            Box::new(SnapshotPages::from_html(vec![fixture("search_page_2")])),
            Deduplicator::new(Box::new(SharedStore(store))),
            uploader.clone(),
            Box::new(AlwaysDecline),
            Timing::zero(),
            PipelineOptions {
                check_filters: false,
                ..Default::default()
            },
        );
        let (tx, _rx) = mpsc::unbounded_channel();

        let report = orch.run(100, &CancellationToken::new(), &tx).await;
        assert_eq!(report.end, RunEnd::LastPage);
        assert_eq!(uploader.batch_sizes(), [2]);
    }
}
