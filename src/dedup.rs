use anyhow::Result;
use tracing::{debug, info};

use crate::lead::{FilterFingerprint, Lead};
use crate::store::{SetStore, LEAD_HASHES, PROCESSED_FILTERS};

/// Tracks which leads and search configurations have already been seen.
///
/// Both sets only ever grow. Each batch is a read-modify-write against the
/// store, which is safe as long as a single run writes at a time.
pub struct Deduplicator {
    store: Box<dyn SetStore>,
}

impl Deduplicator {
    pub fn new(store: Box<dyn SetStore>) -> Self {
        Self { store }
    }

    pub fn was_filter_processed(&self, filter: &FilterFingerprint) -> Result<bool> {
        Ok(self.store.load_set(PROCESSED_FILTERS)?.contains(filter.as_str()))
    }

    pub fn mark_filter_processed(&self, filter: &FilterFingerprint) -> Result<()> {
        let mut filters = self.store.load_set(PROCESSED_FILTERS)?;
        if filters.insert(filter.to_string()) {
            self.store.save_set(PROCESSED_FILTERS, &filters)?;
        }
        Ok(())
    }

    /// Keep only leads not seen before, in input order. Within the batch the
    /// first occurrence wins. The updated set is persisted in one write.
    pub fn filter_novel(&self, leads: Vec<Lead>) -> Result<Vec<Lead>> {
        let mut seen = self.store.load_set(LEAD_HASHES)?;
        let before = leads.len();

        let novel: Vec<Lead> = leads
            .into_iter()
            .filter(|lead| {
                let fp = lead.fingerprint();
                let fresh = seen.insert(fp.as_str().to_owned());
                if !fresh {
                    debug!("Duplicate lead: {}", fp);
                }
                fresh
            })
            .collect();

        self.store.save_set(LEAD_HASHES, &seen)?;
        info!("{} of {} leads are new", novel.len(), before);
        Ok(novel)
    }

    /// Sizes of the lead and filter sets.
    pub fn counts(&self) -> Result<(usize, usize)> {
        Ok((
            self.store.load_set(LEAD_HASHES)?.len(),
            self.store.load_set(PROCESSED_FILTERS)?.len(),
        ))
    }
}
