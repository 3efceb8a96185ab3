use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One contact read off a search results card. Serialized in the backend's
/// camelCase wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub name: String,
    pub title: String,
    pub company: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,
    #[serde(default)]
    pub time_in_role: String,
    #[serde(default)]
    pub time_at_company: String,
    #[serde(default)]
    pub recently_hired: bool,
    pub extracted_at: DateTime<Utc>,
}

impl Lead {
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.name, &self.company, &self.title)
    }
}

/// Dedup key for a lead: lowercased `name|company|title`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(name: &str, company: &str, title: &str) -> Self {
        Fingerprint(format!("{}|{}|{}", name, company, title).to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies a search configuration: the active filter labels, trimmed,
/// lowercased, sorted and pipe-joined.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilterFingerprint(String);

impl FilterFingerprint {
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut labels: Vec<String> = labels
            .into_iter()
            .map(|l| l.as_ref().trim().to_lowercase())
            .filter(|l| !l.is_empty())
            .collect();
        labels.sort();
        labels.dedup();
        FilterFingerprint(labels.join("|"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A page with no visible filters yields an empty fingerprint.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for FilterFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
pub(crate) fn sample(name: &str, company: &str, title: &str) -> Lead {
    Lead {
        name: name.to_string(),
        title: title.to_string(),
        company: company.to_string(),
        location: None,
        profile_url: None,
        time_in_role: String::new(),
        time_at_company: String::new(),
        recently_hired: false,
        extracted_at: Utc::now(),
    }
}
