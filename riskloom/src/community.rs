// src/community.rs
//
// Community-sourced scam/phishing reports (spec §4.11): an append-only
// JSONL journal of report and vote events, folded into per-address state
// on load and after every append. Grounded on this codebase's
// append-only audit-log convention (one JSON object per line, never
// rewritten in place). Votes are enforced one-per-(report, voter) through
// a second in-memory set rebuilt from the same journal on load.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::domain::Address;
use crate::errors::RiskError;

const CONFIRM_VOTES: u32 = 5;
const DISMISS_VOTES: u32 = 5;
const MODIFIER_CAP: u32 = 30;
const MAX_DESCRIPTION_CHARS: usize = 2000;
const MAX_EVIDENCE_URLS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportCategory {
    Scam,
    Phishing,
    RugPull,
    Honeypot,
    Impersonation,
    WashTrading,
    Drainer,
    FakeToken,
    Ponzi,
    Other,
}

/// §4.11: `status ∈ {pending, confirmed, disputed, dismissed}`. `Disputed`
/// is reached only through [`CommunityStore::dispute`] — it is not a vote
/// outcome, since up/downvote thresholds only ever resolve to Confirmed or
/// Dismissed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    Confirmed,
    Disputed,
    Dismissed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityReport {
    pub id: String,
    pub address: Address,
    pub reporter_id: String,
    pub category: ReportCategory,
    pub description: String,
    pub evidence_urls: Vec<String>,
    pub chain_id: u64,
    pub timestamp: DateTime<Utc>,
    pub status: ReportStatus,
    pub upvotes: u32,
    pub downvotes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum JournalEvent {
    Submitted(CommunityReport),
    Voted { id: String, voter_id: String, up: bool },
    Disputed { id: String },
}

pub struct CommunityStore {
    path: PathBuf,
    reports: Mutex<HashMap<String, CommunityReport>>,
    votes_cast: Mutex<HashSet<(String, String)>>,
}

impl CommunityStore {
    /// Loads and folds the journal at `path` if it exists; a missing file
    /// is an empty store, not an error — the journal is created lazily on
    /// the first submission.
    pub async fn load(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let mut reports = HashMap::new();
        let mut votes_cast = HashSet::new();

        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                for line in contents.lines() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<JournalEvent>(line) {
                        Ok(event) => apply(&mut reports, &mut votes_cast, event),
                        Err(e) => warn!(error = %e, "skipping malformed community journal line"),
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        Ok(CommunityStore {
            path,
            reports: Mutex::new(reports),
            votes_cast: Mutex::new(votes_cast),
        })
    }

    /// Submits a new report and returns its id. The id is the first 16 hex
    /// characters of `sha256(address || reporter_id || category ||
    /// timestamp)` — deterministic, so duplicate submissions at the same
    /// instant collide rather than silently duplicating.
    ///
    /// Rejects (`InvalidInput`) a description over
    /// [`MAX_DESCRIPTION_CHARS`] or more than [`MAX_EVIDENCE_URLS`]
    /// evidence URLs — these are malformed-caller-input, not a detector
    /// degradation, so they propagate per §7's taxonomy.
    #[allow(clippy::too_many_arguments)]
    pub async fn submit(
        &self,
        address: Address,
        reporter_id: String,
        category: ReportCategory,
        description: String,
        evidence_urls: Vec<String>,
        chain_id: u64,
        timestamp: DateTime<Utc>,
    ) -> Result<String, RiskError> {
        if description.chars().count() > MAX_DESCRIPTION_CHARS {
            return Err(RiskError::InvalidInput {
                field: "description".into(),
                reason: format!("{} chars exceeds the {MAX_DESCRIPTION_CHARS}-char limit", description.chars().count()),
            });
        }
        if evidence_urls.len() > MAX_EVIDENCE_URLS {
            return Err(RiskError::InvalidInput {
                field: "evidence_urls".into(),
                reason: format!("{} URLs exceeds the {MAX_EVIDENCE_URLS}-URL limit", evidence_urls.len()),
            });
        }

        let id = report_id(&address, &reporter_id, category, timestamp);
        let report = CommunityReport {
            id: id.clone(),
            address,
            reporter_id,
            category,
            description,
            evidence_urls,
            chain_id,
            timestamp,
            status: ReportStatus::Pending,
            upvotes: 0,
            downvotes: 0,
        };
        let event = JournalEvent::Submitted(report);
        self.append(&event).await.map_err(|e| RiskError::CacheIo { reason: e.to_string() })?;
        apply(&mut self.reports.lock().unwrap(), &mut self.votes_cast.lock().unwrap(), event);
        Ok(id)
    }

    /// Registers a vote from `voter_id`. One vote per `(report, voter)` —
    /// a repeat vote from the same voter on the same report is silently
    /// ignored, matching the separate-journal dedup the spec calls for.
    /// The status transition is sticky: once a report leaves `Pending` it
    /// never transitions again via voting.
    pub async fn vote(&self, id: &str, voter_id: &str, up: bool) -> io::Result<()> {
        {
            let cast = self.votes_cast.lock().unwrap();
            if cast.contains(&(id.to_string(), voter_id.to_string())) {
                return Ok(());
            }
        }
        let event = JournalEvent::Voted { id: id.to_string(), voter_id: voter_id.to_string(), up };
        self.append(&event).await?;
        apply(&mut self.reports.lock().unwrap(), &mut self.votes_cast.lock().unwrap(), event);
        Ok(())
    }

    /// Marks a report `Disputed` — a moderator/community action distinct
    /// from voting, only effective while the report is still `Pending`.
    pub async fn dispute(&self, id: &str) -> io::Result<()> {
        let event = JournalEvent::Disputed { id: id.to_string() };
        self.append(&event).await?;
        apply(&mut self.reports.lock().unwrap(), &mut self.votes_cast.lock().unwrap(), event);
        Ok(())
    }

    /// §4.11 risk modifier: `min(30, floor(8 * log2(total + 1)))` once at
    /// least `min_reports` non-dismissed reports exist for `address`,
    /// otherwise zero. `total` counts every status but `Dismissed` — a
    /// dismissed report contributes nothing.
    pub fn risk_modifier(&self, address: &Address, min_reports: u32) -> u32 {
        let reports = self.reports.lock().unwrap();
        let total = reports
            .values()
            .filter(|r| &r.address == address && r.status != ReportStatus::Dismissed)
            .count() as u32;
        if total < min_reports.max(2) {
            return 0;
        }
        let raw = 8.0 * ((total + 1) as f64).log2();
        (raw.floor() as u32).min(MODIFIER_CAP)
    }

    pub fn reports_for(&self, address: &Address) -> Vec<CommunityReport> {
        let reports = self.reports.lock().unwrap();
        let mut out: Vec<CommunityReport> = reports.values().filter(|r| &r.address == address).cloned().collect();
        out.sort_by_key(|r| r.timestamp);
        out
    }

    async fn append(&self, event: &JournalEvent) -> io::Result<()> {
        let line = serde_json::to_string(event).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path).await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        Ok(())
    }
}

fn apply(reports: &mut HashMap<String, CommunityReport>, votes_cast: &mut HashSet<(String, String)>, event: JournalEvent) {
    match event {
        JournalEvent::Submitted(report) => {
            reports.entry(report.id.clone()).or_insert(report);
        }
        JournalEvent::Voted { id, voter_id, up } => {
            if !votes_cast.insert((id.clone(), voter_id)) {
                return;
            }
            if let Some(report) = reports.get_mut(&id) {
                if up {
                    report.upvotes += 1;
                } else {
                    report.downvotes += 1;
                }
                if report.status == ReportStatus::Pending {
                    if report.upvotes >= CONFIRM_VOTES {
                        report.status = ReportStatus::Confirmed;
                    } else if report.downvotes >= DISMISS_VOTES {
                        report.status = ReportStatus::Dismissed;
                    }
                }
            }
        }
        JournalEvent::Disputed { id } => {
            if let Some(report) = reports.get_mut(&id) {
                if report.status == ReportStatus::Pending {
                    report.status = ReportStatus::Disputed;
                }
            }
        }
    }
}

fn report_id(address: &Address, reporter_id: &str, category: ReportCategory, timestamp: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(address.as_str().as_bytes());
    hasher.update(reporter_id.as_bytes());
    hasher.update(format!("{category:?}").as_bytes());
    hasher.update(timestamp.timestamp().to_le_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn addr(n: u8) -> Address {
        Address::parse(&format!("0x{n:040x}")).unwrap()
    }

    fn ts() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn tmp_path(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!("riskloom-community-test-{label}-{}.jsonl", std::process::id()))
    }

    #[tokio::test]
    async fn fewer_than_min_reports_has_no_modifier() {
        let path = tmp_path("few");
        let store = CommunityStore::load(&path).await.unwrap();
        store
            .submit(addr(1), "alice".into(), ReportCategory::Scam, "drained my wallet".into(), vec![], 1, ts())
            .await
            .unwrap();
        assert_eq!(store.risk_modifier(&addr(1), 2), 0);
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn upvote_majority_confirms_pending_report() {
        let path = tmp_path("confirm");
        let store = CommunityStore::load(&path).await.unwrap();
        let id = store
            .submit(addr(2), "bob".into(), ReportCategory::RugPull, "rug pull".into(), vec![], 1, ts())
            .await
            .unwrap();
        for i in 0..CONFIRM_VOTES {
            store.vote(&id, &format!("voter{i}"), true).await.unwrap();
        }
        let reports = store.reports_for(&addr(2));
        assert_eq!(reports[0].status, ReportStatus::Confirmed);
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn confirmed_status_is_sticky_against_further_downvotes() {
        let path = tmp_path("sticky");
        let store = CommunityStore::load(&path).await.unwrap();
        let id = store
            .submit(addr(3), "carol".into(), ReportCategory::Phishing, "phishing site".into(), vec![], 1, ts())
            .await
            .unwrap();
        for i in 0..CONFIRM_VOTES {
            store.vote(&id, &format!("up{i}"), true).await.unwrap();
        }
        for i in 0..DISMISS_VOTES {
            store.vote(&id, &format!("down{i}"), false).await.unwrap();
        }
        let reports = store.reports_for(&addr(3));
        assert_eq!(reports[0].status, ReportStatus::Confirmed);
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn repeat_vote_from_same_voter_is_ignored() {
        let path = tmp_path("dedup");
        let store = CommunityStore::load(&path).await.unwrap();
        let id = store
            .submit(addr(5), "erin".into(), ReportCategory::Honeypot, "honeypot contract".into(), vec![], 1, ts())
            .await
            .unwrap();
        store.vote(&id, "same-voter", true).await.unwrap();
        store.vote(&id, "same-voter", true).await.unwrap();
        store.vote(&id, "same-voter", true).await.unwrap();
        let reports = store.reports_for(&addr(5));
        assert_eq!(reports[0].upvotes, 1);
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn description_over_limit_is_rejected() {
        let path = tmp_path("toolong");
        let store = CommunityStore::load(&path).await.unwrap();
        let too_long = "x".repeat(MAX_DESCRIPTION_CHARS + 1);
        let result = store
            .submit(addr(6), "frank".into(), ReportCategory::Scam, too_long, vec![], 1, ts())
            .await;
        assert!(matches!(result, Err(RiskError::InvalidInput { .. })));
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn journal_reloads_to_same_state() {
        let path = tmp_path("reload");
        {
            let store = CommunityStore::load(&path).await.unwrap();
            let id = store
                .submit(addr(4), "dave".into(), ReportCategory::Drainer, "drainer contract".into(), vec![], 1, ts())
                .await
                .unwrap();
            store.vote(&id, "v1", true).await.unwrap();
            store.vote(&id, "v2", true).await.unwrap();
        }
        let reloaded = CommunityStore::load(&path).await.unwrap();
        let reports = reloaded.reports_for(&addr(4));
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].upvotes, 2);
        let _ = tokio::fs::remove_file(&path).await;
    }
}
