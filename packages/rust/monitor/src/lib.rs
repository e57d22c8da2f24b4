//! Forum monitor: scan, score, deduplicate, emit.
//!
//! Each tick fetches recent threads from every configured forum, scores
//! them by keyword overlap with the taxonomy plus recency and engagement
//! weights, filters anything already in the emission ledger, and emits the
//! top-K per forum as engagement candidates. The monitor never posts;
//! candidates land in a queue consumed by an external actor.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use draftline_shared::{
    DraftlineError, EngagementCandidate, ForumEntry, MonitorConfig, Result,
};
use draftline_storage::Storage;

/// User-Agent string for forum requests.
const USER_AGENT: &str = concat!("Draftline/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// A thread as returned by a forum's listing endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ForumThread {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub url: String,
    /// Forum score (upvotes).
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub num_comments: i64,
    /// Creation time as a Unix timestamp.
    pub created_utc: i64,
}

#[derive(Debug, Deserialize)]
struct ThreadListing {
    threads: Vec<ForumThread>,
}

// ---------------------------------------------------------------------------
// Forum client
// ---------------------------------------------------------------------------

/// HTTP client for forum listing endpoints.
pub struct ForumClient {
    client: reqwest::Client,
}

impl ForumClient {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| DraftlineError::Transient(format!("client build: {e}")))?;
        Ok(Self { client })
    }

    /// Fetch the recent thread listing for one forum.
    pub async fn fetch_threads(&self, forum: &ForumEntry) -> Result<Vec<ForumThread>> {
        let response = self
            .client
            .get(&forum.url)
            .query(&[("limit", forum.scan_limit)])
            .send()
            .await
            .map_err(|e| DraftlineError::Transient(format!("{}: {e}", forum.name)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DraftlineError::Transient(format!(
                "{}: HTTP {status}",
                forum.name
            )));
        }

        let listing: ThreadListing = response
            .json()
            .await
            .map_err(|e| DraftlineError::parse(format!("{} listing: {e}", forum.name)))?;

        Ok(listing.threads)
    }
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Score a thread for engagement opportunity.
///
/// Keyword overlap with the taxonomy dominates; fresh threads with few
/// replies rank higher because they are still answerable.
pub fn score_thread(thread: &ForumThread, keywords: &[String], now: DateTime<Utc>) -> i64 {
    let text = format!("{} {}", thread.title, thread.body).to_lowercase();

    // Keyword overlap: 10 per distinct matched keyword, capped at 40.
    let matches = keywords.iter().filter(|kw| text.contains(kw.as_str())).count() as i64;
    let mut score = (matches * 10).min(40);

    // Recency weight.
    let hours_old = (now.timestamp() - thread.created_utc) / 3600;
    score += match hours_old {
        i64::MIN..2 => 20,
        2..6 => 15,
        6..12 => 10,
        12..24 => 5,
        _ => 0,
    };

    // Low reply count means the conversation is still open.
    score += match thread.num_comments {
        0..5 => 20,
        5..15 => 15,
        15..30 => 10,
        _ => 0,
    };

    score
}

/// Count of distinct taxonomy keywords matched by a thread.
fn keyword_matches(thread: &ForumThread, keywords: &[String]) -> usize {
    let text = format!("{} {}", thread.title, thread.body).to_lowercase();
    keywords.iter().filter(|kw| text.contains(kw.as_str())).count()
}

// ---------------------------------------------------------------------------
// Tick
// ---------------------------------------------------------------------------

/// Summary of one monitor tick.
#[derive(Debug, Default, serde::Serialize)]
pub struct TickOutcome {
    /// Candidates emitted this tick, in emission order.
    #[serde(skip)]
    pub candidates: Vec<EngagementCandidate>,
    pub threads_scanned: usize,
    /// Threads dropped because the ledger already held them.
    pub deduplicated: usize,
    /// Forums that failed to fetch (the tick continues without them).
    pub forum_errors: usize,
}

/// Run one monitor tick across every configured forum.
///
/// A forum fetch failure is isolated: the remaining forums still scan. The
/// ledger insert is the emission gate: a thread only becomes a candidate
/// when this run, and not a concurrent one, recorded it.
#[instrument(skip_all, fields(forums = config.forums.len()))]
pub async fn run_tick(
    client: &ForumClient,
    config: &MonitorConfig,
    taxonomy_keywords: &[String],
    storage: &Storage,
    now: DateTime<Utc>,
) -> Result<TickOutcome> {
    let mut outcome = TickOutcome::default();

    storage
        .purge_expired_ledger(now, config.ledger_ttl_days)
        .await?;
    let ledgered = storage
        .ledgered_thread_ids(now, config.ledger_ttl_days)
        .await?;

    let window_secs = config.scan_window_hours as i64 * 3600;

    for forum in &config.forums {
        let threads = match client.fetch_threads(forum).await {
            Ok(t) => t,
            Err(e) => {
                warn!(forum = %forum.name, error = %e, "forum scan failed, skipping");
                outcome.forum_errors += 1;
                continue;
            }
        };
        outcome.threads_scanned += threads.len();

        let mut scored: Vec<(i64, ForumThread)> = threads
            .into_iter()
            .filter(|t| now.timestamp() - t.created_utc <= window_secs)
            .filter(|t| t.score >= forum.min_score)
            .filter(|t| keyword_matches(t, taxonomy_keywords) > 0)
            .filter(|t| {
                if ledgered.contains(&t.id) {
                    outcome.deduplicated += 1;
                    false
                } else {
                    true
                }
            })
            .map(|t| (score_thread(&t, taxonomy_keywords, now), t))
            .collect();

        // Rank best-first; thread id breaks ties deterministically.
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));

        for (score, thread) in scored.into_iter().take(config.top_k as usize) {
            // Optimistic gate: a concurrent tick may have recorded the
            // thread between our read and this insert.
            if !storage.try_record_thread(&thread.id, now).await? {
                outcome.deduplicated += 1;
                continue;
            }

            let candidate = EngagementCandidate {
                thread_id: thread.id,
                forum: forum.name.clone(),
                title: thread.title,
                url: thread.url,
                score,
                discovered_at: now,
            };
            storage.insert_candidate(&candidate).await?;
            debug!(forum = %forum.name, thread = %candidate.thread_id, score, "candidate emitted");
            outcome.candidates.push(candidate);
        }
    }

    info!(
        scanned = outcome.threads_scanned,
        emitted = outcome.candidates.len(),
        deduplicated = outcome.deduplicated,
        forum_errors = outcome.forum_errors,
        "monitor tick complete"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("dl_mon_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn thread(id: &str, title: &str, age_hours: i64, comments: i64, now: DateTime<Utc>) -> ForumThread {
        ForumThread {
            id: id.into(),
            title: title.into(),
            body: String::new(),
            url: format!("https://forum.example.com/t/{id}"),
            score: 10,
            num_comments: comments,
            created_utc: now.timestamp() - age_hours * 3600,
        }
    }

    fn keywords() -> Vec<String> {
        vec!["sales quota".into(), "territory design".into()]
    }

    #[test]
    fn fresh_matching_thread_outscores_stale_one() {
        let now = Utc::now();
        let fresh = thread("a", "How do you set a sales quota?", 1, 2, now);
        let stale = thread("b", "Old sales quota thread", 30, 2, now);

        let fresh_score = score_thread(&fresh, &keywords(), now);
        let stale_score = score_thread(&stale, &keywords(), now);
        assert!(fresh_score > stale_score);
        // 1 keyword (10) + <2h (20) + <5 comments (20)
        assert_eq!(fresh_score, 50);
    }

    #[test]
    fn keyword_overlap_is_capped() {
        let now = Utc::now();
        let mut t = thread("a", "sales quota territory design", 1, 0, now);
        t.body = "sales quota territory design sales quota".into();
        let many: Vec<String> = (0..10).map(|i| format!("kw{i}")).collect();
        let mut all = keywords();
        all.extend(many);
        t.title.push_str(" kw0 kw1 kw2 kw3 kw4 kw5 kw6 kw7 kw8 kw9");

        // 12 distinct matches would be 120 uncapped.
        let score = score_thread(&t, &all, now);
        assert_eq!(score, 40 + 20 + 20);
    }

    fn forum_config(server_uri: &str) -> MonitorConfig {
        MonitorConfig {
            forums: vec![ForumEntry {
                name: "sales".into(),
                url: format!("{server_uri}/sales/new.json"),
                scan_limit: 50,
                min_score: 2,
            }],
            top_k: 2,
            ledger_ttl_days: 30,
            tick_minutes: 360,
            scan_window_hours: 24,
        }
    }

    fn listing_json(now: DateTime<Utc>) -> serde_json::Value {
        serde_json::json!({
            "threads": [
                {"id": "t-hot", "title": "Struggling with sales quota setting", "url": "https://f/t-hot",
                 "score": 25, "num_comments": 3, "created_utc": now.timestamp() - 3600},
                {"id": "t-warm", "title": "territory design question", "url": "https://f/t-warm",
                 "score": 8, "num_comments": 10, "created_utc": now.timestamp() - 8 * 3600},
                {"id": "t-cold", "title": "sales quota archive", "url": "https://f/t-cold",
                 "score": 5, "num_comments": 40, "created_utc": now.timestamp() - 20 * 3600},
                {"id": "t-offtopic", "title": "what keyboard do you use", "url": "https://f/t-off",
                 "score": 90, "num_comments": 1, "created_utc": now.timestamp() - 3600},
                {"id": "t-lowscore", "title": "sales quota but buried", "url": "https://f/t-low",
                 "score": 0, "num_comments": 0, "created_utc": now.timestamp() - 3600}
            ]
        })
    }

    #[tokio::test]
    async fn tick_emits_top_k_matching_threads() {
        let now = Utc::now();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing_json(now)))
            .mount(&server)
            .await;

        let storage = test_storage().await;
        let client = ForumClient::new(5).unwrap();
        let config = forum_config(&server.uri());

        let outcome = run_tick(&client, &config, &keywords(), &storage, now)
            .await
            .expect("tick");

        // Off-topic and below-min-score threads never rank; top_k = 2 caps
        // the remaining three.
        assert_eq!(outcome.threads_scanned, 5);
        assert_eq!(outcome.candidates.len(), 2);
        assert_eq!(outcome.candidates[0].thread_id, "t-hot");

        let queued = storage.list_candidates(10).await.unwrap();
        assert_eq!(queued.len(), 2);
    }

    #[tokio::test]
    async fn ledgered_threads_are_not_reemitted() {
        let now = Utc::now();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing_json(now)))
            .mount(&server)
            .await;

        let storage = test_storage().await;
        let client = ForumClient::new(5).unwrap();
        let config = forum_config(&server.uri());

        let first = run_tick(&client, &config, &keywords(), &storage, now).await.unwrap();
        assert_eq!(first.candidates.len(), 2);

        // Next tick within the TTL window: everything already emitted is
        // filtered, so the remaining eligible thread surfaces instead.
        let later = now + chrono::Duration::hours(1);
        let second = run_tick(&client, &config, &keywords(), &storage, later).await.unwrap();
        assert!(second.candidates.iter().all(|c| c.thread_id != "t-hot"));
        assert!(second.deduplicated >= 2);
    }

    #[tokio::test]
    async fn forum_fetch_failure_is_isolated() {
        let now = Utc::now();
        let good = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing_json(now)))
            .mount(&good)
            .await;
        let bad = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&bad)
            .await;

        let mut config = forum_config(&good.uri());
        config.forums.insert(
            0,
            ForumEntry {
                name: "down".into(),
                url: format!("{}/down/new.json", bad.uri()),
                scan_limit: 50,
                min_score: 2,
            },
        );

        let storage = test_storage().await;
        let client = ForumClient::new(5).unwrap();
        let outcome = run_tick(&client, &config, &keywords(), &storage, now).await.unwrap();

        assert_eq!(outcome.forum_errors, 1);
        assert_eq!(outcome.candidates.len(), 2);
    }
}
