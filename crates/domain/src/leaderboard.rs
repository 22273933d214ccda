use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::karma::KarmaEvent;
use crate::ports::karma::KarmaLedgerRepository;
use crate::util::{MS_PER_HOUR, now_ms};

pub const DEFAULT_WINDOW_HOURS: u32 = 24;
pub const DEFAULT_LIMIT: usize = 5;
pub const MAX_LIMIT: usize = 100;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub user_id: String,
    pub username: String,
    pub karma: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LeaderboardQuery {
    pub window_hours: u32,
    pub limit: usize,
}

impl Default for LeaderboardQuery {
    fn default() -> Self {
        Self {
            window_hours: DEFAULT_WINDOW_HOURS,
            limit: DEFAULT_LIMIT,
        }
    }
}

pub fn build_leaderboard_query(
    window_hours: Option<u32>,
    limit: Option<usize>,
    defaults: LeaderboardQuery,
) -> LeaderboardQuery {
    LeaderboardQuery {
        window_hours: window_hours.unwrap_or(defaults.window_hours),
        limit: limit.unwrap_or(defaults.limit).min(MAX_LIMIT),
    }
}

/// Inclusive `[now - window, now]` bounds in epoch milliseconds.
pub fn window_bounds(now_ms: i64, window_hours: u32) -> (i64, i64) {
    let span = i64::from(window_hours).saturating_mul(MS_PER_HOUR);
    (now_ms.saturating_sub(span), now_ms)
}

/// Sums in-window amounts per beneficiary and returns the top `limit`.
///
/// Events outside `[since_ms, until_ms]` are ignored. Ordering is karma descending,
/// then user id ascending. The username shown is the one on the user's most recent
/// in-window event.
pub fn rank_karma(
    events: &[KarmaEvent],
    since_ms: i64,
    until_ms: i64,
    limit: usize,
) -> Vec<LeaderboardEntry> {
    if limit == 0 {
        return Vec::new();
    }

    struct Tally<'a> {
        karma: i64,
        username: &'a str,
        latest: (i64, &'a str),
    }

    let mut tallies: HashMap<&str, Tally<'_>> = HashMap::new();
    for event in events
        .iter()
        .filter(|event| event.created_at_ms >= since_ms && event.created_at_ms <= until_ms)
    {
        let stamp = (event.created_at_ms, event.event_id.as_str());
        let tally = tallies
            .entry(event.beneficiary_id.as_str())
            .or_insert(Tally {
                karma: 0,
                username: event.beneficiary_username.as_str(),
                latest: stamp,
            });
        tally.karma += event.amount;
        if stamp >= tally.latest {
            tally.latest = stamp;
            tally.username = event.beneficiary_username.as_str();
        }
    }

    let mut ranked: Vec<(&str, Tally<'_>)> = tallies.into_iter().collect();
    ranked.sort_by(|(left_id, left), (right_id, right)| {
        right.karma.cmp(&left.karma).then_with(|| left_id.cmp(right_id))
    });

    ranked
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(idx, (user_id, tally))| LeaderboardEntry {
            rank: idx + 1,
            user_id: user_id.to_string(),
            username: tally.username.to_string(),
            karma: tally.karma,
        })
        .collect()
}

/// Top users by karma earned in a trailing window, recomputed from the ledger on every
/// call.
#[derive(Clone)]
pub struct LeaderboardService {
    ledger: Arc<dyn KarmaLedgerRepository>,
}

impl LeaderboardService {
    pub fn new(ledger: Arc<dyn KarmaLedgerRepository>) -> Self {
        Self { ledger }
    }

    pub async fn top_karma(&self, window_hours: u32, k: usize) -> DomainResult<Vec<LeaderboardEntry>> {
        self.top_karma_at(now_ms(), window_hours, k).await
    }

    pub async fn top_karma_at(
        &self,
        now_ms: i64,
        window_hours: u32,
        k: usize,
    ) -> DomainResult<Vec<LeaderboardEntry>> {
        let k = k.min(MAX_LIMIT);
        if k == 0 || window_hours == 0 {
            return Ok(Vec::new());
        }
        let (since_ms, until_ms) = window_bounds(now_ms, window_hours);
        let events = self.ledger.list_events(since_ms, until_ms).await?;
        Ok(rank_karma(&events, since_ms, until_ms, k))
    }
}
