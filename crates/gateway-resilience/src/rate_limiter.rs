//! Fixed-window rate limiting per API.
//!
//! Each API carries three independent windows (per second, per minute, per
//! day) aligned to UTC epoch boundaries. A call is admitted only if every
//! configured window has headroom, and admission increments all of them in
//! one critical section so concurrent callers can never overshoot a limit.

use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use gateway_config::RateLimitConfig;
use gateway_core::clock::elapsed;
use gateway_core::ApiId;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Window granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// One-second window
    Second,
    /// One-minute window
    Minute,
    /// One-day window (UTC)
    Day,
}

impl Granularity {
    /// All granularities, finest first
    pub const ALL: [Granularity; 3] = [Self::Second, Self::Minute, Self::Day];

    /// Window length in seconds
    #[must_use]
    pub const fn span_secs(&self) -> i64 {
        match self {
            Self::Second => 1,
            Self::Minute => 60,
            Self::Day => 86_400,
        }
    }

    /// Label for logs and metrics
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Second => "second",
            Self::Minute => "minute",
            Self::Day => "day",
        }
    }

    fn limit(&self, config: &RateLimitConfig) -> Option<u32> {
        match self {
            Self::Second => config.per_second,
            Self::Minute => config.per_minute,
            Self::Day => config.per_day,
        }
    }

    /// Start of the window containing `now`
    fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let ts = now.timestamp();
        let start = ts - ts.rem_euclid(self.span_secs());
        Utc.timestamp_opt(start, 0).single().unwrap_or(now)
    }
}

/// Admission decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The call may proceed; every window has been incremented
    Allowed,
    /// The call was rejected; no window was incremented
    Denied {
        /// Time until every exhausted window has reset
        retry_after: Duration,
        /// Exhausted window that resets last
        granularity: Granularity,
    },
}

impl Admission {
    /// Check if the call was admitted
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

#[derive(Debug, Clone)]
struct RateWindow {
    granularity: Granularity,
    limit: Option<u32>,
    count: u32,
    window_start: DateTime<Utc>,
}

impl RateWindow {
    fn new(granularity: Granularity, limit: Option<u32>, now: DateTime<Utc>) -> Self {
        Self {
            granularity,
            limit,
            count: 0,
            window_start: granularity.window_start(now),
        }
    }

    fn window_end(&self) -> DateTime<Utc> {
        self.window_start + chrono::Duration::seconds(self.granularity.span_secs())
    }

    /// Reset the count once `now` has crossed the window's end boundary
    fn roll(&mut self, now: DateTime<Utc>) {
        if now >= self.window_end() {
            self.count = 0;
            self.window_start = self.granularity.window_start(now);
        }
    }

    fn has_headroom(&self) -> bool {
        self.limit.map_or(true, |limit| self.count < limit)
    }

    fn resets_in(&self, now: DateTime<Utc>) -> Duration {
        elapsed(now, self.window_end())
    }
}

/// The three windows of one API, guarded together
#[derive(Debug)]
struct ApiWindows {
    windows: [RateWindow; 3],
}

impl ApiWindows {
    fn new(config: &RateLimitConfig, now: DateTime<Utc>) -> Self {
        Self {
            windows: Granularity::ALL.map(|g| RateWindow::new(g, g.limit(config), now)),
        }
    }

    fn admit(&mut self, now: DateTime<Utc>) -> Admission {
        for window in &mut self.windows {
            window.roll(now);
        }

        let blocking = self
            .windows
            .iter()
            .filter(|w| !w.has_headroom())
            .map(|w| (w.resets_in(now), w.granularity))
            .max_by_key(|(resets_in, _)| *resets_in);

        if let Some((retry_after, granularity)) = blocking {
            return Admission::Denied {
                retry_after,
                granularity,
            };
        }

        for window in &mut self.windows {
            window.count = window.count.saturating_add(1);
        }
        Admission::Allowed
    }

    fn occupancy(&self, now: DateTime<Utc>) -> Vec<WindowOccupancy> {
        self.windows
            .iter()
            .map(|w| {
                let mut w = w.clone();
                w.roll(now);
                WindowOccupancy {
                    granularity: w.granularity,
                    limit: w.limit,
                    count: w.count,
                    resets_in: w.resets_in(now),
                }
            })
            .collect()
    }
}

/// Read-only view of one window
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowOccupancy {
    /// Window granularity
    pub granularity: Granularity,
    /// Configured limit, `None` when unlimited
    pub limit: Option<u32>,
    /// Calls admitted in the current window
    pub count: u32,
    /// Time until the window resets
    #[serde(with = "humantime_serde")]
    pub resets_in: Duration,
}

impl WindowOccupancy {
    /// Remaining admissions in the current window, `None` when unlimited
    #[must_use]
    pub fn remaining(&self) -> Option<u32> {
        self.limit.map(|limit| limit.saturating_sub(self.count))
    }
}

/// Rate limiter holding lazily created windows for every API
#[derive(Default)]
pub struct RateLimiter {
    /// Limits per API; an API without an entry is unlimited
    limits: HashMap<ApiId, RateLimitConfig>,
    /// Per-API windows, each behind its own lock
    windows: DashMap<ApiId, Arc<Mutex<ApiWindows>>>,
}

impl RateLimiter {
    /// Create a rate limiter with no limits configured
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the limits for one API
    #[must_use]
    pub fn with_limits(mut self, api: ApiId, limits: RateLimitConfig) -> Self {
        self.limits.insert(api, limits);
        self
    }

    /// Configured limits for an API
    #[must_use]
    pub fn limits(&self, api: ApiId) -> RateLimitConfig {
        self.limits.get(&api).cloned().unwrap_or(RateLimitConfig {
            per_second: None,
            per_minute: None,
            per_day: None,
        })
    }

    fn windows_for(&self, api: ApiId, now: DateTime<Utc>) -> Arc<Mutex<ApiWindows>> {
        let entry = self
            .windows
            .entry(api)
            .or_insert_with(|| Arc::new(Mutex::new(ApiWindows::new(&self.limits(api), now))));
        Arc::clone(entry.value())
    }

    /// Try to admit one call for `api` at `now`
    pub fn admit(&self, api: ApiId, now: DateTime<Utc>) -> Admission {
        let windows = self.windows_for(api, now);
        let admission = windows.lock().admit(now);

        match admission {
            Admission::Allowed => {
                debug!(api = %api, "Rate limit check passed");
            }
            Admission::Denied {
                retry_after,
                granularity,
            } => {
                warn!(
                    api = %api,
                    granularity = granularity.as_str(),
                    retry_after_ms = retry_after.as_millis() as u64,
                    "Rate limit exceeded"
                );
            }
        }
        admission
    }

    /// Current occupancy of every window for `api`
    #[must_use]
    pub fn occupancy(&self, api: ApiId, now: DateTime<Utc>) -> Vec<WindowOccupancy> {
        match self.windows.get(&api).map(|entry| Arc::clone(entry.value())) {
            Some(windows) => windows.lock().occupancy(now),
            None => ApiWindows::new(&self.limits(api), now).occupancy(now),
        }
    }

    /// Clear every window for `api`
    pub fn reset(&self, api: ApiId) {
        if self.windows.remove(&api).is_some() {
            debug!(api = %api, "Rate limit windows reset");
        }
    }
}
