//! Daily spend tracking per API.
//!
//! Each API has a running total for the current day, measured in the
//! ledger's configured timezone, plus warning and critical thresholds. A
//! caller first [`reserve`](BudgetLedger::reserve)s its cost estimate; the
//! reservation is settled with the actual cost on success or released
//! otherwise, so concurrent callers cannot jointly overshoot the critical
//! threshold through estimates. Totals reset lazily at the day boundary.
//!
//! Lock order is always API ledger, then global ledger.

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use dashmap::DashMap;
use gateway_config::{BudgetConfig, LedgerConfig};
use gateway_core::{ApiId, BudgetSignal, Cost};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Which limit denied a reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetScope {
    /// The API's own critical threshold
    Api,
    /// The combined daily cap across APIs
    Global,
}

/// A reservation was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{scope:?} budget exhausted: spent {spent} of {critical}")]
pub struct BudgetExceeded {
    /// Amount spent today, including outstanding reservations
    pub spent: Cost,
    /// Critical threshold in force
    pub critical: Cost,
    /// Limit that refused the reservation
    pub scope: BudgetScope,
}

/// Budget administration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BudgetError {
    /// Warning threshold above critical
    #[error("warning threshold {warning} exceeds critical threshold {critical}")]
    InvalidThresholds {
        /// Requested warning threshold
        warning: Cost,
        /// Requested critical threshold
        critical: Cost,
    },
}

#[derive(Debug)]
struct ApiLedger {
    day: NaiveDate,
    thresholds: BudgetConfig,
    spent: Cost,
    reserved: Cost,
    overridden: bool,
}

impl ApiLedger {
    fn roll(&mut self, api: ApiId, today: NaiveDate) {
        if self.day != today {
            info!(
                api = %api,
                previous_day = %self.day,
                spent = %self.spent,
                "Budget day rolled over"
            );
            self.day = today;
            self.spent = Cost::ZERO;
            self.reserved = Cost::ZERO;
            self.overridden = false;
        }
    }

    /// Add `amount` to the day's total and report which threshold it crossed
    fn charge(&mut self, api: ApiId, amount: Cost) -> BudgetSignal {
        let before = self.spent;
        self.spent = self.spent.saturating_add(amount);
        let after = self.spent;
        let BudgetConfig { warning, critical } = self.thresholds;

        let signal = if before < critical && after >= critical {
            BudgetSignal::CriticalExceeded
        } else if before < warning && after >= warning {
            BudgetSignal::WarningCrossed
        } else {
            BudgetSignal::Ok
        };

        match signal {
            BudgetSignal::CriticalExceeded => {
                warn!(api = %api, spent = %after, critical = %critical, "Budget critical threshold exceeded");
            }
            BudgetSignal::WarningCrossed => {
                warn!(api = %api, spent = %after, warning = %warning, "Budget warning threshold crossed");
            }
            BudgetSignal::Ok => {
                debug!(api = %api, amount = %amount, spent = %after, "Budget charged");
            }
        }
        signal
    }
}

#[derive(Debug)]
struct GlobalLedger {
    day: NaiveDate,
    spent: Cost,
    reserved: Cost,
    critical: Option<Cost>,
}

impl GlobalLedger {
    fn roll(&mut self, today: NaiveDate) {
        if self.day != today {
            self.day = today;
            self.spent = Cost::ZERO;
            self.reserved = Cost::ZERO;
        }
    }

    fn charge(&mut self, amount: Cost) {
        let before = self.spent;
        self.spent = self.spent.saturating_add(amount);
        if let Some(critical) = self.critical {
            if before < critical && self.spent >= critical {
                warn!(spent = %self.spent, critical = %critical, "Global budget cap reached");
            }
        }
    }
}

/// Read-only view of one API's budget
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BudgetSnapshot {
    /// Ledger day the totals belong to
    pub day: NaiveDate,
    /// Charged today
    pub spent: Cost,
    /// Outstanding reservations
    pub reserved: Cost,
    /// Warning threshold
    pub warning: Cost,
    /// Critical threshold
    pub critical: Cost,
    /// Whether the critical denial is lifted until the day boundary
    pub overridden: bool,
}

/// Read-only view of the combined budget
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlobalBudgetSnapshot {
    /// Ledger day the totals belong to
    pub day: NaiveDate,
    /// Charged today across all APIs
    pub spent: Cost,
    /// Outstanding reservations across all APIs
    pub reserved: Cost,
    /// Combined cap, if any
    pub critical: Option<Cost>,
}

/// Outstanding claim on today's budget
///
/// Settle it with [`settle`](Self::settle) once the actual cost is known, or
/// [`release`](Self::release) it when the call is not charged. Dropping it
/// unsettled releases it.
#[must_use = "a reservation holds budget until it is settled or released"]
pub struct Reservation {
    api: ApiId,
    amount: Cost,
    day: NaiveDate,
    offset: FixedOffset,
    ledger: Arc<Mutex<ApiLedger>>,
    global: Arc<Mutex<GlobalLedger>>,
    settled: bool,
}

impl Reservation {
    /// API the reservation belongs to
    #[must_use]
    pub fn api(&self) -> ApiId {
        self.api
    }

    /// Reserved amount
    #[must_use]
    pub fn amount(&self) -> Cost {
        self.amount
    }

    /// Replace the reservation with the actual cost
    pub fn settle(mut self, actual: Cost, now: DateTime<Utc>) -> BudgetSignal {
        self.settled = true;
        let today = day_of(now, self.offset);

        let mut ledger = self.ledger.lock();
        ledger.roll(self.api, today);
        if ledger.day == self.day {
            ledger.reserved = ledger.reserved.saturating_sub(self.amount);
        }
        let signal = ledger.charge(self.api, actual);

        let mut global = self.global.lock();
        global.roll(today);
        if global.day == self.day {
            global.reserved = global.reserved.saturating_sub(self.amount);
        }
        global.charge(actual);

        signal
    }

    /// Give the reserved amount back without charging anything
    pub fn release(mut self) {
        self.settled = true;
        self.unreserve();
    }

    fn unreserve(&self) {
        let mut ledger = self.ledger.lock();
        if ledger.day == self.day {
            ledger.reserved = ledger.reserved.saturating_sub(self.amount);
        }
        let mut global = self.global.lock();
        if global.day == self.day {
            global.reserved = global.reserved.saturating_sub(self.amount);
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.settled {
            self.unreserve();
        }
    }
}

impl std::fmt::Debug for Reservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reservation")
            .field("api", &self.api)
            .field("amount", &self.amount)
            .field("day", &self.day)
            .finish()
    }
}

/// Daily budget ledger for every API
pub struct BudgetLedger {
    offset: FixedOffset,
    thresholds: HashMap<ApiId, BudgetConfig>,
    ledgers: DashMap<ApiId, Arc<Mutex<ApiLedger>>>,
    global: Arc<Mutex<GlobalLedger>>,
}

fn day_of(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    now.with_timezone(&offset).date_naive()
}

impl BudgetLedger {
    /// Create a ledger; APIs without thresholds use the defaults
    #[must_use]
    pub fn new(config: &LedgerConfig) -> Self {
        let offset = FixedOffset::east_opt(config.utc_offset_minutes * 60).unwrap_or_else(|| {
            warn!(
                utc_offset_minutes = config.utc_offset_minutes,
                "Invalid budget timezone offset, using UTC"
            );
            Utc.fix()
        });

        Self {
            offset,
            thresholds: HashMap::new(),
            ledgers: DashMap::new(),
            global: Arc::new(Mutex::new(GlobalLedger {
                day: NaiveDate::MIN,
                spent: Cost::ZERO,
                reserved: Cost::ZERO,
                critical: config.global_critical,
            })),
        }
    }

    /// Set the initial thresholds for one API
    #[must_use]
    pub fn with_thresholds(mut self, api: ApiId, thresholds: BudgetConfig) -> Self {
        self.thresholds.insert(api, thresholds);
        self
    }

    fn ledger(&self, api: ApiId, today: NaiveDate) -> Arc<Mutex<ApiLedger>> {
        let entry = self.ledgers.entry(api).or_insert_with(|| {
            Arc::new(Mutex::new(ApiLedger {
                day: today,
                thresholds: self.thresholds.get(&api).copied().unwrap_or_default(),
                spent: Cost::ZERO,
                reserved: Cost::ZERO,
                overridden: false,
            }))
        });
        Arc::clone(entry.value())
    }

    /// Ledger day containing `now`
    #[must_use]
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        day_of(now, self.offset)
    }

    /// Claim `estimate` against today's budget for `api`
    ///
    /// Refused when today's total has reached the critical threshold, or when
    /// total + outstanding reservations + `estimate` would exceed it. An
    /// override lifts the API threshold but not the global cap.
    ///
    /// # Errors
    /// Returns `BudgetExceeded` when the claim is refused
    pub fn reserve(
        &self,
        api: ApiId,
        estimate: Cost,
        now: DateTime<Utc>,
    ) -> Result<Reservation, BudgetExceeded> {
        let today = self.today(now);
        let ledger = self.ledger(api, today);
        let mut api_ledger = ledger.lock();
        api_ledger.roll(api, today);

        if !api_ledger.overridden {
            let critical = api_ledger.thresholds.critical;
            let committed = api_ledger.spent.saturating_add(api_ledger.reserved);
            if api_ledger.spent >= critical || committed.saturating_add(estimate) > critical {
                debug!(api = %api, spent = %api_ledger.spent, reserved = %api_ledger.reserved, "Budget denied");
                return Err(BudgetExceeded {
                    spent: committed,
                    critical,
                    scope: BudgetScope::Api,
                });
            }
        }

        let mut global = self.global.lock();
        global.roll(today);
        if let Some(critical) = global.critical {
            let committed = global.spent.saturating_add(global.reserved);
            if global.spent >= critical || committed.saturating_add(estimate) > critical {
                debug!(api = %api, spent = %global.spent, "Global budget denied");
                return Err(BudgetExceeded {
                    spent: committed,
                    critical,
                    scope: BudgetScope::Global,
                });
            }
        }

        api_ledger.reserved = api_ledger.reserved.saturating_add(estimate);
        global.reserved = global.reserved.saturating_add(estimate);

        Ok(Reservation {
            api,
            amount: estimate,
            day: today,
            offset: self.offset,
            ledger: Arc::clone(&ledger),
            global: Arc::clone(&self.global),
            settled: false,
        })
    }

    /// Charge `amount` to today's total without a reservation
    pub fn charge(&self, api: ApiId, amount: Cost, now: DateTime<Utc>) -> BudgetSignal {
        let today = self.today(now);
        let ledger = self.ledger(api, today);
        let mut api_ledger = ledger.lock();
        api_ledger.roll(api, today);
        let signal = api_ledger.charge(api, amount);

        let mut global = self.global.lock();
        global.roll(today);
        global.charge(amount);

        signal
    }

    /// Replace an API's thresholds at runtime
    ///
    /// # Errors
    /// Returns `BudgetError::InvalidThresholds` if warning exceeds critical
    pub fn set_thresholds(
        &self,
        api: ApiId,
        thresholds: BudgetConfig,
        now: DateTime<Utc>,
    ) -> Result<(), BudgetError> {
        if thresholds.warning > thresholds.critical {
            return Err(BudgetError::InvalidThresholds {
                warning: thresholds.warning,
                critical: thresholds.critical,
            });
        }

        let today = self.today(now);
        let ledger = self.ledger(api, today);
        let mut api_ledger = ledger.lock();
        api_ledger.roll(api, today);
        api_ledger.thresholds = thresholds;

        info!(
            api = %api,
            warning = %thresholds.warning,
            critical = %thresholds.critical,
            "Budget thresholds updated"
        );
        Ok(())
    }

    /// Lift the critical denial for `api` until the next day boundary
    pub fn override_budget(&self, api: ApiId, now: DateTime<Utc>) {
        let today = self.today(now);
        let ledger = self.ledger(api, today);
        let mut api_ledger = ledger.lock();
        api_ledger.roll(api, today);
        api_ledger.overridden = true;

        warn!(api = %api, day = %today, spent = %api_ledger.spent, "Budget override enabled");
    }

    /// Today's totals for one API
    #[must_use]
    pub fn snapshot(&self, api: ApiId, now: DateTime<Utc>) -> BudgetSnapshot {
        let today = self.today(now);
        let ledger = self.ledger(api, today);
        let mut api_ledger = ledger.lock();
        api_ledger.roll(api, today);

        BudgetSnapshot {
            day: api_ledger.day,
            spent: api_ledger.spent,
            reserved: api_ledger.reserved,
            warning: api_ledger.thresholds.warning,
            critical: api_ledger.thresholds.critical,
            overridden: api_ledger.overridden,
        }
    }

    /// Today's combined totals
    #[must_use]
    pub fn global_snapshot(&self, now: DateTime<Utc>) -> GlobalBudgetSnapshot {
        let mut global = self.global.lock();
        global.roll(self.today(now));

        GlobalBudgetSnapshot {
            day: global.day,
            spent: global.spent,
            reserved: global.reserved,
            critical: global.critical,
        }
    }
}
