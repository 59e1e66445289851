use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{LedgerError, Result};
use crate::subscription::interval::{self, Period};
use crate::subscription::month_date::{MonthDate, YearBounds};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub service_name: String,
    pub price: i64,
    pub start: MonthDate,
    pub end: Option<MonthDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Range check shared by creation, full replacement and partial updates.
pub fn validate_dates(start: MonthDate, end: Option<MonthDate>) -> Result<()> {
    match end {
        Some(end) if start > end => Err(LedgerError::validation(
            "date_range",
            "start date cannot be after end date",
        )),
        _ => Ok(()),
    }
}

/// Parses a `start`/`end` text pair and checks the range.
pub fn parse_dates(
    start: &str,
    end: Option<&str>,
    bounds: YearBounds,
) -> Result<(MonthDate, Option<MonthDate>)> {
    let start = MonthDate::parse_within(start, bounds)?;
    let end = end
        .map(|e| MonthDate::parse_within(e, bounds))
        .transpose()?;
    validate_dates(start, end)?;
    Ok((start, end))
}

fn validate_service_name(service_name: &str) -> Result<()> {
    if service_name.trim().is_empty() {
        return Err(LedgerError::validation(
            "service_name",
            "service name is required",
        ));
    }
    Ok(())
}

/// Largest accepted price in minor units. Keeps `price * months` and the
/// per-row SQL products well inside `i64`.
pub const MAX_PRICE: i64 = i32::MAX as i64;

fn validate_price(price: i64) -> Result<()> {
    if price <= 0 {
        return Err(LedgerError::validation("price", "price must be positive"));
    }
    if price > MAX_PRICE {
        return Err(LedgerError::validation(
            "price",
            format!("price must not exceed {}", MAX_PRICE),
        ));
    }
    Ok(())
}

fn validate_user_id(user_id: Uuid) -> Result<()> {
    if user_id.is_nil() {
        return Err(LedgerError::validation("user_id", "user ID is required"));
    }
    Ok(())
}

impl Subscription {
    /// Builds a new subscription with a fresh identity. `now` becomes both
    /// audit timestamps.
    pub fn create(
        service_name: &str,
        price: i64,
        user_id: Uuid,
        start: MonthDate,
        end: Option<MonthDate>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let sub = Self {
            id: Uuid::new_v4(),
            user_id,
            service_name: service_name.trim().to_string(),
            price,
            start,
            end,
            created_at: now,
            updated_at: now,
        };
        sub.validate()?;
        Ok(sub)
    }

    pub fn validate(&self) -> Result<()> {
        validate_service_name(&self.service_name)?;
        validate_price(self.price)?;
        validate_user_id(self.user_id)?;
        validate_dates(self.start, self.end)
    }

    pub fn is_active_on(&self, reference: MonthDate) -> bool {
        interval::contains(self.start, self.end, reference)
    }

    pub fn overlap_months(&self, period: Period) -> i64 {
        interval::overlap_months(self.start, self.end, period)
    }

    pub fn cost_for_period(&self, period: Period) -> Result<i64> {
        interval::overlap_cost(self.start, self.end, self.price, period)
    }

    /// Applies a sparse update and revalidates the result against the
    /// current values of the fields the patch leaves alone.
    pub fn apply_patch(&mut self, patch: &SubscriptionPatch, now: DateTime<Utc>) -> Result<()> {
        let start = patch.start.unwrap_or(self.start);
        let end = match patch.end {
            Some(end) => end,
            None => self.end,
        };
        validate_dates(start, end)?;
        if let Some(name) = &patch.service_name {
            validate_service_name(name)?;
        }
        if let Some(price) = patch.price {
            validate_price(price)?;
        }
        if let Some(user_id) = patch.user_id {
            validate_user_id(user_id)?;
        }

        if let Some(name) = &patch.service_name {
            self.service_name = name.trim().to_string();
        }
        if let Some(price) = patch.price {
            self.price = price;
        }
        if let Some(user_id) = patch.user_id {
            self.user_id = user_id;
        }
        self.start = start;
        self.end = end;
        self.updated_at = now;
        Ok(())
    }
}

/// Fields supplied by a partial update. `end: Some(None)` clears the end
/// month and makes the subscription open-ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionPatch {
    pub service_name: Option<String>,
    pub price: Option<i64>,
    pub user_id: Option<Uuid>,
    pub start: Option<MonthDate>,
    pub end: Option<Option<MonthDate>>,
}

impl SubscriptionPatch {
    pub fn is_empty(&self) -> bool {
        self.service_name.is_none()
            && self.price.is_none()
            && self.user_id.is_none()
            && self.start.is_none()
            && self.end.is_none()
    }

    pub fn touches_dates(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }
}
