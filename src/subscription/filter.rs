use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LedgerError, Result};
use crate::subscription::interval::{self, Period};
use crate::subscription::model::Subscription;
use crate::subscription::month_date::{MonthDate, YearBounds};

/// Unvalidated selection criteria as received from a caller.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterQuery {
    #[serde(default)]
    pub user_ids: Vec<String>,
    #[serde(default)]
    pub service_names: Vec<String>,
    #[serde(default)]
    pub start_date_from: Option<String>,
    #[serde(default)]
    pub start_date_to: Option<String>,
    #[serde(default)]
    pub end_date_null: Option<bool>,
}

/// Validated selection criteria. Empty sets place no constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterSpec {
    pub user_ids: BTreeSet<Uuid>,
    pub service_names: BTreeSet<String>,
    pub start_from: Option<MonthDate>,
    pub start_to: Option<MonthDate>,
    pub open_ended: Option<bool>,
}

impl FilterSpec {
    pub fn validate(query: &FilterQuery, bounds: YearBounds) -> Result<Self> {
        let mut user_ids = BTreeSet::new();
        for raw in &query.user_ids {
            let id = Uuid::parse_str(raw.trim()).map_err(|_| {
                LedgerError::validation("user_ids", format!("'{}' is not a valid UUID", raw))
            })?;
            if id.is_nil() {
                return Err(LedgerError::validation("user_ids", "nil UUID is not allowed"));
            }
            user_ids.insert(id);
        }

        let service_names = query
            .service_names
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        let start_from = parse_bound(query.start_date_from.as_deref(), "start_date_from", bounds)?;
        let start_to = parse_bound(query.start_date_to.as_deref(), "start_date_to", bounds)?;
        if let (Some(from), Some(to)) = (start_from, start_to) {
            if from > to {
                return Err(LedgerError::validation(
                    "date_range",
                    "start_date_from cannot be after start_date_to",
                ));
            }
        }

        Ok(Self {
            user_ids,
            service_names,
            start_from,
            start_to,
            open_ended: query.end_date_null,
        })
    }

    /// Owner/service-only filter, as used by total cost queries.
    pub fn for_owners(user_ids: BTreeSet<Uuid>, service_names: BTreeSet<String>) -> Self {
        Self {
            user_ids,
            service_names,
            ..Default::default()
        }
    }

    /// In-process inclusion predicate. Store queries must select exactly the
    /// subscriptions this returns `true` for.
    pub fn matches(&self, sub: &Subscription) -> bool {
        if !self.user_ids.is_empty() && !self.user_ids.contains(&sub.user_id) {
            return false;
        }
        if !self.service_names.is_empty() && !self.service_names.contains(&sub.service_name) {
            return false;
        }
        if let Some(open) = self.open_ended {
            if sub.end.is_none() != open {
                return false;
            }
        }
        interval::intersects(sub.start, sub.end, self.start_from, self.start_to)
    }

    /// Sum of `cost_for_period` over the matching subscriptions. Fails with
    /// an overflow error instead of wrapping.
    pub fn total_cost<'a>(
        &self,
        subs: impl IntoIterator<Item = &'a Subscription>,
        period: Period,
    ) -> Result<i64> {
        subs.into_iter()
            .filter(|s| self.matches(s))
            .try_fold(0i64, |acc, s| {
                acc.checked_add(s.cost_for_period(period)?)
                    .ok_or_else(LedgerError::cost_overflow)
            })
    }
}

fn parse_bound(raw: Option<&str>, field: &str, bounds: YearBounds) -> Result<Option<MonthDate>> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    MonthDate::parse_within(raw, bounds)
        .map(Some)
        .map_err(|e| match e {
            LedgerError::Validation { reason, .. } => LedgerError::validation(field, reason),
            other => other,
        })
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Pagination {
    /// Clamps rather than rejects: page < 1 becomes 1, a missing or
    /// non-positive limit becomes `default_limit`, and anything above
    /// `max_limit` is cut down to it.
    pub fn clamp(query: PageQuery, default_limit: u32, max_limit: u32) -> Self {
        let page = query
            .page
            .filter(|p| *p >= 1)
            .map_or(1, |p| u32::try_from(p).unwrap_or(u32::MAX));
        let limit = match query.limit {
            Some(l) if l >= 1 => u32::try_from(l).unwrap_or(u32::MAX).min(max_limit),
            _ => default_limit.min(max_limit),
        };
        Self { page, limit }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaginationMeta {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

impl PaginationMeta {
    pub fn new(pagination: Pagination, total: u64) -> Self {
        Self {
            page: pagination.page,
            limit: pagination.limit,
            total,
            total_pages: total.div_ceil(u64::from(pagination.limit.max(1))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn m(s: &str) -> MonthDate {
        MonthDate::parse(s).unwrap()
    }

    fn sub(user: Uuid, name: &str, start: &str, end: Option<&str>) -> Subscription {
        Subscription::create(name, 100, user, m(start), end.map(m), Utc::now()).unwrap()
    }

    #[test]
    fn total_cost_sums_matches_and_reports_overflow() {
        let user = Uuid::new_v4();
        let period = Period::new(m("01-2024"), m("12-2024")).unwrap();
        let subs = vec![
            sub(user, "Netflix", "01-2024", Some("06-2024")),
            sub(user, "Spotify", "07-2024", None),
            sub(Uuid::new_v4(), "iCloud", "01-2024", None),
        ];
        let owner = FilterSpec::for_owners([user].into(), BTreeSet::new());
        assert_eq!(owner.total_cost(&subs, period).unwrap(), 1200);

        let mut big = subs.clone();
        for s in &mut big {
            s.price = i64::MAX / 4;
        }
        let err = FilterSpec::default().total_cost(&big, period).unwrap_err();
        assert!(matches!(err, LedgerError::Overflow(_)));
    }

    #[test]
    fn validate_normalizes_criteria() {
        let user = Uuid::new_v4();
        let query = FilterQuery {
            user_ids: vec![user.to_string(), format!(" {} ", user)],
            service_names: vec![" Netflix ".into(), "".into(), "Netflix".into()],
            start_date_from: Some("01-2024".into()),
            start_date_to: None,
            end_date_null: None,
        };
        let spec = FilterSpec::validate(&query, YearBounds::default()).unwrap();
        assert_eq!(spec.user_ids.len(), 1);
        assert_eq!(spec.service_names.len(), 1);
        assert_eq!(spec.start_from, Some(m("01-2024")));
    }

    #[test]
    fn validate_names_the_offending_field() {
        let bounds = YearBounds::default();
        let bad_id = FilterQuery {
            user_ids: vec!["not-a-uuid".into()],
            ..Default::default()
        };
        assert_eq!(
            FilterSpec::validate(&bad_id, bounds).unwrap_err().field(),
            Some("user_ids")
        );

        let nil_id = FilterQuery {
            user_ids: vec![Uuid::nil().to_string()],
            ..Default::default()
        };
        assert_eq!(
            FilterSpec::validate(&nil_id, bounds).unwrap_err().field(),
            Some("user_ids")
        );

        let bad_to = FilterQuery {
            start_date_to: Some("2024-01".into()),
            ..Default::default()
        };
        assert_eq!(
            FilterSpec::validate(&bad_to, bounds).unwrap_err().field(),
            Some("start_date_to")
        );

        let inverted = FilterQuery {
            start_date_from: Some("05-2024".into()),
            start_date_to: Some("04-2024".into()),
            ..Default::default()
        };
        assert_eq!(
            FilterSpec::validate(&inverted, bounds).unwrap_err().field(),
            Some("date_range")
        );
    }

    #[test]
    fn matches_applies_every_supplied_constraint() {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let netflix = sub(alice, "Netflix", "01-2024", Some("06-2024"));
        let spotify = sub(bob, "Spotify", "03-2024", None);

        let by_owner = FilterSpec::for_owners([alice].into(), BTreeSet::new());
        assert!(by_owner.matches(&netflix));
        assert!(!by_owner.matches(&spotify));

        let by_service = FilterSpec::for_owners(BTreeSet::new(), ["Spotify".to_string()].into());
        assert!(!by_service.matches(&netflix));
        assert!(by_service.matches(&spotify));

        let late = FilterSpec {
            start_from: Some(m("07-2024")),
            ..Default::default()
        };
        assert!(!late.matches(&netflix));
        assert!(late.matches(&spotify));

        let early = FilterSpec {
            start_to: Some(m("02-2024")),
            ..Default::default()
        };
        assert!(early.matches(&netflix));
        assert!(!early.matches(&spotify));

        let open_only = FilterSpec {
            open_ended: Some(true),
            ..Default::default()
        };
        assert!(!open_only.matches(&netflix));
        assert!(open_only.matches(&spotify));
    }

    #[test]
    fn pagination_is_clamped() {
        let p = Pagination::clamp(PageQuery { page: Some(0), limit: Some(0) }, 20, 100);
        assert_eq!(p, Pagination { page: 1, limit: 20 });
        let p = Pagination::clamp(PageQuery { page: Some(-3), limit: Some(500) }, 20, 100);
        assert_eq!(p, Pagination { page: 1, limit: 100 });
        let p = Pagination::clamp(PageQuery { page: Some(3), limit: None }, 20, 100);
        assert_eq!(p, Pagination { page: 3, limit: 20 });
        assert_eq!(p.offset(), 40);
    }

    #[test]
    fn total_pages_rounds_up() {
        let p = Pagination { page: 1, limit: 20 };
        assert_eq!(PaginationMeta::new(p, 0).total_pages, 0);
        assert_eq!(PaginationMeta::new(p, 20).total_pages, 1);
        assert_eq!(PaginationMeta::new(p, 21).total_pages, 2);
    }
}
