//! SQL shaping shared by the SQLite and Postgres stores.
//!
//! Month columns are linearised with the same `year * 12 + month` ordinal
//! that [`MonthDate::ordinal`] uses, so the WHERE clauses and the cost
//! expression below are the set-based form of
//! [`FilterSpec::matches`] and [`crate::subscription::interval::overlap_cost`].
//!
//! [`MonthDate::ordinal`]: crate::subscription::MonthDate::ordinal

use crate::subscription::{FilterSpec, Pagination, Period};

pub const START_ORDINAL: &str = "(start_year * 12 + start_month)";
pub const END_ORDINAL: &str = "(end_year * 12 + end_month)";

pub const SUBSCRIPTION_COLUMNS: &str = "id, user_id, service_name, price, start_month, start_year, end_month, end_year, created_at, updated_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

impl Dialect {
    fn placeholder(self, n: usize) -> String {
        match self {
            Dialect::Sqlite => format!("?{}", n),
            Dialect::Postgres => format!("${}", n),
        }
    }

    fn least(self) -> &'static str {
        match self {
            Dialect::Sqlite => "MIN",
            Dialect::Postgres => "LEAST",
        }
    }

    fn greatest(self) -> &'static str {
        match self {
            Dialect::Sqlite => "MAX",
            Dialect::Postgres => "GREATEST",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Int(i64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlQuery {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

struct WhereBuilder {
    dialect: Dialect,
    clauses: Vec<String>,
    params: Vec<SqlValue>,
}

impl WhereBuilder {
    fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            clauses: Vec::new(),
            params: Vec::new(),
        }
    }

    fn bind(&mut self, value: SqlValue) -> String {
        self.params.push(value);
        self.dialect.placeholder(self.params.len())
    }

    fn push(&mut self, clause: String) {
        self.clauses.push(clause);
    }

    fn apply_filter(&mut self, filter: &FilterSpec) {
        if !filter.user_ids.is_empty() {
            let slots: Vec<String> = filter
                .user_ids
                .iter()
                .map(|id| self.bind(SqlValue::Text(id.to_string())))
                .collect();
            self.push(format!("user_id IN ({})", slots.join(", ")));
        }
        if !filter.service_names.is_empty() {
            let slots: Vec<String> = filter
                .service_names
                .iter()
                .map(|name| self.bind(SqlValue::Text(name.clone())))
                .collect();
            self.push(format!("service_name IN ({})", slots.join(", ")));
        }
        if let Some(from) = filter.start_from {
            let slot = self.bind(SqlValue::Int(from.ordinal()));
            self.push(format!("(end_year IS NULL OR {} >= {})", END_ORDINAL, slot));
        }
        if let Some(to) = filter.start_to {
            let slot = self.bind(SqlValue::Int(to.ordinal()));
            self.push(format!("{} <= {}", START_ORDINAL, slot));
        }
        match filter.open_ended {
            Some(true) => self.push("end_year IS NULL".to_string()),
            Some(false) => self.push("end_year IS NOT NULL".to_string()),
            None => {}
        }
    }

    fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    fn finish(self, sql: String) -> SqlQuery {
        SqlQuery {
            sql,
            params: self.params,
        }
    }
}

pub fn count_query(dialect: Dialect, filter: &FilterSpec) -> SqlQuery {
    let mut b = WhereBuilder::new(dialect);
    b.apply_filter(filter);
    let sql = format!("SELECT COUNT(*) FROM subscriptions{}", b.where_sql());
    b.finish(sql)
}

pub fn list_query(dialect: Dialect, filter: &FilterSpec, pagination: Pagination) -> SqlQuery {
    let mut b = WhereBuilder::new(dialect);
    b.apply_filter(filter);
    let limit = b.bind(SqlValue::Int(i64::from(pagination.limit)));
    let offset = b.bind(SqlValue::Int(
        i64::try_from(pagination.offset()).unwrap_or(i64::MAX),
    ));
    let sql = format!(
        "SELECT {} FROM subscriptions{} ORDER BY id LIMIT {} OFFSET {}",
        SUBSCRIPTION_COLUMNS,
        b.where_sql(),
        limit,
        offset
    );
    b.finish(sql)
}

/// `SUM(price * overlap_months)` over the rows selected by `filter` that
/// intersect `period`. A NULL end is billed through the period's last month.
pub fn total_cost_query(dialect: Dialect, period: Period, filter: &FilterSpec) -> SqlQuery {
    let mut b = WhereBuilder::new(dialect);
    let period_start = b.bind(SqlValue::Int(period.start.ordinal()));
    let period_end = b.bind(SqlValue::Int(period.end.ordinal()));
    b.push(format!("{} <= {}", START_ORDINAL, period_end));
    b.push(format!(
        "(end_year IS NULL OR {} >= {})",
        END_ORDINAL, period_start
    ));
    b.apply_filter(filter);

    let overlap = format!(
        "({least}(COALESCE({end}, {pe}), {pe}) - {greatest}({start}, {ps}) + 1)",
        least = dialect.least(),
        greatest = dialect.greatest(),
        end = END_ORDINAL,
        start = START_ORDINAL,
        pe = period_end,
        ps = period_start,
    );
    let sql = format!(
        "SELECT CAST(COALESCE(SUM(price * {}), 0) AS BIGINT) FROM subscriptions{}",
        overlap,
        b.where_sql()
    );
    b.finish(sql)
}
