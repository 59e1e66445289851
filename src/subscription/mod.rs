pub mod filter;
pub mod interval;
pub mod model;
pub mod month_date;
pub mod store;

pub use filter::{FilterQuery, FilterSpec, PageQuery, Pagination, PaginationMeta};
pub use interval::Period;
pub use model::{MAX_PRICE, Subscription, SubscriptionPatch, parse_dates, validate_dates};
pub use month_date::{MonthDate, YearBounds};
pub use store::SubscriptionStore;
