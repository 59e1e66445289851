use std::hint::black_box;

use chrono::Utc;
use criterion::{Criterion, criterion_group, criterion_main};
use subledger::subscription::{FilterSpec, MonthDate, Period, Subscription};
use uuid::Uuid;

const SERVICES: [&str; 5] = ["Netflix", "Spotify", "Yandex Plus", "iCloud", "YouTube Premium"];

fn fixture(users: usize) -> Vec<Subscription> {
    let now = Utc::now();
    let base = MonthDate::parse("01-2020").unwrap().ordinal();
    let mut subs = Vec::with_capacity(users * SERVICES.len());
    for u in 0..users {
        let user = Uuid::from_u128(u as u128 + 1);
        for (i, name) in SERVICES.iter().enumerate() {
            let start = MonthDate::from_ordinal(base + ((u * 7 + i * 3) % 60) as i64).unwrap();
            let end = if (u + i) % 3 == 0 {
                None
            } else {
                Some(MonthDate::from_ordinal(start.ordinal() + ((u + i) % 24) as i64).unwrap())
            };
            subs.push(
                Subscription::create(name, 100 + (u % 50) as i64, user, start, end, now).unwrap(),
            );
        }
    }
    subs
}

fn total(subs: &[Subscription], period: Period, filter: &FilterSpec) -> i64 {
    filter.total_cost(subs, period).unwrap()
}

fn bench_aggregation(c: &mut Criterion) {
    let subs = fixture(2_000);
    let period = Period::new(
        MonthDate::parse("03-2022").unwrap(),
        MonthDate::parse("12-2023").unwrap(),
    )
    .unwrap();
    let everyone = FilterSpec::default();
    let one_service = FilterSpec::for_owners(Default::default(), ["Spotify".to_string()].into());

    c.bench_function("total_cost_unfiltered_10k", |b| {
        b.iter(|| total(black_box(&subs), black_box(period), black_box(&everyone)))
    });
    c.bench_function("total_cost_by_service_10k", |b| {
        b.iter(|| total(black_box(&subs), black_box(period), black_box(&one_service)))
    });
}

criterion_group!(benches, bench_aggregation);
criterion_main!(benches);
