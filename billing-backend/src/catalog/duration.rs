// billing-backend/src/catalog/duration.rs

use super::model::{Duration, TimeUnit};
use crate::error::CatalogError;
use chrono::{DateTime, Days, Months, Utc};

impl Duration {
    /// 日時にこの期間を加算する
    pub fn add_to(&self, date: DateTime<Utc>) -> Result<DateTime<Utc>, CatalogError> {
        shift(date, self, true)
    }
}

/// 期間のリストを順に加算（`add == false` なら減算）する
///
/// 月・年の移動は暦の月末に丸められる（1/31 + 1ヶ月 = 2/28 or 2/29）。
/// `UNLIMITED` は移動できないため `CatalogError::UnlimitedDuration` を返す。
pub fn add_or_remove_duration(
    input: DateTime<Utc>,
    durations: &[Duration],
    add: bool,
) -> Result<DateTime<Utc>, CatalogError> {
    durations
        .iter()
        .try_fold(input, |result, duration| shift(result, duration, add))
}

pub fn add_durations(
    input: DateTime<Utc>,
    durations: &[Duration],
) -> Result<DateTime<Utc>, CatalogError> {
    add_or_remove_duration(input, durations, true)
}

pub fn add_duration(
    input: DateTime<Utc>,
    duration: &Duration,
) -> Result<DateTime<Utc>, CatalogError> {
    add_or_remove_duration(input, std::slice::from_ref(duration), true)
}

fn shift(
    date: DateTime<Utc>,
    duration: &Duration,
    add: bool,
) -> Result<DateTime<Utc>, CatalogError> {
    // 負の数は向きを反転して扱う
    let forward = add == (duration.number >= 0);
    let amount = duration.number.unsigned_abs();

    let shifted = match duration.unit {
        TimeUnit::Days => {
            let days = Days::new(u64::from(amount));
            if forward {
                date.checked_add_days(days)
            } else {
                date.checked_sub_days(days)
            }
        }
        TimeUnit::Months => shift_months(date, amount, forward),
        TimeUnit::Years => amount
            .checked_mul(12)
            .and_then(|months| shift_months(date, months, forward)),
        TimeUnit::Unlimited => return Err(CatalogError::UnlimitedDuration),
    };

    shifted.ok_or_else(|| {
        CatalogError::Validation(vec![format!(
            "Date {} out of range after applying {}",
            date, duration
        )])
    })
}

fn shift_months(date: DateTime<Utc>, months: u32, forward: bool) -> Option<DateTime<Utc>> {
    if forward {
        date.checked_add_months(Months::new(months))
    } else {
        date.checked_sub_months(Months::new(months))
    }
}
