// billing-backend/src/utils/clock.rs

use chrono::{DateTime, Days, Months, Utc};
use std::sync::RwLock;

/// 現在時刻の取得元
///
/// サービス層は `Utc::now()` を直接呼ばずにこのトレイト経由で時刻を得る。
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// テスト用の操作可能な時計
///
/// 時刻を設定すると以降はその時刻で止まる。未設定（またはリセット後）は実時刻を返す。
#[derive(Debug, Default)]
pub struct ClockMock {
    frozen: RwLock<Option<DateTime<Utc>>>,
}

impl ClockMock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(time: DateTime<Utc>) -> Self {
        Self {
            frozen: RwLock::new(Some(time)),
        }
    }

    pub fn set_time(&self, time: DateTime<Utc>) {
        let mut frozen = self.frozen.write().unwrap_or_else(|e| e.into_inner());
        *frozen = Some(time);
    }

    pub fn add_days(&self, days: u64) {
        self.advance(|now| now.checked_add_days(Days::new(days)));
    }

    pub fn add_months(&self, months: u32) {
        self.advance(|now| now.checked_add_months(Months::new(months)));
    }

    pub fn add_years(&self, years: u32) {
        self.advance(|now| now.checked_add_months(Months::new(years * 12)));
    }

    pub fn reset_to_real_time(&self) {
        let mut frozen = self.frozen.write().unwrap_or_else(|e| e.into_inner());
        *frozen = None;
    }

    fn advance(&self, step: impl FnOnce(DateTime<Utc>) -> Option<DateTime<Utc>>) {
        let mut frozen = self.frozen.write().unwrap_or_else(|e| e.into_inner());
        let current = frozen.unwrap_or_else(Utc::now);
        // 範囲外になる移動は無視する
        *frozen = Some(step(current).unwrap_or(current));
    }
}

impl Clock for ClockMock {
    fn now(&self) -> DateTime<Utc> {
        let frozen = self.frozen.read().unwrap_or_else(|e| e.into_inner());
        frozen.unwrap_or_else(Utc::now)
    }
}
