//! Registration seasons. An edition held in spring 2025 is season 2025; the
//! season rolls over in August.

use chrono::{DateTime, Datelike, Utc};

pub fn season_of(at: DateTime<Utc>) -> i32 {
    if at.month() >= 8 {
        at.year() + 1
    } else {
        at.year()
    }
}

/// The configured override, or the season of `now`.
pub fn current_season(configured: Option<i32>, now: DateTime<Utc>) -> i32 {
    configured.unwrap_or_else(|| season_of(now))
}
