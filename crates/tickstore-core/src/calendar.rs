//! Weekday trading calendar used to label forecast sessions.

use time::{Date, Weekday};

/// Saturdays and Sundays are closed. Holidays are applied by
/// [`next_trading_days`].
pub fn is_trading_day(date: Date) -> bool {
    !matches!(date.weekday(), Weekday::Saturday | Weekday::Sunday)
}

/// The next `count` trading days strictly after `start`, skipping weekends
/// and any day in [`load_holiday_calendar`].
pub fn next_trading_days(start: Date, count: usize) -> Vec<Date> {
    let holidays = load_holiday_calendar();
    std::iter::successors(start.next_day(), |day| day.next_day())
        .filter(|day| is_trading_day(*day) && !holidays.contains(day))
        .take(count)
        .collect()
}

/// Exchange holidays. No holiday source is wired in, so the list is empty.
pub fn load_holiday_calendar() -> Vec<Date> {
    Vec::new()
}
