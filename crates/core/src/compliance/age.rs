//! Age arithmetic for the wallet-opening gate.

use chrono::{Datelike, NaiveDate};

/// Whole years elapsed from `birth` to `on`; zero if `on` precedes `birth`.
#[must_use]
pub fn whole_years_between(birth: NaiveDate, on: NaiveDate) -> u32 {
    if on <= birth {
        return 0;
    }
    let mut years = on.year() - birth.year();
    if (on.month(), on.day()) < (birth.month(), birth.day()) {
        years -= 1;
    }
    u32::try_from(years).unwrap_or(0)
}
