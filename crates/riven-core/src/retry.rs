//! Retry backoff table for the Scraping stage.

use chrono::Duration;

/// Piecewise scraping backoff keyed by `scraped_times`: `≤2:30m, ≤5:2h,
/// ≤10:24h, >10:168h`.
#[must_use]
pub fn scrape_backoff(scraped_times: i32) -> Duration {
    match scraped_times {
        n if n <= 2 => Duration::minutes(30),
        n if n <= 5 => Duration::hours(2),
        n if n <= 10 => Duration::hours(24),
        _ => Duration::hours(168),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn early_attempts_backoff_thirty_minutes() {
        assert_eq!(scrape_backoff(0), Duration::minutes(30));
        assert_eq!(scrape_backoff(2), Duration::minutes(30));
    }

    #[test]
    fn mid_attempts_backoff_two_hours() {
        assert_eq!(scrape_backoff(3), Duration::hours(2));
        assert_eq!(scrape_backoff(5), Duration::hours(2));
    }

    #[test]
    fn late_attempts_backoff_one_day() {
        assert_eq!(scrape_backoff(6), Duration::hours(24));
        assert_eq!(scrape_backoff(10), Duration::hours(24));
    }

    #[test]
    fn exhausted_attempts_backoff_one_week() {
        assert_eq!(scrape_backoff(11), Duration::hours(168));
        assert_eq!(scrape_backoff(50), Duration::hours(168));
    }
}
