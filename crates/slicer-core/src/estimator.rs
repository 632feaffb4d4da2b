//! Converts a parsed print time and a material hourly rate into a billable
//! duration and a price in forints.

/// 15-minute billing floor.
const MIN_BILLABLE_HOURS: f64 = 0.25;

/// `max(print_time_seconds / 3600, 0.25)`.
pub fn billable_hours(print_time_seconds: u64) -> f64 {
    (print_time_seconds as f64 / 3600.0).max(MIN_BILLABLE_HOURS)
}

/// `billable_hours * hourly_rate`, rounded up to the nearest 10 HUF.
pub fn estimated_price_huf(print_time_seconds: u64, hourly_rate: u64) -> u64 {
    let raw_price = billable_hours(print_time_seconds) * hourly_rate as f64;
    ceil_to_10(raw_price)
}

fn ceil_to_10(value: f64) -> u64 {
    ((value / 10.0).ceil() as u64) * 10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn billable_hours_floors_at_a_quarter_hour() {
        assert_eq!(billable_hours(0), 0.25);
        assert_eq!(billable_hours(60), 0.25);
    }

    #[test]
    fn billable_hours_scales_linearly_past_the_floor() {
        assert_eq!(billable_hours(7200), 2.0);
    }

    #[test]
    fn estimated_price_matches_the_worked_example() {
        // 1h30m at 900 HUF/hr -> 1.5 * 900 = 1350, already a multiple of 10.
        assert_eq!(estimated_price_huf(5400, 900), 1350);
    }

    #[test]
    fn estimated_price_rounds_up_to_the_nearest_10() {
        // 0.25h * 801 = 200.25 -> ceil to 210.
        assert_eq!(estimated_price_huf(0, 801), 210);
    }

    #[test]
    fn ceil_to_10_is_never_below_the_raw_price() {
        for cents in [1u64, 9, 10, 11, 99, 100, 101] {
            let raw = cents as f64;
            let rounded = ceil_to_10(raw);
            assert!(rounded as f64 >= raw);
            assert_eq!(rounded % 10, 0);
        }
    }
}
