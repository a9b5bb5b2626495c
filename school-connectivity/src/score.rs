//! Connectivity score of a contract
//!
//! The score averages the ratio of reported school speed to contracted speed
//! over the last (up to) three calendar days, today included.

use chrono::{Days, NaiveDate};

use crate::models::{Contract, FactReportEntry};

/// Days in the averaging window
pub const SCORE_WINDOW_DAYS: i64 = 3;

/// Score after a school reports `today_speed` today.
///
/// Days before the contract started are not counted. A previous day without
/// a school report contributes 0. A contract with speed 0 scores 1.
pub fn connectivity_score(
    contract: &Contract,
    history: &[FactReportEntry],
    today: NaiveDate,
    today_speed: f64,
) -> f64 {
    let days_since_start = contract
        .date
        .map(|start| (today - start.date_naive()).num_days().max(0))
        .unwrap_or(0);
    let days = SCORE_WINDOW_DAYS.min(days_since_start + 1);

    let ratio = |speed: f64| {
        if contract.speed == 0.0 {
            1.0
        } else {
            speed / contract.speed
        }
    };

    let mut sum = ratio(today_speed);
    for back in 1..days {
        let Some(day) = today.checked_sub_days(Days::new(back as u64)) else {
            continue;
        };
        let speed = history
            .iter()
            .find(|entry| entry.date.date_naive() == day)
            .and_then(|entry| entry.school_speed)
            .unwrap_or(0.0);
        sum += ratio(speed);
    }

    sum / days as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Address, ContractStatus};
    use chrono::{TimeZone, Utc};

    fn contract(speed: f64, start: NaiveDate) -> Contract {
        let start = Utc.from_utc_datetime(&start.and_hms_opt(9, 30, 0).unwrap());
        Contract {
            id: "1".into(),
            isp_address: None,
            isp_passport_address: Address::parse("0x0000000000000000000000000000000000000001")
                .unwrap(),
            school_address: Address::parse("0x0000000000000000000000000000000000000002")
                .unwrap(),
            speed,
            state: ContractStatus::Active,
            connectivity_score: None,
            date: Some(start),
        }
    }

    fn entry(day: NaiveDate, school_speed: f64) -> FactReportEntry {
        FactReportEntry {
            date: Utc.from_utc_datetime(&day.and_hms_opt(0, 0, 0).unwrap()),
            school_speed: Some(school_speed),
            ..Default::default()
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2019, 3, d).unwrap()
    }

    #[test]
    fn test_first_day_uses_today_only() {
        let score = connectivity_score(&contract(50.0, day(10)), &[], day(10), 25.0);
        assert_eq!(score, 0.5);
    }

    #[test]
    fn test_three_day_window() {
        let history = vec![entry(day(8), 50.0), entry(day(9), 25.0), entry(day(1), 0.0)];
        let score = connectivity_score(&contract(50.0, day(1)), &history, day(10), 50.0);
        assert!((score - 2.5 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_days_count_as_zero() {
        let score = connectivity_score(&contract(40.0, day(1)), &[], day(10), 40.0);
        assert!((score - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_window_shorter_for_new_contracts() {
        let history = vec![entry(day(9), 20.0)];
        let score = connectivity_score(&contract(40.0, day(9)), &history, day(10), 40.0);
        assert_eq!(score, 0.75);
    }

    #[test]
    fn test_zero_speed_contract_scores_one() {
        let score = connectivity_score(&contract(0.0, day(1)), &[], day(10), 0.0);
        assert_eq!(score, 1.0);
    }
}
