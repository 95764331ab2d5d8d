//! Pure mappings from crawled strings to canonical values.

use std::sync::LazyLock;

use chrono::{Days, NaiveDate};
use regex::Regex;

use crate::model::{ExperienceLevel, JobType};

static DAYS_AGO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(\d+)\s*\+?\s*days?\s+ago$").unwrap());
static SAME_DAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(just now|today|few hours ago|\d+\s*\+?\s*(hours?|hrs?|minutes?|mins?)\s+ago)$")
        .unwrap()
});

/// Map an experience string ("0-2 years", "fresher", "7") to a level.
///
/// Branch order matters: a `-` range is decided first and anything it does
/// not place explicitly falls back to mid-level.
pub fn classify_experience(raw: Option<&str>) -> ExperienceLevel {
    let Some(text) = raw.map(str::trim).filter(|t| !t.is_empty()) else {
        return ExperienceLevel::Other;
    };

    let mut parts = text.split('-');
    if let (Some(min), Some(max)) = (parts.next(), parts.next()) {
        let (Some(min), Some(max)) = (leading_int(min), leading_int(max)) else {
            return ExperienceLevel::Other;
        };
        return if min == 0 && max <= 2 {
            ExperienceLevel::EntryLevel
        } else if (3..=5).contains(&min) && max <= 5 {
            ExperienceLevel::MidLevel
        } else if min > 5 {
            ExperienceLevel::SeniorLevel
        } else {
            ExperienceLevel::MidLevel
        };
    }

    // "fresher" is matched as written; "Fresher" is not entry-level
    if text.contains("fresher") || text == "0" {
        ExperienceLevel::EntryLevel
    } else if leading_int(text).is_some_and(|years| years > 5) {
        ExperienceLevel::SeniorLevel
    } else {
        ExperienceLevel::Other
    }
}

/// Integer formed by the leading digits, ignoring whatever suffix follows
/// ("5 years" -> 5, "10+" -> 10). `None` when there is no leading digit.
fn leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    s[..end].parse().ok()
}

pub fn classify_job_type(raw: Option<&str>) -> JobType {
    let Some(text) = raw else {
        return JobType::Other;
    };
    let norm: String = text
        .to_lowercase()
        .replace(['-', '_', '/'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let has_word = |w: &str| norm.split(' ').any(|t| t == w);

    if norm.contains("full time") || norm.contains("fulltime") {
        JobType::FullTime
    } else if norm.contains("part time") || norm.contains("parttime") {
        JobType::PartTime
    } else if norm.contains("contract") {
        JobType::Contract
    } else if norm.contains("temporary") || has_word("temp") {
        JobType::Temporary
    } else if norm.contains("hybrid") {
        JobType::Hybrid
    } else if norm.contains("remote") || norm.contains("work from home") || has_word("wfh") {
        JobType::Remote
    } else {
        JobType::Other
    }
}

/// Turn the portal's relative age indicator into a calendar date.
pub fn parse_posted_date(raw: Option<&str>, today: NaiveDate) -> Option<NaiveDate> {
    let text = raw?.trim();
    if SAME_DAY_RE.is_match(text) {
        return Some(today);
    }
    let days: u64 = DAYS_AGO_RE.captures(text)?[1].parse().ok()?;
    today.checked_sub_days(Days::new(days))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exp(s: &str) -> ExperienceLevel {
        classify_experience(Some(s))
    }

    #[test]
    fn ranges_follow_bound_table() {
        assert_eq!(exp("0-2 years"), ExperienceLevel::EntryLevel);
        assert_eq!(exp("0-1 Yrs"), ExperienceLevel::EntryLevel);
        assert_eq!(exp("3-5 years"), ExperienceLevel::MidLevel);
        assert_eq!(exp("4-5 Yrs"), ExperienceLevel::MidLevel);
        assert_eq!(exp("6-10 years"), ExperienceLevel::SeniorLevel);
        assert_eq!(exp("8-12 Yrs"), ExperienceLevel::SeniorLevel);
    }

    #[test]
    fn unplaced_ranges_fall_back_to_mid() {
        assert_eq!(exp("1-2 years"), ExperienceLevel::MidLevel);
        assert_eq!(exp("0-3 years"), ExperienceLevel::MidLevel);
        assert_eq!(exp("3-7 years"), ExperienceLevel::MidLevel);
        assert_eq!(exp("2-4 years"), ExperienceLevel::MidLevel);
    }

    #[test]
    fn unparsable_range_bound_is_other() {
        assert_eq!(exp("x-5 years"), ExperienceLevel::Other);
        assert_eq!(exp("3-many years"), ExperienceLevel::Other);
        assert_eq!(exp("-"), ExperienceLevel::Other);
        assert_eq!(exp("Fresher-1 years"), ExperienceLevel::Other);
    }

    #[test]
    fn single_values() {
        assert_eq!(exp("fresher"), ExperienceLevel::EntryLevel);
        assert_eq!(exp(" fresher "), ExperienceLevel::EntryLevel);
        assert_eq!(exp("0"), ExperienceLevel::EntryLevel);
        assert_eq!(exp("7"), ExperienceLevel::SeniorLevel);
        assert_eq!(exp("10+ years"), ExperienceLevel::SeniorLevel);
        assert_eq!(exp("5"), ExperienceLevel::Other);
        assert_eq!(exp("1"), ExperienceLevel::Other);
    }

    #[test]
    fn fresher_match_is_case_sensitive() {
        assert_eq!(exp("Fresher"), ExperienceLevel::Other);
        assert_eq!(exp("Freshers welcome"), ExperienceLevel::Other);
        assert_eq!(exp("FRESHER"), ExperienceLevel::Other);
        assert_eq!(exp("freshers welcome"), ExperienceLevel::EntryLevel);
    }

    #[test]
    fn missing_or_garbage_is_other() {
        assert_eq!(classify_experience(None), ExperienceLevel::Other);
        assert_eq!(exp(""), ExperienceLevel::Other);
        assert_eq!(exp("   "), ExperienceLevel::Other);
        assert_eq!(exp("garbage"), ExperienceLevel::Other);
    }

    #[test]
    fn leading_int_strips_suffix() {
        assert_eq!(leading_int(" 5 years"), Some(5));
        assert_eq!(leading_int("10+"), Some(10));
        assert_eq!(leading_int("years"), None);
        assert_eq!(leading_int(""), None);
    }

    #[test]
    fn job_types() {
        assert_eq!(classify_job_type(Some("Full Time")), JobType::FullTime);
        assert_eq!(classify_job_type(Some("full-time")), JobType::FullTime);
        assert_eq!(classify_job_type(Some("Part Time")), JobType::PartTime);
        assert_eq!(classify_job_type(Some("Contractual")), JobType::Contract);
        assert_eq!(classify_job_type(Some("Temp")), JobType::Temporary);
        assert_eq!(classify_job_type(Some("Hybrid - Remote")), JobType::Hybrid);
        assert_eq!(classify_job_type(Some("Work from home")), JobType::Remote);
        assert_eq!(classify_job_type(Some("Internship")), JobType::Other);
        assert_eq!(classify_job_type(None), JobType::Other);
    }

    #[test]
    fn posted_dates_relative_to_today() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let parse = |s: &str| parse_posted_date(Some(s), today);

        assert_eq!(parse("Just Now"), Some(today));
        assert_eq!(parse("Few Hours Ago"), Some(today));
        assert_eq!(parse("5 Hours Ago"), Some(today));
        assert_eq!(parse("1 Day Ago"), NaiveDate::from_ymd_opt(2024, 3, 14));
        assert_eq!(parse("3 Days Ago"), NaiveDate::from_ymd_opt(2024, 3, 12));
        assert_eq!(parse("30+ Days Ago"), NaiveDate::from_ymd_opt(2024, 2, 14));
        assert_eq!(parse("Hot Job"), None);
        assert_eq!(parse_posted_date(None, today), None);
    }
}
