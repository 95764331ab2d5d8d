use chrono::{DateTime, Utc};

use super::classify::{classify_job_type, parse_posted_date};
use crate::model::{CanonicalListing, ExperienceLevel, RawListing};

/// Why a crawled record never reaches the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("missing title")]
    MissingTitle,
    #[error("missing url")]
    MissingUrl,
}

/// Validate a raw record and map it onto the persisted schema.
pub fn normalize(
    raw: RawListing,
    experience_level: ExperienceLevel,
    crawled_at: DateTime<Utc>,
) -> Result<CanonicalListing, Rejection> {
    let title = clean(raw.title).ok_or(Rejection::MissingTitle)?;
    let url = clean(raw.url).ok_or(Rejection::MissingUrl)?;
    let posted_text = clean(raw.posted_date_text);
    let job_type_text = clean(raw.job_type_text);

    Ok(CanonicalListing {
        title,
        company: clean(raw.company).unwrap_or_default(),
        location: clean(raw.location).unwrap_or_default(),
        experience_level,
        company_level: None,
        job_type: classify_job_type(job_type_text.as_deref()),
        description: clean(raw.description).unwrap_or_default(),
        url,
        posted_date: parse_posted_date(posted_text.as_deref(), crawled_at.date_naive()),
        date_crawled: crawled_at,
        experience_text: clean(raw.experience_text),
        salary: clean(raw.salary_text),
        skills: clean(raw.skills_text),
        posted_text,
    })
}

fn clean(value: Option<String>) -> Option<String> {
    let value = value?;
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone};

    use super::*;
    use crate::model::JobType;

    fn raw() -> RawListing {
        RawListing {
            title: Some(" Rust Engineer ".into()),
            company: Some("Acme".into()),
            location: Some("Kolkata".into()),
            experience_text: Some("3-5 Yrs".into()),
            salary_text: Some("Not disclosed".into()),
            url: Some("https://www.naukri.com/job-listings-rust-1".into()),
            description: None,
            skills_text: Some("Rust, Tokio".into()),
            posted_date_text: Some("2 Days Ago".into()),
            job_type_text: Some("Part Time".into()),
        }
    }

    #[test]
    fn maps_raw_fields() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 8, 0, 0).unwrap();
        let listing = normalize(raw(), ExperienceLevel::MidLevel, now).unwrap();
        assert_eq!(listing.title, "Rust Engineer");
        assert_eq!(listing.description, "");
        assert_eq!(listing.job_type, JobType::PartTime);
        assert_eq!(listing.company_level, None);
        assert_eq!(listing.posted_date, NaiveDate::from_ymd_opt(2024, 5, 8));
        assert_eq!(listing.posted_text.as_deref(), Some("2 Days Ago"));
        assert_eq!(listing.date_crawled, now);
        assert_eq!(listing.skills.as_deref(), Some("Rust, Tokio"));
    }

    #[test]
    fn blank_title_is_rejected() {
        let mut r = raw();
        r.title = Some("   ".into());
        assert_eq!(
            normalize(r, ExperienceLevel::Other, Utc::now()),
            Err(Rejection::MissingTitle)
        );
    }

    #[test]
    fn missing_url_is_rejected() {
        let mut r = raw();
        r.url = None;
        assert_eq!(
            normalize(r, ExperienceLevel::Other, Utc::now()),
            Err(Rejection::MissingUrl)
        );
    }
}
