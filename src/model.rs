use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One listing as read off the page. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawListing {
    pub title: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub experience_text: Option<String>,
    pub salary_text: Option<String>,
    pub url: Option<String>,
    pub description: Option<String>,
    pub skills_text: Option<String>,
    pub posted_date_text: Option<String>,
    pub job_type_text: Option<String>,
}

#[cfg(test)]
impl RawListing {
    pub fn is_empty(&self) -> bool {
        *self == RawListing::default()
    }
}

/// A listing as persisted. `url` is the natural key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalListing {
    pub title: String,
    pub company: String,
    pub location: String,
    pub experience_level: ExperienceLevel,
    pub company_level: Option<CompanyLevel>,
    pub job_type: JobType,
    pub description: String,
    pub url: String,
    pub posted_date: Option<NaiveDate>,
    pub date_crawled: DateTime<Utc>,
    pub experience_text: Option<String>,
    pub salary: Option<String>,
    pub skills: Option<String>,
    pub posted_text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExperienceLevel {
    #[serde(rename = "Entry-Level")]
    EntryLevel,
    #[serde(rename = "Mid-Level")]
    MidLevel,
    #[serde(rename = "Senior-Level")]
    SeniorLevel,
    Associate,
    Executive,
    Internship,
    Other,
}

impl ExperienceLevel {
    pub const ALL: [ExperienceLevel; 7] = [
        ExperienceLevel::EntryLevel,
        ExperienceLevel::MidLevel,
        ExperienceLevel::SeniorLevel,
        ExperienceLevel::Associate,
        ExperienceLevel::Executive,
        ExperienceLevel::Internship,
        ExperienceLevel::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExperienceLevel::EntryLevel => "Entry-Level",
            ExperienceLevel::MidLevel => "Mid-Level",
            ExperienceLevel::SeniorLevel => "Senior-Level",
            ExperienceLevel::Associate => "Associate",
            ExperienceLevel::Executive => "Executive",
            ExperienceLevel::Internship => "Internship",
            ExperienceLevel::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompanyLevel {
    Startup,
    Small,
    Medium,
    #[serde(rename = "Large Enterprise")]
    LargeEnterprise,
    Other,
}

impl CompanyLevel {
    pub const ALL: [CompanyLevel; 5] = [
        CompanyLevel::Startup,
        CompanyLevel::Small,
        CompanyLevel::Medium,
        CompanyLevel::LargeEnterprise,
        CompanyLevel::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CompanyLevel::Startup => "Startup",
            CompanyLevel::Small => "Small",
            CompanyLevel::Medium => "Medium",
            CompanyLevel::LargeEnterprise => "Large Enterprise",
            CompanyLevel::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobType {
    #[serde(rename = "Full-time")]
    FullTime,
    #[serde(rename = "Part-time")]
    PartTime,
    Contract,
    Temporary,
    Remote,
    Hybrid,
    Other,
}

impl JobType {
    pub const ALL: [JobType; 7] = [
        JobType::FullTime,
        JobType::PartTime,
        JobType::Contract,
        JobType::Temporary,
        JobType::Remote,
        JobType::Hybrid,
        JobType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::FullTime => "Full-time",
            JobType::PartTime => "Part-time",
            JobType::Contract => "Contract",
            JobType::Temporary => "Temporary",
            JobType::Remote => "Remote",
            JobType::Hybrid => "Hybrid",
            JobType::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! str_enum {
    ($ty:ident, $kind:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                $ty::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(s))
                    .ok_or_else(|| UnknownVariant {
                        kind: $kind,
                        value: s.to_string(),
                    })
            }
        }
    };
}

str_enum!(ExperienceLevel, "experience level");
str_enum!(CompanyLevel, "company level");
str_enum!(JobType, "job type");
