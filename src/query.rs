//! Paginated reads over the listing store.

use serde::{Deserialize, Serialize};

use crate::db::{ListingFilter, ListingStore, StoreError};
use crate::model::{CanonicalListing, CompanyLevel, ExperienceLevel, UnknownVariant};

pub const DEFAULT_LIMIT: u64 = 10;
pub const MAX_LIMIT: u64 = 100;

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Please provide a title query parameter")]
    MissingTitle,
    #[error(transparent)]
    InvalidLevel(#[from] UnknownVariant),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingQuery {
    pub search: Option<String>,
    pub location: Option<String>,
    pub experience_level: Option<String>,
    pub company_level: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingPage {
    pub total_count: u64,
    pub total_pages: u64,
    pub current_page: u64,
    pub jobs: Vec<CanonicalListing>,
}

/// Page number (1-based) and page size after clamping.
fn window(page: Option<u64>, limit: Option<u64>) -> (u64, u64) {
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    (page, limit)
}

impl ListingQuery {
    pub fn filter(&self) -> Result<ListingFilter, QueryError> {
        Ok(ListingFilter {
            search: self.search.clone(),
            title: None,
            location: self.location.clone(),
            experience_level: parse_level(self.experience_level.as_deref())?,
            company_level: parse_level(self.company_level.as_deref())?,
        })
    }
}

fn parse_level<T>(value: Option<&str>) -> Result<Option<T>, QueryError>
where
    T: std::str::FromStr<Err = UnknownVariant>,
{
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => Ok(Some(v.parse()?)),
        None => Ok(None),
    }
}

/// Run a filter and cut one page out of the ordered result.
pub async fn fetch_page(
    store: &dyn ListingStore,
    filter: &ListingFilter,
    page: Option<u64>,
    limit: Option<u64>,
) -> Result<ListingPage, QueryError> {
    let (page, limit) = window(page, limit);
    let total_count = store.count(filter).await?;
    let jobs = store
        .find_many(filter, (page - 1).saturating_mul(limit), limit)
        .await?;
    Ok(ListingPage {
        total_count,
        total_pages: total_count.div_ceil(limit),
        current_page: page,
        jobs,
    })
}

pub async fn list_listings(
    store: &dyn ListingStore,
    query: &ListingQuery,
) -> Result<ListingPage, QueryError> {
    let filter = query.filter()?;
    fetch_page(store, &filter, query.page, query.limit).await
}

pub async fn search_by_title(
    store: &dyn ListingStore,
    title: Option<&str>,
    page: Option<u64>,
    limit: Option<u64>,
) -> Result<ListingPage, QueryError> {
    let title = title
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(QueryError::MissingTitle)?;
    let filter = ListingFilter {
        title: Some(title.to_string()),
        ..Default::default()
    };
    fetch_page(store, &filter, page, limit).await
}

pub async fn by_experience(
    store: &dyn ListingStore,
    level: &str,
    page: Option<u64>,
    limit: Option<u64>,
) -> Result<ListingPage, QueryError> {
    let level: ExperienceLevel = level.parse()?;
    let filter = ListingFilter {
        experience_level: Some(level),
        ..Default::default()
    };
    fetch_page(store, &filter, page, limit).await
}

pub async fn by_company_level(
    store: &dyn ListingStore,
    level: &str,
    page: Option<u64>,
    limit: Option<u64>,
) -> Result<ListingPage, QueryError> {
    let level: CompanyLevel = level.parse()?;
    let filter = ListingFilter {
        company_level: Some(level),
        ..Default::default()
    };
    fetch_page(store, &filter, page, limit).await
}
