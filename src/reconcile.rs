//! Keeps the store in step with what the crawler saw: upsert by url and the
//! retention sweep.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use tracing::{debug, info};

use crate::db::{ListingStore, PurgeFilter, StoreError, UpsertOutcome};
use crate::model::CanonicalListing;

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn ListingStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn ListingStore>) -> Self {
        Self { store }
    }

    /// Insert or overwrite the listing stored under the same url; either way
    /// `date_crawled` becomes `now`.
    pub async fn upsert_at(
        &self,
        mut listing: CanonicalListing,
        now: DateTime<Utc>,
    ) -> Result<UpsertOutcome, StoreError> {
        listing.date_crawled = now;
        let url = listing.url.clone();
        let outcome = self.store.upsert_by_url(listing).await?;
        match outcome {
            UpsertOutcome::Inserted => info!(url = %url, "Inserted new job"),
            UpsertOutcome::Updated => debug!(url = %url, "Updated existing job"),
        }
        Ok(outcome)
    }

    pub async fn purge_stale(
        &self,
        max_age_days: i64,
        stale_pattern: &Regex,
    ) -> Result<u64, StoreError> {
        self.purge_stale_at(max_age_days, stale_pattern, Utc::now()).await
    }

    /// Delete listings not seen for `max_age_days` or whose posted text
    /// matches `stale_pattern`. A negative window would put the cutoff in the
    /// future and match every row, so it is rejected with nothing deleted.
    pub async fn purge_stale_at(
        &self,
        max_age_days: i64,
        stale_pattern: &Regex,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let crawled_before = (max_age_days >= 0)
            .then(|| Duration::try_days(max_age_days))
            .flatten()
            .and_then(|age| now.checked_sub_signed(age))
            .ok_or(StoreError::InvalidRetention(max_age_days))?;
        let filter = PurgeFilter {
            crawled_before,
            posted_marker: Some(stale_pattern.clone()),
        };
        let deleted = self.store.delete_many(&filter).await?;
        info!(max_age_days, pattern = %stale_pattern, "Deleted {} old job listings", deleted);
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::db::tests::listing;
    use crate::db::{ListingFilter, SqliteStore};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn setup() -> (Arc<SqliteStore>, Reconciler) {
        let store = Arc::new(SqliteStore::open_in_memory("jobs").unwrap());
        let reconciler = Reconciler::new(store.clone());
        (store, reconciler)
    }

    fn stale() -> Regex {
        Regex::new(r"(?i)30\+ Days Ago").unwrap()
    }

    #[tokio::test]
    async fn repeated_upsert_keeps_one_row_and_refreshes_crawl_time() {
        let (store, rec) = setup();
        let l = listing("https://x/1", "Rust Dev", now());

        assert_eq!(rec.upsert_at(l.clone(), now()).await.unwrap(), UpsertOutcome::Inserted);
        let later = now() + Duration::hours(12);
        assert_eq!(rec.upsert_at(l, later).await.unwrap(), UpsertOutcome::Updated);

        let rows = store.find_many(&ListingFilter::default(), 0, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].date_crawled, later);
    }

    #[tokio::test]
    async fn update_overwrites_fields() {
        let (store, rec) = setup();
        rec.upsert_at(listing("https://x/1", "Rust Dev", now()), now()).await.unwrap();
        let mut changed = listing("https://x/1", "Staff Rust Dev", now());
        changed.location = "Remote".into();
        rec.upsert_at(changed, now()).await.unwrap();

        let rows = store.find_many(&ListingFilter::default(), 0, 10).await.unwrap();
        assert_eq!(rows[0].title, "Staff Rust Dev");
        assert_eq!(rows[0].location, "Remote");
    }

    #[tokio::test]
    async fn purge_removes_old_and_marked_rows() {
        let (store, rec) = setup();
        rec.upsert_at(listing("https://x/old", "Old", now()), now() - Duration::days(31))
            .await
            .unwrap();
        rec.upsert_at(listing("https://x/edge", "Edge", now()), now() - Duration::days(29))
            .await
            .unwrap();
        let mut marked = listing("https://x/marked", "Marked", now());
        marked.posted_text = Some("30+ Days Ago".into());
        rec.upsert_at(marked, now()).await.unwrap();
        rec.upsert_at(listing("https://x/new", "New", now()), now()).await.unwrap();

        let deleted = rec.purge_stale_at(30, &stale(), now()).await.unwrap();
        assert_eq!(deleted, 2);

        let mut urls: Vec<_> = store
            .find_many(&ListingFilter::default(), 0, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.url)
            .collect();
        urls.sort();
        assert_eq!(urls, vec!["https://x/edge", "https://x/new"]);
    }

    #[tokio::test]
    async fn out_of_range_window_is_rejected_and_deletes_nothing() {
        let (store, rec) = setup();
        rec.upsert_at(listing("https://x/1", "Fresh", now()), now()).await.unwrap();

        assert!(matches!(
            rec.purge_stale_at(-1, &stale(), now()).await,
            Err(StoreError::InvalidRetention(-1))
        ));
        assert!(matches!(
            rec.purge_stale_at(100_000_000, &stale(), now()).await,
            Err(StoreError::InvalidRetention(100_000_000))
        ));
        assert!(matches!(
            rec.purge_stale_at(i64::MAX, &stale(), now()).await,
            Err(StoreError::InvalidRetention(_))
        ));
        assert_eq!(store.count(&ListingFilter::default()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn zero_day_window_keeps_rows_crawled_now() {
        let (store, rec) = setup();
        rec.upsert_at(listing("https://x/1", "Fresh", now()), now()).await.unwrap();
        assert_eq!(rec.purge_stale_at(0, &stale(), now()).await.unwrap(), 0);
        assert_eq!(store.count(&ListingFilter::default()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn purge_on_empty_store_is_zero() {
        let (_, rec) = setup();
        assert_eq!(rec.purge_stale_at(30, &stale(), now()).await.unwrap(), 0);
    }
}
