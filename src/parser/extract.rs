use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use url::Url;

use crate::browser::Fragment;
use crate::model::RawListing;

/// Container element for one listing on a search-results page.
pub const LISTING_SELECTOR: &str = ".srp-jobtuple-wrapper";

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap()
}

static TITLE: LazyLock<Selector> = LazyLock::new(|| selector("h2 > a.title"));
static COMPANY: LazyLock<Selector> = LazyLock::new(|| selector(".comp-name"));
static LOCATION: LazyLock<Selector> = LazyLock::new(|| selector(".locWdth"));
static EXPERIENCE: LazyLock<Selector> = LazyLock::new(|| selector(".exp"));
static SALARY: LazyLock<Selector> = LazyLock::new(|| selector(".sal-wrap span"));
static DESCRIPTION: LazyLock<Selector> = LazyLock::new(|| selector(".job-desc"));
static SKILLS: LazyLock<Selector> = LazyLock::new(|| selector(".tags-gt"));
static SKILL_ITEM: LazyLock<Selector> = LazyLock::new(|| selector(".tag-li"));
static POSTED: LazyLock<Selector> = LazyLock::new(|| selector(".job-post-day"));
static JOB_TYPE: LazyLock<Selector> = LazyLock::new(|| selector(".jobType span"));

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("fragment is empty")]
    EmptyFragment,
    #[error("fragment has no elements")]
    NoElements,
}

/// Extract one listing. Never fails: on a malformed fragment the cause is
/// logged and an all-empty listing comes back.
pub fn extract_listing(fragment: &Fragment) -> RawListing {
    match try_extract(fragment) {
        Ok(listing) => listing,
        Err(e) => {
            warn!(page_url = ?fragment.base_url, "Listing extraction failed: {}", e);
            RawListing::default()
        }
    }
}

pub fn try_extract(fragment: &Fragment) -> Result<RawListing, ExtractError> {
    if fragment.html.trim().is_empty() {
        return Err(ExtractError::EmptyFragment);
    }
    let doc = Html::parse_fragment(&fragment.html);
    let root = doc.root_element();
    if root.children().filter_map(ElementRef::wrap).next().is_none() {
        return Err(ExtractError::NoElements);
    }

    let title_el = root.select(&TITLE).next();
    let url = title_el
        .and_then(|el| el.value().attr("href"))
        .and_then(|href| resolve_href(href, fragment.base_url.as_deref()));

    Ok(RawListing {
        title: title_el.and_then(inner_text),
        company: first_text(root, &COMPANY),
        location: first_text(root, &LOCATION),
        experience_text: first_text(root, &EXPERIENCE),
        salary_text: first_text(root, &SALARY),
        url,
        description: first_text(root, &DESCRIPTION),
        skills_text: skills(root),
        posted_date_text: first_text(root, &POSTED),
        job_type_text: first_text(root, &JOB_TYPE),
    })
}

fn first_text(root: ElementRef<'_>, sel: &Selector) -> Option<String> {
    root.select(sel).next().and_then(inner_text)
}

fn inner_text(el: ElementRef<'_>) -> Option<String> {
    let text: String = el.text().collect();
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

// Tags are flattened into one comma-separated string.
fn skills(root: ElementRef<'_>) -> Option<String> {
    let container = root.select(&SKILLS).next()?;
    let tags: Vec<String> = container.select(&SKILL_ITEM).filter_map(inner_text).collect();
    (!tags.is_empty()).then(|| tags.join(", "))
}

fn resolve_href(href: &str, base: Option<&str>) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    match Url::parse(href) {
        Ok(url) => Some(url.into()),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let joined = base
                .and_then(|b| Url::parse(b).ok())
                .and_then(|b| b.join(href).ok());
            if joined.is_none() {
                debug!(href, ?base, "Could not resolve relative listing url");
            }
            joined.map(Into::into)
        }
        Err(e) => {
            debug!(href, "Invalid listing url: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::page_fragments;

    const PAGE_URL: &str = "https://www.naukri.com/software-engineer-jobs-in-kolkata?pageNo=1";

    fn fixture() -> Vec<RawListing> {
        let html = std::fs::read_to_string("tests/fixtures/srp_page.html").unwrap();
        page_fragments(&html, LISTING_SELECTOR, Some(PAGE_URL))
            .iter()
            .map(extract_listing)
            .collect()
    }

    #[test]
    fn extracts_every_field_of_a_complete_tuple() {
        let listings = fixture();
        assert_eq!(listings.len(), 4);
        let first = &listings[0];
        assert_eq!(first.title.as_deref(), Some("Senior Software Engineer"));
        assert_eq!(first.company.as_deref(), Some("Acme Technologies"));
        assert_eq!(first.location.as_deref(), Some("Kolkata, Mumbai"));
        assert_eq!(first.experience_text.as_deref(), Some("6-10 Yrs"));
        assert_eq!(first.salary_text.as_deref(), Some("25-35 Lacs PA"));
        assert_eq!(
            first.url.as_deref(),
            Some("https://www.naukri.com/job-listings-senior-software-engineer-acme-101")
        );
        assert_eq!(first.skills_text.as_deref(), Some("Rust, Kubernetes, PostgreSQL"));
        assert_eq!(first.posted_date_text.as_deref(), Some("3 Days Ago"));
        assert_eq!(first.job_type_text.as_deref(), Some("Full Time"));
        assert!(first.description.as_deref().unwrap().starts_with("Build and run"));
    }

    #[test]
    fn missing_selectors_leave_only_those_fields_empty() {
        let listings = fixture();
        let sparse = &listings[1];
        assert_eq!(sparse.title.as_deref(), Some("Data Analyst"));
        assert!(sparse.company.is_none());
        assert!(sparse.salary_text.is_none());
        assert!(sparse.skills_text.is_none());
        assert_eq!(sparse.experience_text.as_deref(), Some("0-2 Yrs"));
        assert_eq!(
            sparse.url.as_deref(),
            Some("https://www.naukri.com/job-listings-data-analyst-beta-202")
        );
    }

    #[test]
    fn tuple_without_title_still_yields_other_fields() {
        let listings = fixture();
        let untitled = &listings[2];
        assert!(untitled.title.is_none());
        assert!(untitled.url.is_none());
        assert_eq!(untitled.company.as_deref(), Some("Gamma Corp"));
    }

    #[test]
    fn whitespace_is_collapsed() {
        let listings = fixture();
        assert_eq!(listings[3].title.as_deref(), Some("Backend Developer (Go)"));
        assert_eq!(listings[3].posted_date_text.as_deref(), Some("30+ Days Ago"));
    }

    #[test]
    fn empty_fragment_gives_all_empty_listing() {
        let fragment = Fragment {
            html: "   ".into(),
            base_url: None,
        };
        assert!(matches!(try_extract(&fragment), Err(ExtractError::EmptyFragment)));
        assert!(extract_listing(&fragment).is_empty());
    }

    #[test]
    fn text_only_fragment_gives_all_empty_listing() {
        let fragment = Fragment {
            html: "just some text".into(),
            base_url: None,
        };
        assert!(extract_listing(&fragment).is_empty());
    }

    #[test]
    fn relative_href_without_base_is_dropped() {
        assert_eq!(resolve_href("/job-listings-x", None), None);
        assert_eq!(
            resolve_href("/job-listings-x", Some("https://www.naukri.com/a?b=1")).as_deref(),
            Some("https://www.naukri.com/job-listings-x")
        );
        assert_eq!(
            resolve_href("https://other.example/x", Some("https://www.naukri.com/")).as_deref(),
            Some("https://other.example/x")
        );
    }
}
