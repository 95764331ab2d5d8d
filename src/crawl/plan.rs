use std::fmt;

use itertools::iproduct;

/// Ordered query, location and experience lists whose product is the crawl.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlPlan {
    pub queries: Vec<String>,
    pub locations: Vec<String>,
    pub experiences: Vec<String>,
}

/// One (query, location, experience) combination, crawled by one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub query: String,
    pub location: String,
    pub experience: String,
}

impl fmt::Display for PlanEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "query=\"{}\" location=\"{}\" experience=\"{}\"",
            self.query, self.location, self.experience
        )
    }
}

impl CrawlPlan {
    pub fn new(queries: Vec<String>, locations: Vec<String>, experiences: Vec<String>) -> Self {
        Self {
            queries,
            locations,
            experiences,
        }
    }

    /// Lazily yields every combination, query outermost, experience innermost.
    /// Each call starts over.
    pub fn entries(&self) -> impl Iterator<Item = PlanEntry> + '_ {
        iproduct!(
            self.queries.iter(),
            self.locations.iter(),
            self.experiences.iter()
        )
        .map(|(query, location, experience)| PlanEntry {
            query: query.trim().to_string(),
            location: location.trim().to_string(),
            experience: experience.trim().to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.queries.len() * self.locations.len() * self.experiences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PlanEntry {
    /// Query as it appears in the search path: whitespace runs become `-`.
    pub fn slug(&self) -> String {
        self.query.split_whitespace().collect::<Vec<_>>().join("-")
    }

    /// Fill the search-path template for one results page.
    ///
    /// Placeholders: `{slug}`, `{query}`, `{location}`, `{experience}`, `{page}`.
    pub fn search_url(&self, base_url: &str, template: &str, page: u32) -> String {
        let path = template
            .replace("{slug}", &self.slug())
            .replace("{query}", &urlencoding::encode(&self.query))
            .replace("{location}", &urlencoding::encode(&self.location))
            .replace("{experience}", &urlencoding::encode(&self.experience))
            .replace("{page}", &page.to_string());
        format!("{}{}", base_url.trim_end_matches('/'), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::DEFAULT_SEARCH_PATH;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn plan() -> CrawlPlan {
        CrawlPlan::new(
            strings(&["software engineer", "data analyst"]),
            strings(&["kolkata", "mumbai"]),
            strings(&["0", "1"]),
        )
    }

    #[test]
    fn product_is_ordered_query_then_location_then_experience() {
        let entries: Vec<_> = plan().entries().collect();
        assert_eq!(entries.len(), 8);
        let keys: Vec<_> = entries
            .iter()
            .map(|e| format!("{}|{}|{}", e.query, e.location, e.experience))
            .collect();
        assert_eq!(
            keys,
            vec![
                "software engineer|kolkata|0",
                "software engineer|kolkata|1",
                "software engineer|mumbai|0",
                "software engineer|mumbai|1",
                "data analyst|kolkata|0",
                "data analyst|kolkata|1",
                "data analyst|mumbai|0",
                "data analyst|mumbai|1",
            ]
        );
    }

    #[test]
    fn entries_restart_on_each_call() {
        let plan = plan();
        let first: Vec<_> = plan.entries().collect();
        let second: Vec<_> = plan.entries().collect();
        assert_eq!(first, second);
        assert_eq!(plan.len(), 8);
    }

    #[test]
    fn empty_dimension_gives_empty_plan() {
        let plan = CrawlPlan::new(strings(&["rust"]), Vec::new(), strings(&["0"]));
        assert!(plan.is_empty());
        assert_eq!(plan.entries().count(), 0);
    }

    #[test]
    fn search_url_fills_template() {
        let entry = PlanEntry {
            query: "software  engineer".into(),
            location: "kolkata".into(),
            experience: "0".into(),
        };
        assert_eq!(entry.slug(), "software-engineer");
        assert_eq!(
            entry.search_url("https://www.naukri.com/", DEFAULT_SEARCH_PATH, 2),
            "https://www.naukri.com/software-engineer-jobs-in-kolkata\
             ?k=software%20%20engineer&l=kolkata&experience=0&pageNo=2&nignbevent_src=jobsearchDeskGNB"
        );
    }

    #[test]
    fn location_is_encoded() {
        let entry = PlanEntry {
            query: "rust".into(),
            location: "new delhi".into(),
            experience: "3".into(),
        };
        let url = entry.search_url("https://x.test", "/{slug}?l={location}&p={page}", 1);
        assert_eq!(url, "https://x.test/rust?l=new%20delhi&p=1");
    }
}
