pub mod classify;
pub mod extract;
pub mod normalize;

use crate::browser::Fragment;
use crate::model::{ExperienceLevel, RawListing};

/// Two-step pipeline: fragment → raw listing → experience level.
pub fn process_fragment(fragment: &Fragment) -> (RawListing, ExperienceLevel) {
    let raw = extract::extract_listing(fragment);
    let level = classify::classify_experience(raw.experience_text.as_deref());
    (raw, level)
}
