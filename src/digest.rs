//! Digest composition for newly found ads.

use crate::{config::Generation, listing::ListingItem, template::TemplateError};
use serde::Serialize;

/// Placeholders a digest template may use.
pub const DIGEST_FIELDS: &[&str] = &["ads", "num_results", "search_url"];

#[derive(Debug, Serialize)]
struct DigestData<'a> {
    ads: String,
    num_results: usize,
    search_url: &'a str,
}

/// Renders the notification for the fresh ads of one target.
pub fn compose(
    generation: &Generation,
    target: &str,
    fresh: &[ListingItem],
) -> Result<String, TemplateError> {
    let ads = fresh
        .iter()
        .map(|item| item.line(&generation.config.link_prefix))
        .collect::<Vec<_>>()
        .join("\n");

    let data = DigestData {
        ads: ads.trim_end_matches(['\n', '\r']).to_string(),
        num_results: fresh.len(),
        search_url: target,
    };

    generation.template.render(&data)
}
