//! Listing extraction from finn.no mobile search result pages.

use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;

/// Shown in place of a price when the ad does not list one.
pub const PRICE_SENTINEL: &str = "0,-";

static AD_ANCHORS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div[data-automation-id='adList'] > a").unwrap());
static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h2[data-automation-id='titleRow']").unwrap());
static PRICE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span[data-automation-id='bodyRow']").unwrap());

/// One ad as shown on a search result page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingItem {
    /// The finn code, stable across reloads of the same ad.
    pub id: String,
    pub title: String,
    pub price: String,
}

impl ListingItem {
    /// The line used for this ad in a digest.
    pub fn line(&self, link_prefix: &str) -> String {
        format!(
            "{} ({}) - {}{}",
            self.title, self.price, link_prefix, self.id
        )
    }
}

/// Walks the ads of a result page in page order, skipping promoted ones.
///
/// A page without the ad list simply yields nothing. Ads without an id
/// can't be told apart between polls and are skipped as well.
pub fn extract_listings(document: &Html) -> impl Iterator<Item = ListingItem> + '_ {
    document
        .select(&AD_ANCHORS)
        .filter(|ad| !is_promoted(ad))
        .filter_map(listing_from_element)
}

fn is_promoted(ad: &ElementRef) -> bool {
    let element = ad.value();
    element.classes().any(|class| class == "bg-promoted")
        || element
            .attr("data-promoted")
            .is_some_and(|value| value != "false")
}

fn listing_from_element(ad: ElementRef) -> Option<ListingItem> {
    let id = ad.value().attr("id")?.trim();
    if id.is_empty() {
        tracing::debug!("Skipping ad without an id");
        return None;
    }

    Some(ListingItem {
        id: id.to_string(),
        title: first_text(&ad, &TITLE).unwrap_or_default(),
        price: first_text(&ad, &PRICE).unwrap_or_else(|| PRICE_SENTINEL.to_string()),
    })
}

fn first_text(ad: &ElementRef, selector: &Selector) -> Option<String> {
    ad.select(selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty())
}
