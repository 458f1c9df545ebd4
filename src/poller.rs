//! Periodic listing poller.

use crate::{
    config::{Config, Generation},
    digest,
    fetch::PageSource,
    listing::{ListingItem, extract_listings},
    mail::MailSender,
    storage::SeenSet,
};
use rand::Rng;
use scraper::Html;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;

/// Most ads reported for one target in one cycle. The rest wait for the next.
pub const MAX_DIGEST_ITEMS: usize = 5;

/// What the cycles share. Owned by the run gate, so only one cycle at a time.
struct CycleState {
    seen: SeenSet,
    /// Set for the first cycle of a generation: remember, don't notify.
    baseline: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOutcome {
    FetchFailed,
    /// Baseline cycle; this many ads are now remembered for the target.
    Baseline(usize),
    /// Nothing new.
    Quiet,
    Notified(usize),
    RenderFailed(usize),
    DeliveryFailed(usize),
}

#[derive(Debug, Default)]
pub struct CycleReport {
    pub targets: Vec<(String, TargetOutcome)>,
}

impl CycleReport {
    pub fn digests_sent(&self) -> usize {
        self.targets
            .iter()
            .filter(|(_, outcome)| matches!(outcome, TargetOutcome::Notified(_)))
            .count()
    }
}

pub struct ListingPoller {
    generation: RwLock<Arc<Generation>>,
    run_gate: Mutex<CycleState>,
    source: Box<dyn PageSource>,
    mailer: Box<dyn MailSender>,
}

impl ListingPoller {
    /// Creates a poller, starting from `seen` (usually empty).
    ///
    /// The first cycle is a baseline unless every target already has
    /// remembered ads.
    pub fn new(
        generation: Generation,
        seen: SeenSet,
        source: Box<dyn PageSource>,
        mailer: Box<dyn MailSender>,
    ) -> Self {
        let baseline = generation
            .config
            .urls
            .iter()
            .any(|url| seen.len(url) == 0);

        Self {
            generation: RwLock::new(Arc::new(generation)),
            run_gate: Mutex::new(CycleState { seen, baseline }),
            source,
            mailer,
        }
    }

    /// The active configuration generation.
    pub fn current(&self) -> Arc<Generation> {
        self.generation
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // Launches the periodic poller. Never returns.
    pub async fn launch(&self) {
        tracing::info!(
            "Starting listing poller with interval of {} minutes",
            self.current().config.interval
        );

        loop {
            tracing::debug!("[listing_poller]: Checking all urls");
            let report = self.run_cycle().await;
            tracing::debug!("Cycle finished, sent {} digests", report.digests_sent());

            // Re-read: a reload may have changed the interval.
            let minutes = self.current().config.interval;
            tokio::time::sleep(interval_duration(minutes)).await;
        }
    }

    /// Runs one pass over all targets, waiting for any pass already running.
    pub async fn run_cycle(&self) -> CycleReport {
        let mut state = self.run_gate.lock().await;
        self.cycle(&mut state).await
    }

    /// Replaces the active generation, forgets every seen ad, and runs a
    /// baseline pass under the new generation right away.
    pub async fn reload(&self, generation: Generation) -> CycleReport {
        let mut state = self.run_gate.lock().await;

        let previous = {
            let mut active = self
                .generation
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *active, Arc::new(generation))
        };
        state.seen.reset();
        state.baseline = true;

        let current = self.current();
        warn_on_relay_change(&previous.config, &current.config);
        tracing::info!(
            "Loaded new configuration watching {} urls",
            current.config.urls.len()
        );

        self.cycle(&mut state).await
    }

    async fn cycle(&self, state: &mut CycleState) -> CycleReport {
        let generation = self.current();
        let config = &generation.config;
        let mut report = CycleReport::default();

        for (index, url) in config.urls.iter().enumerate() {
            if index > 0 {
                pause(config).await;
            }

            let outcome = self.check_target(&generation, state, url).await;
            report.targets.push((url.clone(), outcome));
        }

        // Baseline is over once every target had its first look.
        if state.baseline {
            state.baseline = false;
            tracing::info!(
                "Looking for new ads every {} minutes and sending them to {}",
                config.interval,
                config.to_email
            );
        }

        if let Some(path) = &config.state_file {
            if let Err(error) = state.seen.save(path) {
                tracing::warn!("Failed to write seen ads to file: {error:#}");
            }
        }

        report
    }

    async fn check_target(
        &self,
        generation: &Generation,
        state: &mut CycleState,
        url: &str,
    ) -> TargetOutcome {
        let config = &generation.config;
        if config.debug {
            tracing::info!("Checking {url}");
        } else {
            tracing::debug!("Checking {url}");
        }

        // Retrieve the page. Don't stop if it fails.
        let body = match self.source.fetch(url, &config.user_agent).await {
            Ok(body) => body,
            Err(error) => {
                tracing::warn!("Retrieval error for {url}: {error:#}");
                return TargetOutcome::FetchFailed;
            }
        };

        let fresh = collect_fresh(&body, url, &mut state.seen, state.baseline);

        if state.baseline {
            let remembered = state.seen.len(url);
            tracing::info!("Added {remembered} ads from {url} to memory");
            return TargetOutcome::Baseline(remembered);
        }

        if fresh.is_empty() {
            tracing::debug!("No new ads on {url}");
            return TargetOutcome::Quiet;
        }

        let content = match digest::compose(generation, url, &fresh) {
            Ok(content) => content,
            Err(error) => {
                tracing::error!("Failed to render digest for {url}: {error}");
                return TargetOutcome::RenderFailed(fresh.len());
            }
        };

        // Seen ads stay seen even if delivery fails.
        match self
            .mailer
            .send(&config.to_email, &config.from_email, &content)
            .await
        {
            Ok(()) => {
                tracing::info!(
                    "Found {} new ads! Sent e-mail to {}",
                    fresh.len(),
                    config.to_email
                );
                TargetOutcome::Notified(fresh.len())
            }
            Err(error) => {
                tracing::error!("Failed to deliver digest for {url}: {error:#}");
                TargetOutcome::DeliveryFailed(fresh.len())
            }
        }
    }
}

/// Parses a page and picks out its new ads. Kept sync: `Html` is not `Send`.
fn collect_fresh(body: &str, url: &str, seen: &mut SeenSet, baseline: bool) -> Vec<ListingItem> {
    let document = Html::parse_document(body);
    select_fresh(extract_listings(&document), url, seen, baseline)
}

/// Records unseen ads as seen and returns them, in page order.
///
/// Outside a baseline, scanning stops at [`MAX_DIGEST_ITEMS`]: the ads after
/// that stay unseen and are picked up by a later cycle.
pub fn select_fresh(
    items: impl IntoIterator<Item = ListingItem>,
    url: &str,
    seen: &mut SeenSet,
    baseline: bool,
) -> Vec<ListingItem> {
    let mut fresh = Vec::new();

    for item in items {
        if !seen.is_new(url, &item.id) {
            continue;
        }

        seen.record(url, &item.id);
        fresh.push(item);

        if !baseline && fresh.len() >= MAX_DIGEST_ITEMS {
            break;
        }
    }

    fresh
}

fn interval_duration(minutes: u64) -> Duration {
    Duration::from_secs(minutes.saturating_mul(60))
}

/// Sleeps a random moment between two requests.
async fn pause(config: &Config) {
    let millis = rand::thread_rng().gen_range(config.min_delay_ms..=config.max_delay_ms);
    tokio::time::sleep(Duration::from_millis(millis)).await;
}

fn warn_on_relay_change(previous: &Config, current: &Config) {
    if previous.smtp_host != current.smtp_host || previous.smtp_port != current.smtp_port {
        tracing::warn!(
            "SMTP relay changed to {}:{}, restart to apply it",
            current.smtp_host,
            current.smtp_port
        );
    }
}
