//! Live configuration reload.

use crate::{
    config::Generation,
    poller::{CycleReport, ListingPoller},
};
use std::{path::PathBuf, sync::Arc};
use tokio::sync::mpsc;

/// Reloads the configuration whenever a trigger arrives on its channel.
pub struct ReloadController {
    poller: Arc<ListingPoller>,
    config_path: PathBuf,
    triggers: mpsc::Receiver<()>,
}

impl ReloadController {
    pub fn new(
        poller: Arc<ListingPoller>,
        config_path: PathBuf,
        triggers: mpsc::Receiver<()>,
    ) -> Self {
        Self {
            poller,
            config_path,
            triggers,
        }
    }

    /// Handles triggers until every sender is gone.
    pub async fn launch(mut self) {
        while self.triggers.recv().await.is_some() {
            self.reload().await;
        }
        tracing::debug!("Reload trigger channel closed");
    }

    /// Loads the configuration file again and hands it to the poller.
    ///
    /// A configuration that doesn't load leaves everything as it was.
    pub async fn reload(&self) -> Option<CycleReport> {
        tracing::info!(
            "Reloading configuration from {}",
            self.config_path.display()
        );

        match Generation::load(&self.config_path) {
            Ok(generation) => Some(self.poller.reload(generation).await),
            Err(error) => {
                tracing::error!("Failed to reload configuration, keeping the current one: {error:#}");
                None
            }
        }
    }
}
