//! Post-teardown absence checks

use std::time::Duration;

use super::remote::Fetcher;
use super::snapshot::Identifier;
use crate::common::config::DestroyConfig;
use crate::common::{Error, Result};

/// Confirms destroyed resources are gone from the remote
///
/// With the default single attempt, a fetch that still returns the entity
/// fails immediately. Extra attempts give eventually-consistent remotes a
/// bounded window to stop returning it.
pub struct DestroyVerifier<'a> {
    fetcher: &'a dyn Fetcher,
    max_attempts: u32,
    interval: Duration,
}

impl<'a> DestroyVerifier<'a> {
    pub fn new(fetcher: &'a dyn Fetcher, config: &DestroyConfig) -> Self {
        Self {
            fetcher,
            max_attempts: config.max_attempts.max(1),
            interval: config.interval(),
        }
    }

    /// Check every identifier; the first one still present fails the check.
    /// Transport errors are returned as-is and never read as "still exists".
    pub async fn verify_absent(&self, ids: &[Identifier]) -> Result<()> {
        for id in ids {
            self.verify_one(id).await?;
        }
        Ok(())
    }

    async fn verify_one(&self, id: &Identifier) -> Result<()> {
        for attempt in 1..=self.max_attempts {
            match self.fetcher.fetch(id).await {
                Err(e) if e.is_not_found() => {
                    tracing::debug!("Resource {} is gone", id);
                    return Ok(());
                }
                Err(e) => return Err(e),
                Ok(_) if attempt < self.max_attempts => {
                    tracing::debug!(
                        "Resource {} still visible (attempt {}/{})",
                        id,
                        attempt,
                        self.max_attempts
                    );
                    tokio::time::sleep(self.interval).await;
                }
                Ok(_) => break,
            }
        }
        Err(Error::StillExists { id: id.clone() })
    }
}
