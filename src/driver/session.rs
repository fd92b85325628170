// ============================================================================
// File: packages/adles/src/driver/session.rs
// ----------------------------------------------------------------------------
// Scoped driver acquisition: one session per run, released on every exit
// path.
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{AdlesError, AdlesResult};

use super::PlatformDriver;

/// A driver held for the duration of one run
///
/// `close` releases the platform session and reports failures. Dropping an
/// unclosed session releases it in the background.
#[derive(Debug)]
pub struct DriverSession {
    driver: Arc<dyn PlatformDriver>,
    released: AtomicBool,
}

impl DriverSession {
    /// Acquire a session, failing when the platform is unhealthy
    pub async fn open(driver: Arc<dyn PlatformDriver>) -> AdlesResult<Self> {
        let health = driver
            .health_check()
            .await
            .map_err(|e| AdlesError::internal(format!("health check task failed: {e}")))?;
        if !health.is_healthy {
            return Err(AdlesError::platform(driver.driver_type(), health.message));
        }
        log::debug!("{} driver ready: {}", driver.driver_type(), health.message);
        Ok(Self {
            driver,
            released: AtomicBool::new(false),
        })
    }

    pub fn driver(&self) -> Arc<dyn PlatformDriver> {
        Arc::clone(&self.driver)
    }

    /// Release the session
    pub async fn close(self) -> AdlesResult<()> {
        self.released.store(true, Ordering::SeqCst);
        let result = self
            .driver
            .release()
            .await
            .map_err(|e| AdlesError::internal(format!("release task failed: {e}")))?;
        result.map_err(AdlesError::from)
    }
}

impl Drop for DriverSession {
    fn drop(&mut self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        log::debug!("releasing {} session on drop", self.driver.driver_type());
        if tokio::runtime::Handle::try_current().is_ok() {
            // release() spawns its own task, the handle is not awaited
            drop(self.driver.release());
        } else {
            log::warn!(
                "{} session dropped outside a runtime, platform session not released",
                self.driver.driver_type()
            );
        }
    }
}
