//! Debounced settings writer
//!
//! Bursts of drag-and-drop operations collapse into a single write: the settings
//! blob is saved once no change has been seen for the quiet period.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::session::Core;
use crate::settings::SettingsStore;

/// Default quiet period before a write
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(500);

/// Saves the core's settings to `store` after each burst of changes
pub fn spawn_debounced_writer(
    core: Core,
    store: Arc<dyn SettingsStore>,
    quiet: Duration,
) -> JoinHandle<()> {
    let mut receiver = core.subscribe();

    tokio::spawn(async move {
        loop {
            // Wait for the first change of a burst
            match receiver.recv().await {
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return,
            }

            let mut closed = false;
            loop {
                match tokio::time::timeout(quiet, receiver.recv()).await {
                    Ok(Ok(_)) | Ok(Err(RecvError::Lagged(_))) => continue,
                    Ok(Err(RecvError::Closed)) => {
                        closed = true;
                        break;
                    }
                    // quiet period elapsed
                    Err(_) => break,
                }
            }

            flush(&core, store.as_ref());
            if closed {
                return;
            }
        }
    })
}

fn flush(core: &Core, store: &dyn SettingsStore) {
    match core.flush_to(store) {
        Ok(()) => tracing::info!("Saved settings"),
        Err(e) => tracing::error!("Failed to save settings: {}", e),
    }
}
