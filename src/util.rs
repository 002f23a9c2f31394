//! Small shared helpers.

use std::time::Duration;

use rand::Rng;

/// Sleep for `base` with ±20% random jitter, so repeated settle intervals
/// do not form a detectable fixed cadence.
pub async fn settle(base: Duration) {
    let millis = base.as_millis() as u64;
    if millis == 0 {
        return;
    }
    let variance = millis / 5;
    let jittered = if variance > 0 {
        rand::thread_rng().gen_range(millis - variance..=millis + variance)
    } else {
        millis
    };
    tokio::time::sleep(Duration::from_millis(jittered)).await;
}
