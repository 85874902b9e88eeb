//! Test helpers for amq-client integration tests
//!
//! - MockNode: audio node serving a stream and a command endpoint
//! - wait_until: poll a condition with a deadline

pub mod mock_node;

pub use mock_node::MockNode;

use std::time::Duration;

/// Poll `condition` every 10ms until it holds, panicking after 5s
pub async fn wait_until<F: Fn() -> bool>(what: &str, condition: F) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {what}");
}
