//! Test utilities shared by the unit tests
//!
//! Workers run on spawned tasks, so tests poll for the state they expect
//! instead of sleeping a fixed amount.

use crate::buffer::BufferLedger;
use crate::transport::MockTransport;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound for any single wait in a test
pub const WAIT_LIMIT: Duration = Duration::from_secs(5);

/// Mock transport over a small dedicated ledger
pub fn mock_client() -> Arc<MockTransport> {
    Arc::new(MockTransport::new(BufferLedger::new(4, 64)))
}

/// Poll `condition` every millisecond until it holds
///
/// Panics if it doesn't within [`WAIT_LIMIT`].
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT_LIMIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
