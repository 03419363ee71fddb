//! Completion notices written to the log
//!
//! Stands in for a mail relay; delivery is best-effort either way.

use async_trait::async_trait;
use docsign_core::{Notifier, NotifyError};
use tracing::info;

#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_completion(
        &self,
        document_title: &str,
        recipient_name: &str,
        recipient_email: &str,
    ) -> Result<(), NotifyError> {
        info!(
            to = recipient_email,
            signer = recipient_name,
            "Document completed: {}",
            document_title
        );
        Ok(())
    }
}
