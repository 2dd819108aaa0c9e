//! Startup and shutdown of the order engine.

use super::{EngineError, OrderEngine};

impl OrderEngine {
	/// Replays confirmations interrupted by a previous exit.
	pub async fn initialize(&self) -> Result<(), EngineError> {
		tracing::info!("Initializing order engine");
		let report = self.recover_pending_confirmations().await?;
		if report.examined > 0 {
			tracing::info!(
				examined = report.examined,
				updated = report.updated,
				dropped = report.dropped,
				unresolved = report.unresolved,
				"Recovered interrupted confirmations"
			);
		}
		Ok(())
	}

	pub async fn shutdown(&self) -> Result<(), EngineError> {
		tracing::info!("Shutting down order engine");
		Ok(())
	}
}
