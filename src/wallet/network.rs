//! Network oracle seam: reads the wallet's chain and requests switches.

use async_trait::async_trait;

use crate::chain::ChainId;
use crate::error::SwitchError;

/// Chain state of the personal wallet's provider.
///
/// `request_switch` is user-confirmed and may be rejected. Callers observe
/// the outcome through `current_chain_id` rather than trusting the return
/// value alone.
#[async_trait]
pub trait NetworkOracle: Send + Sync {
    async fn current_chain_id(&self) -> ChainId;

    async fn request_switch(&self, target: ChainId) -> Result<(), SwitchError>;
}
