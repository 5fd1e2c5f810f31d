//! Three-phase hardware operations.
//!
//! Each action encapsulates one discrete bench operation as a
//! precondition / perform / postcondition contract, wrapped into a single
//! [`Action::execute`]. The pre and post phases capture checks before and
//! after a command is sent; preconditions are currently empty hooks that
//! can tighten over time, while postconditions always re-read the affected
//! keyword and compare it against the *requested* value rather than
//! trusting the write. The device layer is asynchronous and only partially
//! observable, so "did it take effect" must be re-queried.
//!
//! Actions read their targets from a [`SequenceEntry`]; a target key that
//! is absent from the entry makes `perform` a silent no-op and leaves
//! `postcondition` with nothing to check.

use async_trait::async_trait;

use crate::error::CalResult;
use crate::sequence::SequenceEntry;

mod calbench;
mod exposure;
mod power;
mod shutters;

pub use calbench::{SetCalSource, SetND1, SetND2};
pub use exposure::{SetExptime, StartExposure, WaitForReadout, WaitForReady};
pub use power::{PowerOffCalSource, PowerOnCalSource};
pub use shutters::{SetSourceSelectShutters, SetTimedShutters, SetTriggeredDetectors};

/// One discrete bench operation with a command/verify contract.
#[async_trait]
pub trait Action: Send + Sync {
    /// Short name for log lines and diagnostics.
    fn name(&self) -> &'static str;

    /// Check that the entry is structurally valid for this action.
    ///
    /// Reserved hook; no current action performs checks here.
    async fn precondition(&self, _entry: &SequenceEntry) -> CalResult<()> {
        Ok(())
    }

    /// Issue the side-effecting device writes (or waits) for this action.
    async fn perform(&self, entry: &SequenceEntry) -> CalResult<()>;

    /// Re-read the affected keywords and verify they match the request.
    async fn postcondition(&self, entry: &SequenceEntry) -> CalResult<()>;

    /// Run precondition, perform, and postcondition in order, propagating
    /// the first failure and skipping the remaining phases.
    async fn execute(&self, entry: &SequenceEntry) -> CalResult<()> {
        self.precondition(entry).await?;
        self.perform(entry).await?;
        self.postcondition(entry).await
    }
}
