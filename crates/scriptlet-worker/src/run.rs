//! One script run: load, execute, finalize.

use scriptlet_channel::{
    ChannelBridge, ChannelLayout, OutputAccumulator, OutputSerializer, SnapshotLoader,
};
use scriptlet_lua::{ScriptSandbox, SharedBridge};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{info, warn};

/// Result of a run as the host sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Script completed and outputs were persisted.
    Succeeded,
    /// Script (or snapshot load) failed.
    ScriptFailed(String),
    /// Script completed but outputs could not be persisted.
    FinalizeFailed(String),
}

/// Executes scripts against the channel directory.
#[derive(Debug, Clone)]
pub struct RunExecutor {
    layout: ChannelLayout,
    sandbox: ScriptSandbox,
}

impl RunExecutor {
    pub fn new(layout: ChannelLayout, sandbox: ScriptSandbox) -> Self {
        Self { layout, sandbox }
    }

    pub fn layout(&self) -> &ChannelLayout {
        &self.layout
    }

    /// Runs `script` with a fresh snapshot and accumulator.
    ///
    /// Finalize is attempted whether or not the script succeeded. A script
    /// failure takes precedence over a finalize failure in the outcome.
    pub fn run(&self, script: &str) -> RunOutcome {
        let snapshot = match SnapshotLoader::new(&self.layout).load() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Failed to load channel snapshot");
                return RunOutcome::ScriptFailed(e.to_string());
            }
        };

        let bridge: SharedBridge = Rc::new(RefCell::new(
            ChannelBridge::new(snapshot).with_generated_dir(self.layout.generated_dir()),
        ));
        let result = self.sandbox.execute(script, &bridge);
        let accumulator = take_accumulator(bridge);

        let finalized = OutputSerializer::new(&self.layout).finalize(&accumulator);

        match (result.succeeded, finalized) {
            (true, Ok(())) => {
                info!("Run succeeded");
                RunOutcome::Succeeded
            }
            (true, Err(e)) => {
                warn!(error = %e, "Run finalize failed");
                RunOutcome::FinalizeFailed(e.to_string())
            }
            (false, finalized) => {
                if let Err(e) = finalized {
                    warn!(error = %e, "Finalize also failed after script failure");
                }
                let detail = result.error_detail.unwrap_or_default();
                info!(error = %detail, "Run failed");
                RunOutcome::ScriptFailed(detail)
            }
        }
    }
}

fn take_accumulator(bridge: SharedBridge) -> OutputAccumulator {
    match Rc::try_unwrap(bridge) {
        Ok(cell) => cell.into_inner().into_accumulator(),
        Err(shared) => shared.borrow().accumulator().clone(),
    }
}
