//! Detect a "ctrl-c" notification or other reason to exit.

use anyhow::Result;

/// Wait until a control-c notification is received.
///
/// See the documentation for `tokio::signal::ctrl_c` for caveats
/// about signal handlers being installed process-wide.
pub(crate) async fn wait_for_ctrl_c() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
