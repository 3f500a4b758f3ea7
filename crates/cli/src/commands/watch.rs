//! Watch Command

use anyhow::Result;

use runwatch_common::SessionId;

use super::{follow, Context};

/// Attach to a running session and follow it
pub async fn execute(session: String, ctx: &Context) -> Result<i32> {
    let mut monitor = runwatch_monitor::connect(&ctx.config)?;
    monitor.attach(SessionId::new(session))?;
    follow::follow(monitor, ctx).await
}
