//! Stop Command

use anyhow::Result;

use runwatch_common::SessionId;
use runwatch_monitor::{HttpBackend, RunBackend};

use super::Context;
use crate::output::{print_message, print_success, print_warning, OutputFormat};

/// Ask the backend to stop a run without following it
pub async fn execute(session: String, ctx: &Context) -> Result<i32> {
    let backend = HttpBackend::new(&ctx.config.backend)?;
    let session = SessionId::new(session);
    let ack = backend.stop_run(&session).await?;

    if ctx.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&ack)?);
    } else if ack.accepted {
        print_success(&format!("Stop requested for run {}", session));
        if !ack.message.is_empty() {
            print_message(&ack.message, ctx.format);
        }
    } else {
        print_warning(&format!("Stop not accepted for run {}: {}", session, ack.message));
    }

    Ok(if ack.accepted { 0 } else { 1 })
}
