//! Run Command

use anyhow::Result;
use clap::Args;

use runwatch_common::{RunOptions, StartRunRequest};
use runwatch_monitor::{HttpBackend, RunBackend};

use super::{follow, Context};
use crate::output::{print_success, OutputFormat};

#[derive(Args)]
pub struct RunArgs {
    /// Project or folder to run
    pub target: String,

    /// Run the browser without a window
    #[arg(long)]
    pub headless: bool,

    /// Upper bound on the number of tests to execute
    #[arg(long)]
    pub max_tests: Option<u32>,

    /// Only run tests carrying this tag (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Application URL to test, when it differs from the project default
    #[arg(long)]
    pub app_url: Option<String>,

    /// Start the run, print its session ID and return
    #[arg(short, long)]
    pub detach: bool,
}

impl RunArgs {
    fn request(&self) -> StartRunRequest {
        StartRunRequest::new(self.target.clone()).with_options(RunOptions {
            headless: self.headless,
            max_tests: self.max_tests,
            tags: self.tags.clone(),
            base_url: self.app_url.clone(),
        })
    }
}

pub async fn execute(args: RunArgs, ctx: &Context) -> Result<i32> {
    let request = args.request();

    if args.detach {
        let backend = HttpBackend::new(&ctx.config.backend)?;
        let session = backend.start_run(&request).await?;
        match ctx.format {
            OutputFormat::Json => {
                println!("{}", serde_json::json!({ "session_id": session }));
            }
            OutputFormat::Plain => println!("{}", session),
            OutputFormat::Table => {
                print_success(&format!("Run started: {}", session));
                println!("  Follow it with: runwatch watch {}", session);
            }
        }
        return Ok(0);
    }

    let mut monitor = runwatch_monitor::connect(&ctx.config)?;
    monitor.start(&request).await?;
    follow::follow(monitor, ctx).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_carries_options() {
        let args = RunArgs {
            target: "shop/checkout".to_string(),
            headless: true,
            max_tests: Some(5),
            tags: vec!["smoke".to_string()],
            app_url: None,
            detach: false,
        };
        let request = args.request();
        assert_eq!(request.target, "shop/checkout");
        assert!(request.options.headless);
        assert_eq!(request.options.max_tests, Some(5));
        assert_eq!(request.options.tags, vec!["smoke"]);
    }
}
