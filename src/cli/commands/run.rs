//! run and eval commands - Execute scripts in the sandboxed runtime

use std::sync::Arc;

use anyhow::{bail, Result};

use super::load_config;
use crate::cli::Context;
use crate::notify::TracingSink;
use crate::runtime::{ExecutionResult, NodeRuntime, StdConsole};
use crate::vfs::LocalFs;

fn runtime(ctx: &Context) -> Result<NodeRuntime> {
    let root = ctx.project_root()?;
    let config = load_config(&root)?;
    let runtime = NodeRuntime::new(
        Arc::new(LocalFs::new(root.clone())),
        Arc::new(TracingSink),
        Arc::new(StdConsole),
        config.runtime_settings(),
    )?;
    Ok(runtime)
}

/// The error was already written to the console's error channel.
fn finish(ctx: &Context, result: ExecutionResult) -> Result<()> {
    if !result.success {
        bail!("script failed");
    }
    if let Some(output) = result.output.filter(|_| !ctx.quiet) {
        println!("{output}");
    }
    Ok(())
}

/// Execute a project file.
pub fn run(ctx: &Context, file: &str) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(async {
        let runtime = runtime(ctx)?;
        anyhow::Ok(runtime.execute_file(file).await)
    })?;
    finish(ctx, result)
}

/// Execute inline source text.
pub fn eval(ctx: &Context, code: &str) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(async {
        let runtime = runtime(ctx)?;
        anyhow::Ok(runtime.execute_source(code).await)
    })?;
    finish(ctx, result)
}
