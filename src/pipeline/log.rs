//! Plain-text, append-only invocation log
//!
//! One block per invocation:
//!
//! ```text
//! Run Command: <command line>
//! <stdout text>
//! <stderr text>
//! [Error Message:<message>]
//! [Stack Trace:
//! <trace>]
//! [Inner Exception:
//! <inner>]
//! <blank line>
//! ```

use std::path::Path;

use tokio::io::AsyncWriteExt;

use crate::common::Result;
use crate::process::{FailureCause, InvocationResult};

/// Header line that starts every invocation block
pub const ENTRY_HEADER: &str = "Run Command: ";

/// Render the log block for one invocation
pub fn format_entry(result: &InvocationResult) -> String {
    let mut block = String::new();
    block.push_str(ENTRY_HEADER);
    block.push_str(&result.command);
    block.push('\n');
    block.push_str(&result.stdout);
    block.push('\n');
    block.push_str(&result.stderr);
    block.push('\n');
    if let Some(cause) = &result.failure {
        push_failure(&mut block, cause);
    }
    block.push('\n');
    block
}

/// Render a block for a step that failed before producing a result
pub fn format_production_failure(cause: &FailureCause) -> String {
    let mut block = String::new();
    push_failure(&mut block, cause);
    block.push('\n');
    block
}

fn push_failure(block: &mut String, cause: &FailureCause) {
    block.push_str("Error Message:");
    block.push_str(&cause.message);
    block.push('\n');
    if let Some(trace) = &cause.backtrace {
        block.push_str("Stack Trace:\n");
        block.push_str(trace.trim_end());
        block.push('\n');
    }
    if !cause.chain.is_empty() {
        block.push_str("Inner Exception:\n");
        block.push_str(&cause.chain.join("\n"));
        block.push('\n');
    }
}

/// Append `text` to the log at `path`, creating the file and its directory
pub async fn append(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(text.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}
