//! `stackform validate` command

use anyhow::Result;

use stackform::ops::{run, PipelineOptions};

use crate::cli::ValidateArgs;
use crate::commands::{build_context, load, print_findings};
use crate::EXIT_FINDINGS;

pub fn execute(args: ValidateArgs) -> Result<i32> {
    let raw = load(&args.source)?;

    let options = PipelineOptions {
        context: build_context(&args.context)?,
        skip_render: args.no_render,
        ..Default::default()
    };
    let outcome = run(&raw, &options)?;

    print_findings(&outcome.findings);
    if outcome.passed() {
        eprintln!(
            "ok: {} finding(s), no errors",
            outcome.findings.len()
        );
        Ok(0)
    } else {
        eprintln!(
            "failed: {} error(s) out of {} finding(s)",
            outcome.error_count(),
            outcome.findings.len()
        );
        Ok(EXIT_FINDINGS)
    }
}
