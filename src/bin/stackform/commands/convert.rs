//! `stackform convert` command

use anyhow::Result;

use stackform::core::DocFormat;
use stackform::normalize;
use stackform::ops::normalize_document;

use crate::cli::ConvertArgs;
use crate::commands::{load, parse_format, write_output};

pub fn execute(args: ConvertArgs) -> Result<i32> {
    let raw = load(&args.source)?;
    let target = parse_format(&args.format)?;

    let hint = match DocFormat::from_path(raw.source().path()) {
        DocFormat::Unknown => None,
        other => Some(other),
    };
    let (tree, _) = normalize_document(raw.text()?, hint)?;

    write_output(&normalize::serialize(&tree, target), args.output.as_deref())?;
    Ok(0)
}
