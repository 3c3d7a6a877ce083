//! `stackform render` command

use anyhow::Result;

use stackform::core::DocFormat;
use stackform::normalize;
use stackform::ops::{normalize_document, render_template};

use crate::cli::RenderArgs;
use crate::commands::{build_context, load, parse_format, write_output};

pub fn execute(args: RenderArgs) -> Result<i32> {
    let raw = load(&args.source)?;
    let context = build_context(&args.context)?;

    let rendered = render_template(&raw, &context)?;

    let target = args.format.as_deref().map(parse_format).transpose()?;
    let text = match target {
        // Plain render keeps the rendered text byte-for-byte.
        None => rendered.text().to_string(),
        Some(format) => {
            let hint = match rendered.format() {
                DocFormat::Unknown => None,
                other => Some(other),
            };
            let (tree, _) = normalize_document(rendered.text(), hint)?;
            normalize::serialize(&tree, format)
        }
    };

    write_output(&text, args.output.as_deref())?;
    Ok(0)
}
