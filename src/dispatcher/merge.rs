use anyhow::Result;

use super::{print_json, Context};
use crate::cli::formatters;
use holdings::merge;

pub fn dispatch_merge(ctx: &Context, dry_run: bool) -> Result<()> {
    let mut conn = ctx.connect()?;

    if dry_run {
        let analysis = merge::find_duplicates(&conn)?;
        if ctx.json {
            return print_json(&analysis);
        }
        println!("{}", formatters::format_duplicate_analysis(&analysis));
        return Ok(());
    }

    let report = merge::run_merge(&mut conn)?;
    if ctx.json {
        return print_json(&report);
    }
    println!("{}", formatters::format_merge_report(&report));
    Ok(())
}
