use anyhow::{Context as _, Result};
use rust_decimal::Decimal;

use super::{print_json, Context};
use crate::cli::formatters;
use holdings::config::Thresholds;
use holdings::db;
use holdings::flows::{self, PolicyKind};

pub fn dispatch_reclassify(
    ctx: &Context,
    policy: PolicyKind,
    instrument: Option<i64>,
    up: Option<Decimal>,
    down: Option<Decimal>,
) -> Result<()> {
    let thresholds = Thresholds::new(
        up.unwrap_or(ctx.thresholds.up_threshold_percent),
        down.unwrap_or(ctx.thresholds.down_threshold_percent),
    );
    thresholds.validate()?;
    let policy = policy.build(thresholds);

    let mut conn = ctx.connect()?;
    let report = match instrument {
        Some(id) => {
            db::get_instrument(&conn, id)?
                .with_context(|| format!("Instrument {} not found", id))?;
            flows::reclassify_instrument(&mut conn, id, policy.as_ref())?
        }
        None => flows::reclassify_all(&mut conn, policy.as_ref())?,
    };

    if ctx.json {
        return print_json(&report);
    }
    println!("{}", formatters::format_reclassify_report(&report));
    Ok(())
}
