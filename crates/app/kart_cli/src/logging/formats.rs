use std::io::Write;

use flexi_logger::{DeferredNow, style};
use log::Record;

/// `2026-01-01 12:00:00.000 INFO  kart_core::users::service: registered user`
pub fn cli_format(w: &mut dyn Write, now: &mut DeferredNow, record: &Record) -> std::io::Result<()> {
    let level = record.level();
    write!(
        w,
        "{} {} {}: {}",
        now.format("%Y-%m-%d %H:%M:%S%.3f"),
        style(level).paint(format!("{level:<5}")),
        record.module_path().unwrap_or("<unnamed>"),
        record.args()
    )
}
