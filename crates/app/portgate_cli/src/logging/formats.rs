use flexi_logger::{DeferredNow, Record};

/// `LEVEL message`, no timestamp.
pub fn cli_format(
    w: &mut dyn std::io::Write,
    _now: &mut DeferredNow,
    record: &Record,
) -> std::io::Result<()> {
    write!(w, "{:<5} {}", record.level(), record.args())
}
