use env_logger::Builder;
use std::io::Write;

/// Sets up `env_logger` with millisecond timestamps and colored levels. The filter comes from
/// `RUST_LOG`.
pub fn setup_logger() {
    let mut builder = Builder::from_default_env();

    builder
        .format_timestamp_millis()
        .format(|buf, record| {
            let level = record.level();
            let style = buf.default_level_style(level).bold();

            writeln!(
                buf,
                "{} - [{style}{:5}{style:#}] {}:{} - {}",
                buf.timestamp_millis(),
                level,
                record.file().unwrap_or_default(),
                record.line().unwrap_or_default(),
                record.args()
            )
        })
        .write_style(env_logger::WriteStyle::Auto)
        .try_init()
        .ok();
}
