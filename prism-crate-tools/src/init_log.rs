use std::io::Write;

/// 日志格式：`[HH:MM:SS] LEVEL [file:line] message`
///
/// 默认级别为 Info，可以通过 `RUST_LOG` 覆盖。
pub fn init_log() {
    build_logger().init();
}

/// 测试中可能被多次调用，重复初始化时静默忽略
pub fn try_init_log() {
    let _ = build_logger().is_test(true).try_init();
}

fn build_logger() -> env_logger::Builder {
    let mut builder = env_logger::Builder::new();
    builder
        .format(|buf, record| {
            let level_color = match record.level() {
                log::Level::Error => Some(anstyle::AnsiColor::Red),
                log::Level::Warn => Some(anstyle::AnsiColor::Yellow),
                log::Level::Info => Some(anstyle::AnsiColor::Green),
                _ => None,
            };
            let level_style = match level_color {
                Some(color) => buf.default_level_style(record.level()).fg_color(Some(anstyle::Color::Ansi(color))),
                None => buf.default_level_style(record.level()),
            };
            let grey = anstyle::Color::Rgb(anstyle::RgbColor(110, 110, 110));
            let grey_style = anstyle::Style::new().fg_color(Some(grey));

            // windows 和 unix 的路径分隔符都要处理
            let file = record.file().unwrap_or("").rsplit(['/', '\\']).next().unwrap_or("");
            let line = record.line().unwrap_or(0);
            let time = chrono::Local::now().format("%H:%M:%S");

            writeln!(
                buf,
                "{level_style}[{time}] {:<5}{level_style:#} {grey_style}[{file}:{line}]{grey_style:#} {}",
                record.level(),
                record.args()
            )
        })
        .filter(None, log::LevelFilter::Info)
        .parse_default_env();
    builder
}
