use std::sync::mpsc::{self, Sender};
use std::sync::{Once, OnceLock};
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl Level {
    fn label(self) -> &'static str {
        match self {
            Level::Error => "ERROR",
            Level::Warn => "WARN ",
            Level::Info => "INFO ",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        }
    }

    fn color(self) -> &'static str {
        match self {
            Level::Error => "31",
            Level::Warn => "33",
            Level::Info => "32",
            Level::Debug => "36",
            Level::Trace => "34",
        }
    }
}

pub fn format_time(now: SystemTime) -> String {
    let duration = now.duration_since(UNIX_EPOCH).unwrap_or_default();
    let secs = duration.as_secs();

    let year = 1970 + (secs / 31_557_600); // Rough years
    let month = ((secs % 31_557_600) / 2_628_000) as u8 + 1;
    let day = ((secs % 2_628_000) / 86_400) as u8 + 1;
    let hour = ((secs % 86_400) / 3600) as u8;
    let minute = ((secs % 3600) / 60) as u8;
    let second = (secs % 60) as u8;

    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        year, month, day, hour, minute, second
    )
}

struct LogRecord {
    level: Level,
    target: &'static str,
    ts: SystemTime,
    message: String,
}

/// Process-wide logging sink. A background thread owns the receiving end of
/// the channel so that a producer on a reactor thread never blocks on the
/// formatting or the write syscall, only on the (lock-free, bounded-cost)
/// channel send.
pub struct Logger {
    sender: Sender<LogRecord>,
    min_level: Level,
}

static LOGGER: OnceLock<Logger> = OnceLock::new();
static INIT: Once = Once::new();

impl Logger {
    fn spawn(min_level: Level) -> Logger {
        let (tx, rx) = mpsc::channel::<LogRecord>();
        thread::Builder::new()
            .name("proxy_log-drain".to_string())
            .spawn(move || {
                for rec in rx {
                    let ts = format_time(rec.ts);
                    let line = format!(
                        "[{}] \x1b[30m#|| {} ||#\x1b[0m \x1b[{}m{}\x1b[0m: {}",
                        ts,
                        rec.target,
                        rec.level.color(),
                        rec.level.label(),
                        rec.message
                    );
                    if rec.level <= Level::Warn {
                        eprintln!("{line}");
                    } else {
                        println!("{line}");
                    }
                }
            })
            .expect("failed to spawn proxy_log drain thread");
        Logger { sender: tx, min_level }
    }

    fn enabled(&self, level: Level) -> bool {
        level <= self.min_level
    }
}

/// Initializes the global sink with the given minimum level. Safe to call
/// more than once; only the first call takes effect. Called by `main` at
/// startup once the server's configuration has been loaded.
pub fn init(min_level: Level) {
    INIT.call_once(|| {
        let _ = LOGGER.set(Logger::spawn(min_level));
    });
}

fn logger() -> &'static Logger {
    if LOGGER.get().is_none() {
        init(Level::Info);
    }
    LOGGER.get().expect("logger initialized")
}

#[doc(hidden)]
pub fn enabled(level: Level) -> bool {
    logger().enabled(level)
}

#[doc(hidden)]
pub fn emit(level: Level, target: &'static str, message: String) {
    let _ = logger().sender.send(LogRecord {
        level,
        target,
        ts: SystemTime::now(),
        message,
    });
}

#[macro_export]
macro_rules! log {
    ($level:expr, $target:expr, $($arg:tt)*) => {
        if $crate::enabled($level) {
            $crate::emit($level, $target, format!($($arg)*));
        }
    };
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => { $crate::log!($crate::Level::Info, "reactor_httpd", $($arg)*); };
}
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => { $crate::log!($crate::Level::Warn, "reactor_httpd", $($arg)*); };
}
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => { $crate::log!($crate::Level::Error, "reactor_httpd", $($arg)*); };
}
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => { $crate::log!($crate::Level::Debug, "reactor_httpd", $($arg)*); };
}
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => { $crate::log!($crate::Level::Trace, "reactor_httpd", $($arg)*); };
}
