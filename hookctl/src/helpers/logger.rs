//! # Logger
//!
//! Diagnostics of the control plane, including the messages libbpf emits while
//! opening, loading and attaching the kernel program. Everything goes to
//! stderr: stdout is reserved to the event lines.

use std::{
    env,
    io::{stderr, IsTerminal, Write},
    sync::Mutex,
};

use anyhow::{anyhow, Result};
use libbpf_rs::PrintLevel;
use log::{log, Level, LevelFilter, Metadata, Record};
use termcolor::{BufferedStandardStream, Color, ColorChoice, ColorSpec, WriteColor};
use time::{macros::format_description, OffsetDateTime};

/// Target of the records forwarded from libbpf.
pub(crate) const LIBBPF_TARGET: &str = "libbpf";

pub(crate) struct Logger {
    /// Max level the logger will output.
    max_level: LevelFilter,
    inner: Mutex<LoggerWriter>,
}

struct LoggerWriter {
    out: Box<dyn WriteColor + Send>,
    /// Should colors be used in the output?
    use_colors: bool,
}

impl Logger {
    fn new(max_level: LevelFilter, out: Box<dyn WriteColor + Send>, use_colors: bool) -> Self {
        Self {
            max_level,
            inner: Mutex::new(LoggerWriter { out, use_colors }),
        }
    }

    /// Installs the logger writing to stderr as the global one.
    pub(crate) fn init(max_level: LevelFilter) -> Result<()> {
        let logger = Self::new(
            max_level,
            Box::new(BufferedStandardStream::stderr(ColorChoice::Auto)),
            Self::check_color_use(),
        );

        log::set_max_level(max_level);
        log::set_boxed_logger(Box::new(logger))?;
        Ok(())
    }

    fn try_log(&self, record: &Record) -> Result<()> {
        static LEVEL_COLORS: &[Option<Color>] = &[
            None,                // Default.
            Some(Color::Red),    // Error.
            Some(Color::Yellow), // Warn.
            Some(Color::Blue),   // Info.
            Some(Color::Cyan),   // Debug.
            Some(Color::White),  // Trace.
        ];
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| anyhow!("logger lock poisoned"))?;
        let inner = &mut *guard;

        // Timestamps are only useful when following the control flow closely.
        if self.max_level >= LevelFilter::Debug {
            OffsetDateTime::now_local()
                .unwrap_or_else(|_| OffsetDateTime::now_utc())
                .format_into(
                    &mut inner.out,
                    format_description!("[hour]:[minute]:[second].[subsecond digits:6] "),
                )?;
        }

        // Always show the level of error! and warn! messages.
        if record.level() <= LevelFilter::Warn || self.max_level >= LevelFilter::Debug {
            if inner.use_colors {
                inner
                    .out
                    .set_color(ColorSpec::new().set_fg(LEVEL_COLORS[record.level() as usize]))?;
            }
            write!(inner.out, "{:5} ", record.level())?;
            if inner.use_colors {
                inner.out.reset()?;
            }
        }

        if record.target() == LIBBPF_TARGET {
            if inner.use_colors {
                inner.out.set_color(ColorSpec::new().set_dimmed(true))?;
            }
            write!(inner.out, "[libbpf] ")?;
            if inner.use_colors {
                inner.out.reset()?;
            }
        }

        writeln!(inner.out, "{}", record.args())?;

        inner.out.flush()?;
        Ok(())
    }

    fn check_color_use() -> bool {
        stderr().is_terminal() && matches!(env::var("TERM"), Ok(x) if x != "dumb")
    }
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // Not much we can do to report the error...
        let _ = self.try_log(record);
    }

    fn flush(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            let _ = inner.out.flush();
        }
    }
}

/// Route libbpf's own output through our logger. libbpf debug messages (e.g.
/// verifier logs) are only requested in verbose mode.
pub(crate) fn forward_libbpf_output(verbose: bool) {
    let level = match verbose {
        true => PrintLevel::Debug,
        false => PrintLevel::Info,
    };

    let _ = libbpf_rs::set_print(Some((level, libbpf_print)));
}

/// Level libbpf messages are logged at. Debug messages are only received when
/// explicitly asked for, they must show up at the default log level.
fn libbpf_level(level: PrintLevel) -> Level {
    match level {
        PrintLevel::Warn => Level::Warn,
        PrintLevel::Info | PrintLevel::Debug => Level::Info,
    }
}

fn libbpf_print(level: PrintLevel, msg: String) {
    log!(target: LIBBPF_TARGET, libbpf_level(level), "{}", msg.trim_end());
}

#[cfg(test)]
mod tests {
    use std::{io, sync::Arc};

    use log::Log;
    use termcolor::NoColor;

    use super::*;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn logger(max_level: LevelFilter) -> (Logger, Captured) {
        let out = Captured::default();
        let logger = Logger::new(max_level, Box::new(NoColor::new(out.clone())), false);
        (logger, out)
    }

    fn libbpf_record(logger: &Logger, level: PrintLevel, msg: &str) {
        logger.log(
            &Record::builder()
                .target(LIBBPF_TARGET)
                .level(libbpf_level(level))
                .args(format_args!("{}", msg.trim_end()))
                .build(),
        );
    }

    #[test]
    fn verbose_libbpf_output_at_default_level() {
        assert!(libbpf_level(PrintLevel::Debug) <= LevelFilter::Info);

        let (logger, out) = logger(LevelFilter::Info);
        libbpf_record(&logger, PrintLevel::Debug, "libbpf: map 'rb_comm': created\n");
        assert_eq!(out.text(), "[libbpf] libbpf: map 'rb_comm': created\n");
    }

    #[test]
    fn libbpf_warnings_show_level() {
        let (logger, out) = logger(LevelFilter::Warn);

        libbpf_record(&logger, PrintLevel::Info, "not shown");
        libbpf_record(&logger, PrintLevel::Warn, "failed to attach");
        assert_eq!(out.text(), "WARN  [libbpf] failed to attach\n");
    }

    #[test]
    fn level_filtering() {
        let (logger, out) = logger(LevelFilter::Info);

        logger.log(
            &Record::builder()
                .level(Level::Debug)
                .args(format_args!("hidden"))
                .build(),
        );
        logger.log(
            &Record::builder()
                .level(Level::Info)
                .args(format_args!("Filter set and ready"))
                .build(),
        );
        logger.log(
            &Record::builder()
                .level(Level::Error)
                .args(format_args!("Error polling ring buffer: -22"))
                .build(),
        );

        assert_eq!(
            out.text(),
            "Filter set and ready\nERROR Error polling ring buffer: -22\n"
        );
    }

    #[test]
    fn timestamps_at_debug_level() {
        let (logger, out) = logger(LevelFilter::Debug);

        logger.log(
            &Record::builder()
                .level(Level::Debug)
                .args(format_args!("scheduler hooks set up"))
                .build(),
        );

        // "HH:MM:SS.ffffff DEBUG scheduler hooks set up"
        let text = out.text();
        assert_eq!(&text[15..], " DEBUG scheduler hooks set up\n");
        assert_eq!(text.as_bytes()[8], b'.');
    }
}
