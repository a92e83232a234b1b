use core::fmt::Display;
use core::fmt::Write;
use log::{Level, LevelFilter, Log};
use owo_colors::OwoColorize;
use uart_16550::SerialPort;

use crate::drivers::vga;

struct Inner {
    serial_port: SerialPort,
}

impl Inner {
    fn write_with_color(&mut self, color: Color, string: impl Display) {
        // Write to serial with ANSI colors
        {
            let string: &dyn Display = match color {
                Color::Default => &string,
                Color::Gray => &string.dimmed(),
                Color::BrightRed => &string.bright_red(),
                Color::BrightYellow => &string.bright_yellow(),
                Color::BrightBlue => &string.bright_blue(),
                Color::BrightCyan => &string.bright_cyan(),
                Color::BrightMagenta => &string.bright_magenta(),
            };
            let mut writer = WriterWithCr::new(&mut self.serial_port);
            write!(writer, "{string}").unwrap();
        }

        // Mirror to the VGA terminal with the closest text-mode attribute
        vga::write_colored(
            match color {
                Color::Default => 0x0F,
                Color::Gray => 0x08,
                Color::BrightRed => 0x0C,
                Color::BrightYellow => 0x0E,
                Color::BrightBlue => 0x09,
                Color::BrightCyan => 0x0B,
                Color::BrightMagenta => 0x0D,
            },
            format_args!("{string}"),
        );
    }
}

struct KernelLogger {
    inner: spin::Mutex<Inner>,
}

static LOGGER: KernelLogger = KernelLogger {
    inner: spin::Mutex::new(Inner {
        serial_port: unsafe { SerialPort::new(0x3f8) },
    }),
};

impl Log for KernelLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        // Interrupt handlers log too; keep them out while we hold the lock.
        x86_64::instructions::interrupts::without_interrupts(|| {
            let mut inner = self.inner.lock();
            let level = record.level();
            inner.write_with_color(
                match level {
                    Level::Error => Color::BrightRed,
                    Level::Warn => Color::BrightYellow,
                    Level::Info => Color::BrightBlue,
                    Level::Debug => Color::BrightCyan,
                    Level::Trace => Color::BrightMagenta,
                },
                format_args!("{level:5} "),
            );
            inner.write_with_color(Color::Gray, format_args!("[{:>6}] ", crate::time::ticks()));
            inner.write_with_color(Color::Default, record.args());
            inner.write_with_color(Color::Default, "\n");
        });
    }

    fn flush(&self) {}
}

pub fn init() -> Result<(), log::SetLoggerError> {
    LOGGER.inner.lock().serial_port.init();
    log::set_max_level(LevelFilter::Info);
    log::set_logger(&LOGGER)
}

struct WriterWithCr<T> {
    writer: T,
}

impl<T> WriterWithCr<T> {
    pub const fn new(writer: T) -> Self {
        Self { writer }
    }
}

impl<T: Write> Write for WriterWithCr<T> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for c in s.chars() {
            match c {
                '\n' => self.writer.write_str("\r\n")?,
                c => self.writer.write_char(c)?,
            }
        }
        Ok(())
    }
}

enum Color {
    Default,
    Gray,
    BrightRed,
    BrightYellow,
    BrightBlue,
    BrightCyan,
    BrightMagenta,
}
