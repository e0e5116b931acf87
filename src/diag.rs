//! # Diagnostics
//!
//! The engine emits two message shapes and leaves formatting to the
//! sink:
//!
//! - `error(template, arg)` for consistency failures
//! - `info(template, arg1, arg2)` for produced / consumed events
//!
//! `LogSink` forwards both to the `log` facade. On the target the
//! firmware installs [`ItmLogger`] as the global logger so records end up
//! on ITM stimulus port 0.

/// Receiver for engine diagnostics.
pub trait DiagnosticSink: Sync {
    /// Error condition with a single argument.
    fn error(&self, template: &'static str, arg: i32);

    /// Informational event with two arguments.
    fn info(&self, template: &'static str, arg1: i32, arg2: i32);
}

/// Sink forwarding to the `log` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn error(&self, template: &'static str, arg: i32) {
        log::error!(target: "pcsync", "{} ({})", template, arg);
    }

    fn info(&self, template: &'static str, arg1: i32, arg2: i32) {
        log::info!(target: "pcsync", "{} ({}, {})", template, arg1, arg2);
    }
}

impl<T: DiagnosticSink + ?Sized> DiagnosticSink for &T {
    fn error(&self, template: &'static str, arg: i32) {
        (**self).error(template, arg)
    }

    fn info(&self, template: &'static str, arg1: i32, arg2: i32) {
        (**self).info(template, arg1, arg2)
    }
}

// ---------------------------------------------------------------------------
// ITM logger (target only)
// ---------------------------------------------------------------------------

#[cfg(target_arch = "arm")]
pub use itm::ItmLogger;

#[cfg(target_arch = "arm")]
mod itm {
    use core::cell::RefCell;

    use cortex_m::interrupt::Mutex;
    use cortex_m::peripheral::ITM;

    /// `log::Log` implementation writing to ITM stimulus port 0.
    ///
    /// Records are dropped until [`ItmLogger::attach`] hands over the ITM
    /// peripheral.
    pub struct ItmLogger {
        itm: Mutex<RefCell<Option<ITM>>>,
    }

    impl ItmLogger {
        pub const fn new() -> Self {
            Self {
                itm: Mutex::new(RefCell::new(None)),
            }
        }

        /// Take ownership of the ITM peripheral and register `self` as the
        /// global logger.
        pub fn attach(&'static self, itm: ITM, level: log::LevelFilter) {
            cortex_m::interrupt::free(|cs| {
                *self.itm.borrow(cs).borrow_mut() = Some(itm);
            });
            // A second attach keeps the first logger
            if log::set_logger(self).is_ok() {
                log::set_max_level(level);
            }
        }
    }

    impl log::Log for ItmLogger {
        fn enabled(&self, metadata: &log::Metadata) -> bool {
            metadata.level() <= log::max_level()
        }

        fn log(&self, record: &log::Record) {
            if !self.enabled(record.metadata()) {
                return;
            }
            cortex_m::interrupt::free(|cs| {
                if let Some(itm) = self.itm.borrow(cs).borrow_mut().as_mut() {
                    cortex_m::itm::write_fmt(
                        &mut itm.stim[0],
                        format_args!("[{}] {}\n", record.level(), record.args()),
                    );
                }
            });
        }

        fn flush(&self) {}
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
