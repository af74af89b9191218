//! Loader-side `log` backend.
//!
//! Mirrors every record to the UEFI text console for as long as Boot
//! Services are alive, and unconditionally to the QEMU debug console, the
//! only diagnostic channel that survives `ExitBootServices`.

use kernel_qemu::debug_out;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

pub struct LoaderLogger {
    max_level: LevelFilter,
    console_available: bool,
}

impl LoaderLogger {
    #[must_use]
    pub const fn new(max_level: LevelFilter) -> Self {
        Self {
            max_level,
            console_available: true,
        }
    }

    /// Install as the global logger; call once during early init.
    ///
    /// # Errors
    /// Fails if a logger is already installed.
    #[allow(static_mut_refs)]
    pub fn init(self) -> Result<&'static mut Self, SetLoggerError> {
        // `log::set_logger` needs a &'static; the loader is single-threaded
        // and this is written exactly once.
        static mut LOGGER: Option<LoaderLogger> = None;

        unsafe {
            LOGGER = Some(self);
            log::set_logger(LOGGER.as_ref().expect("just stored") as &'static dyn Log)?;
        }
        log::set_max_level(LevelFilter::Trace);
        unsafe { Ok(LOGGER.as_mut().expect("just stored")) }
    }

    /// Stop touching the UEFI console; Boot Services are going away.
    pub const fn exit_boot_services(&mut self) {
        self.console_available = false;
    }
}

impl Log for LoaderLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        debug_out!(
            "[{}] {}: {}\n",
            record.level(),
            record.target(),
            record.args()
        );

        if self.console_available {
            uefi::println!(
                "[{}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            );
        }
    }

    fn flush(&self) {}
}
