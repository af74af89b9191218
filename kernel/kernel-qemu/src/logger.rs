use crate::debug_out;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

/// `log` backend over the QEMU debug console.
pub struct DebugConLogger {
    max_level: LevelFilter,
}

impl DebugConLogger {
    #[must_use]
    pub const fn new(max_level: LevelFilter) -> Self {
        Self { max_level }
    }

    /// Install this logger as the global `log` sink. Call once, early.
    ///
    /// # Errors
    /// Fails if a logger is already installed.
    #[allow(static_mut_refs)]
    pub fn init(self) -> Result<(), SetLoggerError> {
        // `log::set_logger` wants a &'static; park the instance in a
        // static. Single-threaded bring-up, written exactly once here.
        static mut LOGGER: Option<DebugConLogger> = None;

        let max_level = self.max_level;
        unsafe {
            LOGGER = Some(self);
            log::set_logger(LOGGER.as_ref().expect("just stored") as &dyn Log)?;
        }
        log::set_max_level(max_level);
        Ok(())
    }
}

impl Log for DebugConLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            debug_out!(
                "[{}] {}: {}\n",
                record.level(),
                record.target(),
                record.args()
            );
        }
    }

    fn flush(&self) {}
}
