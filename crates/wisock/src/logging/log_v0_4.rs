// Which sink does wisock log to?
//
// * Nothing configured: the global `log::logger()`
// * `silence_internal_logs()` called: a nop logger
// * `set_internal_log_sink()` called: the given logger, forever
//
// Hosts that forward the global logger over the radio link (or into the
// notice channel) want the registry's own chatter to go somewhere else,
// otherwise every dispatched event produces more events.

pub(crate) mod internal {
    use std::sync::{
        OnceLock,
        atomic::{AtomicU8, Ordering},
    };

    pub(super) struct StaticLogger {
        manual_logger: OnceLock<&'static dyn log::Log>,
        state: AtomicU8,
    }

    impl StaticLogger {
        pub(super) const fn new() -> Self {
            Self {
                manual_logger: OnceLock::new(),
                state: AtomicU8::new(GWIL_STATE_GLOBAL_DEFAULT),
            }
        }

        pub(super) fn set_null(&'static self) {
            // Only GLOBAL -> NULL, a manual sink always wins
            _ = self.state.compare_exchange(
                GWIL_STATE_GLOBAL_DEFAULT,
                GWIL_STATE_NULL,
                Ordering::AcqRel,
                Ordering::Relaxed,
            );
        }

        pub(super) fn set_manual(&'static self, dlog: &'static dyn log::Log) {
            if self.manual_logger.set(dlog).is_ok() {
                self.state.store(GWIL_STATE_MANUAL, Ordering::Release);
            }
        }

        pub(super) fn state(&self) -> u8 {
            self.state.load(Ordering::Acquire)
        }
    }

    pub(super) static GWIL_STORE_GLOBAL: StaticLogger = StaticLogger::new();
    pub(super) const GWIL_STATE_GLOBAL_DEFAULT: u8 = 0;
    pub(super) const GWIL_STATE_NULL: u8 = 1;
    pub(super) const GWIL_STATE_MANUAL: u8 = 2;

    // "Get Wisock Internal Logger"
    #[inline]
    pub(crate) fn gwil() -> &'static dyn log::Log {
        match GWIL_STORE_GLOBAL.state() {
            GWIL_STATE_GLOBAL_DEFAULT => log::logger(),
            GWIL_STATE_MANUAL => match GWIL_STORE_GLOBAL.manual_logger.get() {
                Some(dlog) => *dlog,
                None => &NOP_LOGGER,
            },
            _ => &NOP_LOGGER,
        }
    }

    pub(super) struct NopLogger;
    static NOP_LOGGER: NopLogger = NopLogger;

    impl log::Log for NopLogger {
        fn enabled(&self, _: &log::Metadata) -> bool {
            false
        }

        fn log(&self, _: &log::Record) {}
        fn flush(&self) {}
    }
}

/// Set wisock's internal `log` sink
///
/// Only the first call has an effect. Once a manual sink is installed,
/// [`silence_internal_logs`] no longer does anything.
pub fn set_internal_log_sink(sink: &'static dyn log::Log) {
    internal::GWIL_STORE_GLOBAL.set_manual(sink);
}

/// Drop all of wisock's internal log output, unless a manual sink was set.
pub fn silence_internal_logs() {
    internal::GWIL_STORE_GLOBAL.set_null();
}
