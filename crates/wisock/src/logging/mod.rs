//! Internal logging macros.
//!
//! Every log line emitted by this crate goes through `emit!`, which forwards
//! to the `log` crate using the sink chosen in [`log_v0_4`]. By default that
//! is the global logger. The level wrappers only pick the level.

pub mod log_v0_4;

pub use log_v0_4::{set_internal_log_sink, silence_internal_logs};

macro_rules! emit {
    ($level:ident, $($arg:tt)+) => {
        log::log!(
            logger: $crate::logging::log_v0_4::internal::gwil(),
            log::Level::$level,
            $($arg)+
        )
    };
}

#[clippy::format_args]
macro_rules! trace {
    ($($arg:tt)+) => ($crate::logging::emit!(Trace, $($arg)+))
}

#[clippy::format_args]
macro_rules! debug {
    ($($arg:tt)+) => ($crate::logging::emit!(Debug, $($arg)+))
}

#[clippy::format_args]
macro_rules! info {
    ($($arg:tt)+) => ($crate::logging::emit!(Info, $($arg)+))
}

#[clippy::format_args]
macro_rules! warni {
    ($($arg:tt)+) => ($crate::logging::emit!(Warn, $($arg)+))
}

pub(crate) use {debug, emit, info, trace, warni as warn};
