//! §4.1 Session Manager and its Reconnect Driver.

pub mod manager;
pub mod reconnect;

pub use manager::{SessionChangeEvent, SessionGeneration, SessionManager};
pub use reconnect::{ExponentialBackoff, ReconnectState};

#[allow(unused)]
macro_rules! source_debug {
    ($gen: expr, $($arg:tt)*) => {
        log::debug!("gen:{} {}", $gen, format!($($arg)*));
    };
}
#[allow(unused)]
pub(crate) use source_debug;

#[allow(unused)]
macro_rules! source_warn {
    ($gen: expr, $($arg:tt)*) => {
        log::warn!("gen:{} {}", $gen, format!($($arg)*));
    };
}
#[allow(unused)]
pub(crate) use source_warn;

#[allow(unused)]
macro_rules! source_error {
    ($gen: expr, $($arg:tt)*) => {
        log::error!("gen:{} {}", $gen, format!($($arg)*));
    };
}
#[allow(unused)]
pub(crate) use source_error;
