use std::sync::atomic::{AtomicBool, Ordering};

pub(crate) static TRACE_ENABLED: AtomicBool = AtomicBool::new(false);

pub fn enable_tracing() {
    TRACE_ENABLED.store(true, Ordering::Relaxed);
}

pub fn is_tracing() -> bool {
    TRACE_ENABLED.load(Ordering::Relaxed)
}

#[macro_export]
macro_rules! trace_packet {
    ($($arg:tt)*) => {{
        if $crate::logging::is_tracing() {
            $crate::display::log($crate::display::LogLevel::Trace, &std::format!($($arg)*));
        }
    }};
}

#[macro_export]
macro_rules! trace_shutdown {
    ($arg:literal) => {{
        if $crate::logging::is_tracing() {
            $crate::display::log($crate::display::LogLevel::Trace, std::concat!("Shutdown: ", $arg));
        }
    }};
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {{
        $crate::display::log($crate::display::LogLevel::Info, &std::format!($($arg)*));
    }};
}

#[macro_export]
macro_rules! warning {
    ($($arg:tt)*) => {{
        $crate::display::log($crate::display::LogLevel::Warning, &std::format!($($arg)*));
    }};
}
