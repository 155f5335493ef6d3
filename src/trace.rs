#![allow(unused_macros)]

macro_rules! debug {
    ($($arg:tt)+) => {
        #[cfg(feature = "tracing-layer")]
        tracing::debug!($($arg)+);
    }
}

macro_rules! trace {
    ($($arg:tt)+) => {
        #[cfg(feature = "tracing-layer")]
        tracing::trace!($($arg)+);
    }
}

macro_rules! warn {
    ($($arg:tt)+) => {
        #[cfg(feature = "tracing-layer")]
        tracing::warn!($($arg)+);
    }
}

macro_rules! error {
    ($($arg:tt)+) => {
        #[cfg(feature = "tracing-layer")]
        tracing::error!($($arg)+);
    }
}
