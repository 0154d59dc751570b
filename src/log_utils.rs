pub use log::debug;

/// Log a debug message, or print it directly to stderr when a local debug flag is set
///
/// The local flag allows progress of a single component to be followed without enabling debug
/// logging for the whole program.
///
/// # Examples
///
/// ```
/// debug_msg!(false, "Run {} at iteration {}", run_index, iteration); // debug log level only
/// debug_msg!(true, "Run {} at iteration {}", run_index, iteration); // always printed to stderr
/// ```
macro_rules! debug_msg {
    ($flag:expr, $($arg:tt)+) => {
        if $flag {
            eprintln!($($arg)+);
        } else {
            $crate::log_utils::debug!($($arg)+);
        }
    }
}

pub(crate) use debug_msg;
