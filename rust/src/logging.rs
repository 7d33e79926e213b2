//! Verbosity-gated logging for the schedule builder.
//!
//! Logging compiles down to a single comparison when disabled (verbosity=0).
//! Levels:
//! - 0: SILENT (nothing)
//! - 1: CHANGES (placements, moves, commits, promoted ids)
//! - 2: CHECKS (eligibility rejections, conflict decisions, failed commits)
//! - 3: DEBUG (hover resolution, per-operation commit internals)

pub const VERBOSITY_SILENT: u8 = 0;
pub const VERBOSITY_CHANGES: u8 = 1;
pub const VERBOSITY_CHECKS: u8 = 2;
pub const VERBOSITY_DEBUG: u8 = 3;

/// Log at CHANGES level (verbosity >= 1).
///
/// Used for: accepted drops, recorded changes, commit outcomes.
#[macro_export]
macro_rules! log_changes {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_CHANGES {
            eprintln!("[schedule] {}", format_args!($($arg)*));
        }
    };
}

/// Log at CHECKS level (verbosity >= 2).
///
/// Used for: ineligible drops, conflicts found, policy decisions.
#[macro_export]
macro_rules! log_checks {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_CHECKS {
            eprintln!("[schedule:check] {}", format_args!($($arg)*));
        }
    };
}

/// Log at DEBUG level (verbosity >= 3).
#[macro_export]
macro_rules! log_debug {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_DEBUG {
            eprintln!("[schedule:debug] {}", format_args!($($arg)*));
        }
    };
}
