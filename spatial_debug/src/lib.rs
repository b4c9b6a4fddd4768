//! Structured logging in the style the rest of this workspace uses.
//!
//! There's no external logging facade here on purpose: call sites reach for
//! [`print_debug!`] the same way the rest of the workspace does, and the
//! `debug` feature makes the whole thing free in release builds.
#![warn(missing_docs)]

use std::cell::Cell;
use std::fmt::Display;

thread_local! {
    static INDENT: Cell<usize> = const { Cell::new(0) };
}

const ARROW: &str = "└─";
const INDENT_WIDTH: usize = 2;

/// Prints an indented, depth-tracked debug message.
///
/// Behind the `debug` feature; compiles away to nothing otherwise so callers
/// can sprinkle it through hot paths without a runtime cost in release builds.
#[macro_export]
macro_rules! print_debug {
    ($format:expr) => {
        #[cfg(feature = "debug")]
        $crate::print_indented(::std::format!($format));
    };
    ($format:expr, $($arguments:tt)*) => {
        #[cfg(feature = "debug")]
        $crate::print_indented(::std::format!($format, $($arguments)*));
    };
}

/// Prints `message` at the current indentation depth.
///
/// Exposed so [`print_debug!`] can call it; prefer the macro at call sites.
pub fn print_indented(message: String) {
    let offset = INDENT.with(|indent| indent.get());

    if offset > 0 {
        println!("{}{ARROW} {message}", " ".repeat(offset * INDENT_WIDTH));
    } else {
        println!("{message}");
    }
}

/// RAII guard that increases the indentation depth of [`print_debug!`] for
/// the lifetime of a nested operation (e.g. one level of tree recursion).
///
/// ```
/// # use spatial_debug::DebugScope;
/// let _scope = DebugScope::enter();
/// spatial_debug::print_debug!("nested message");
/// ```
#[must_use]
pub struct DebugScope {
    _private: (),
}

impl DebugScope {
    /// Enters a new, deeper logging scope.
    pub fn enter() -> Self {
        INDENT.with(|indent| indent.set(indent.get() + 1));
        Self { _private: () }
    }
}

impl Drop for DebugScope {
    fn drop(&mut self) {
        INDENT.with(|indent| indent.set(indent.get().saturating_sub(1)));
    }
}

/// Formats a duration the way build/query timing lines report it: whole
/// milliseconds when large enough to matter, microseconds otherwise.
pub fn format_elapsed(elapsed: std::time::Duration) -> impl Display {
    let micros = elapsed.as_micros();
    if micros >= 1000 {
        format!("{:.2} ms", micros as f64 / 1000.0)
    } else {
        format!("{micros} us")
    }
}
