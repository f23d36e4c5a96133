//! Checks for conditions that `unsafe` code relies on.
//!
//! Interrupt contexts carry raw back-references into objects that trap
//! context dereferences without holding a reference count. Before doing so
//! the code states what must hold with [`assert_unsafe_precondition!`].
//!
//! | Build | Failing check |
//! |-------|---------------|
//! | `debug_assertions` | panics |
//! | release with `--cfg hadron_hardened` | panics |
//! | release | compiled out, still type-checked |

/// Asserts a condition that subsequent `unsafe` code depends on for
/// soundness.
///
/// Use `debug_assert!` for plain logic invariants instead; this macro is for
/// conditions whose violation is undefined behaviour, such as a canary that
/// no longer matches before a raw pointer is dereferenced.
///
/// ```ignore
/// assert_unsafe_precondition!(core.canary().is_valid());
/// assert_unsafe_precondition!(slot < MAX_SLOTS, "slot {} out of range", slot);
/// ```
#[macro_export]
macro_rules! assert_unsafe_precondition {
    ($cond:expr $(,)?) => {
        $crate::assert_unsafe_precondition!(
            $cond,
            "unsafe precondition violated: {}",
            stringify!($cond)
        )
    };
    ($cond:expr, $($arg:tt)+) => {
        #[cfg(any(debug_assertions, hadron_hardened))]
        {
            if !$cond {
                panic!($($arg)+);
            }
        }
        #[cfg(not(any(debug_assertions, hadron_hardened)))]
        {
            if false {
                let _ = $cond;
            }
        }
    };
}
