//! Contract checking with an installable failure handler.
//!
//! Wrong-variant accessors, refcount underflows, and similar violations are
//! engine bugs, not query errors. They are routed through a handler that a
//! host (or a test) may replace; the default behavior is to panic, which in
//! the absence of a catch unwinds out of the whole query.

use std::cell::RefCell;

type Handler = Box<dyn Fn(&str)>;

thread_local! {
    static HANDLER: RefCell<Option<Handler>> = RefCell::new(None);
}

/// Install a handler that observes contract violations before the engine
/// panics. Pass `None` to restore the default. The handler runs on the
/// violating thread; handles are per-thread, matching the engine's
/// single-threaded ownership model.
pub fn set_assertion_handler(handler: Option<Handler>) {
    HANDLER.with(|h| *h.borrow_mut() = handler);
}

/// Report a violation and diverge. Tests recover by catching the unwind.
pub(crate) fn contract_violation(msg: &str) -> ! {
    HANDLER.with(|h| {
        if let Some(handler) = h.borrow().as_ref() {
            handler(msg);
        }
    });
    panic!("contract violation: {}", msg);
}

macro_rules! pql_contract {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            $crate::contract::contract_violation(&format!($($arg)+));
        }
    };
}

pub(crate) use pql_contract;

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::panic;

    #[test]
    fn handler_sees_message_before_unwind() {
        thread_local! {
            static SEEN: Cell<bool> = Cell::new(false);
        }
        set_assertion_handler(Some(Box::new(|msg| {
            assert!(msg.contains("boom"));
            SEEN.with(|s| s.set(true));
        })));
        let result = panic::catch_unwind(|| contract_violation("boom"));
        set_assertion_handler(None);
        assert!(result.is_err());
        assert!(SEEN.with(|s| s.get()));
    }
}
