//! Lowering mode: a thread-local redirect of donor primitive calls to the registry's own handles.
//!
//! While a [`LoweringMode`] guard is alive, [`PrimDef::call`](crate::prims::PrimDef::call)
//! resolves through the innermost mode first. A primitive the mode's registry registered under the
//! same name runs through that handle (and its autograd realization) instead of the donor.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use super::handle::OpHandle;

/// Registered handles keyed by operation name.
pub type HandleMap = HashMap<String, Arc<OpHandle>>;

struct ActiveMode {
    namespace: Arc<str>,
    handles: Arc<HandleMap>,
}

thread_local! {
    static ACTIVE: RefCell<Vec<ActiveMode>> = const { RefCell::new(Vec::new()) };
}

/// Guard for one lowering mode on this thread. Guards nest; the innermost one wins.
#[must_use = "lowering mode ends as soon as the guard is dropped"]
pub struct LoweringMode {
    _not_send: std::marker::PhantomData<*const ()>,
}

impl LoweringMode {
    pub fn enter(namespace: &str, handles: Arc<HandleMap>) -> Self {
        ACTIVE.with(|stack| {
            stack.borrow_mut().push(ActiveMode {
                namespace: Arc::from(namespace),
                handles,
            })
        });
        LoweringMode {
            _not_send: std::marker::PhantomData,
        }
    }
}

impl Drop for LoweringMode {
    fn drop(&mut self) {
        ACTIVE.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Namespace of the innermost active lowering mode on this thread.
pub fn active_namespace() -> Option<Arc<str>> {
    ACTIVE.with(|stack| stack.borrow().last().map(|mode| Arc::clone(&mode.namespace)))
}

pub fn is_active(namespace: &str) -> bool {
    active_namespace().is_some_and(|active| &*active == namespace)
}

/// Handle that replaces the donor primitive `name` under the innermost mode, if any.
pub fn redirect(name: &str) -> Option<Arc<OpHandle>> {
    ACTIVE.with(|stack| {
        stack
            .borrow()
            .last()
            .and_then(|mode| mode.handles.get(name).cloned())
    })
}
