//! Context Store: per-thread stack of symbol frames that snippets see as
//! ambient globals.
//!
//! Each [`push`] stores the *flattened* view (everything below plus the new
//! bindings), so the top frame alone is the current context. Frames never
//! change once pushed.

use crate::value::Bindings;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::ops::Deref;

thread_local! {
    static STACK: RefCell<Vec<Bindings>> = const { RefCell::new(Vec::new()) };
}

/// Keeps a frame on the calling thread's stack until dropped.
///
/// Not `Send`: the frame belongs to the thread that pushed it.
#[must_use = "the frame is popped as soon as the guard is dropped"]
pub struct ContextGuard {
    frame: Bindings,
    index: usize,
    _not_send: PhantomData<*const ()>,
}

impl Deref for ContextGuard {
    type Target = Bindings;

    fn deref(&self) -> &Bindings {
        &self.frame
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        // Truncate rather than pop so a guard dropped out of order cannot
        // leave its own frame behind.
        STACK.with(|stack| stack.borrow_mut().truncate(self.index));
    }
}

/// Push `bindings` over the current context. Later bindings win.
pub fn push(bindings: Bindings) -> ContextGuard {
    let mut frame = current();
    frame.extend(bindings);
    let index = STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        stack.push(frame.clone());
        stack.len() - 1
    });
    ContextGuard {
        frame,
        index,
        _not_send: PhantomData,
    }
}

/// Snapshot of the current context; empty when nothing is pushed.
pub fn current() -> Bindings {
    STACK.with(|stack| stack.borrow().last().cloned().unwrap_or_default())
}

/// Run `f` with `bindings` pushed, popping them afterwards even if `f`
/// panics.
pub fn scope<R>(bindings: Bindings, f: impl FnOnce(&Bindings) -> R) -> R {
    let guard = push(bindings);
    f(&guard)
}

/// Number of frames on the calling thread's stack.
pub fn depth() -> usize {
    STACK.with(|stack| stack.borrow().len())
}
