//! Execution-scoped trace context.
//!
//! Each thread owns a stack of [`Context`] values. The top of the stack is the
//! "current" context: it is what implicit parent lookup consults when a new
//! span is started without an explicit parent, and what an outbound boundary
//! wrapper injects into its carrier. Contexts are attached with an RAII guard
//! so the previous context is restored on every exit path, and no thread can
//! ever observe another thread's current context.

use crate::trace_context::SpanContext;
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;

thread_local! {
    static CURRENT_CONTEXT: RefCell<ContextStack> = RefCell::new(ContextStack::default());
}

/// An immutable, execution-scoped trace context.
///
/// A `Context` either carries the [`SpanContext`] of the span considered
/// current for the running unit of work, or is empty (no ongoing trace).
/// Write operations return a new value; attaching never mutates an existing
/// context.
///
/// # Examples
///
/// ```
/// use tracewire::{Context, SpanContext, SpanId, TraceFlags, TraceId};
///
/// let sc = SpanContext::new(
///     TraceId::from(1u128),
///     SpanId::from(1u64),
///     TraceFlags::SAMPLED,
///     false,
/// );
///
/// // Nothing attached yet.
/// assert!(Context::current().is_empty());
///
/// {
///     let _guard = Context::current().with_span_context(sc.clone()).attach();
///     assert_eq!(Context::current().span_context(), Some(&sc));
/// }
///
/// // Restored once the guard drops.
/// assert!(Context::current().is_empty());
/// ```
#[derive(Clone, Debug, Default)]
pub struct Context {
    span_context: Option<SpanContext>,
}

impl Context {
    /// An empty context, carrying no span context.
    pub fn new() -> Self {
        Context::default()
    }

    /// A clone of the context currently attached on this thread.
    pub fn current() -> Self {
        Self::map_current(|cx| cx.clone())
    }

    /// Applies a function to the current context, returning its value.
    ///
    /// This avoids cloning the current context when a read is all that is
    /// needed. The function must not attach another context while the
    /// current one is borrowed.
    pub fn map_current<T>(f: impl FnOnce(&Context) -> T) -> T {
        CURRENT_CONTEXT.with(|cx| cx.borrow().map_current_cx(f))
    }

    /// The span context this context carries, if any.
    pub fn span_context(&self) -> Option<&SpanContext> {
        self.span_context.as_ref()
    }

    /// Returns `true` if this context carries no valid span context.
    ///
    /// An empty context means there is no ongoing trace: the next span
    /// started from it becomes a root, and the propagator injects nothing.
    pub fn is_empty(&self) -> bool {
        !matches!(&self.span_context, Some(sc) if sc.is_valid())
    }

    /// Returns a copy of this context carrying the given span context.
    pub fn with_span_context(&self, span_context: SpanContext) -> Self {
        Context {
            span_context: Some(span_context),
        }
    }

    /// Returns a clone of the current thread's context carrying the given
    /// span context.
    pub fn current_with_span_context(span_context: SpanContext) -> Self {
        Self::map_current(|cx| cx.with_span_context(span_context))
    }

    /// Makes this context the current one for the thread.
    ///
    /// Dropping the returned [`ContextGuard`] restores the previous context.
    /// Guards may be dropped out of order without corrupting the stack; the
    /// restore then happens once the enclosing guard goes.
    ///
    /// # Examples
    ///
    /// ```
    /// use tracewire::{Context, SpanContext, SpanId, TraceFlags, TraceId};
    ///
    /// let sc = SpanContext::new(
    ///     TraceId::from(7u128),
    ///     SpanId::from(7u64),
    ///     TraceFlags::SAMPLED,
    ///     false,
    /// );
    /// let guard = Context::new().with_span_context(sc).attach();
    /// assert!(!Context::current().is_empty());
    ///
    /// drop(guard);
    /// assert!(Context::current().is_empty());
    /// ```
    pub fn attach(self) -> ContextGuard {
        let cx_pos = CURRENT_CONTEXT.with(|cx| cx.borrow_mut().push(self));

        ContextGuard {
            cx_pos,
            _marker: PhantomData,
        }
    }

    /// Runs `f` with this context attached, restoring the previous context
    /// on every exit path.
    pub fn in_scope<T>(self, f: impl FnOnce() -> T) -> T {
        let _guard = self.attach();
        f()
    }
}

/// Restores the previously current context when dropped.
#[derive(Debug)]
pub struct ContextGuard {
    // Position of the attached context in the thread's stack.
    cx_pos: u16,
    // Relies on thread locals, so must stay on its thread.
    _marker: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let pos = self.cx_pos;
        if pos > ContextStack::BASE_POS && pos < ContextStack::MAX_POS {
            CURRENT_CONTEXT.with(|context_stack| context_stack.borrow_mut().pop_id(pos));
        }
    }
}

/// A stack of the [`Context`] instances attached to a thread.
///
/// Contexts pop by position so that [`ContextGuard`] values dropped out of
/// order cannot restore the wrong context: a non-top pop only clears its
/// slot, and the actual restore happens when the top is popped.
///
/// The stack is thread local and guards are `!Send`, so every position handed
/// out stays valid for the stack it came from.
struct ContextStack {
    /// The context currently active on this thread, kept outside the `Vec`
    /// for cheap reads. Empty when nothing is attached.
    current_cx: Context,
    /// Previously attached contexts, below `current_cx`.
    stack: Vec<Option<Context>>,
    /// Relies on thread locals, so must stay on its thread.
    _marker: PhantomData<*const ()>,
}

impl ContextStack {
    const BASE_POS: u16 = 0;
    const MAX_POS: u16 = u16::MAX;
    const INITIAL_CAPACITY: usize = 8;

    #[inline(always)]
    fn push(&mut self, cx: Context) -> u16 {
        // The next position is the stack length plus one, since the top of
        // the stack lives in `current_cx`.
        let next_pos = self.stack.len() + 1;
        if next_pos < ContextStack::MAX_POS.into() {
            let current_cx = std::mem::replace(&mut self.current_cx, cx);
            self.stack.push(Some(current_cx));
            next_pos as u16
        } else {
            tracing::warn!(
                limit = ContextStack::MAX_POS,
                "too many attached contexts, attach ignored; current context unchanged"
            );
            ContextStack::MAX_POS
        }
    }

    #[inline(always)]
    fn pop_id(&mut self, pos: u16) {
        if pos == ContextStack::BASE_POS || pos == ContextStack::MAX_POS {
            // The base empty context cannot be popped and the overflow
            // position detaches nothing.
            tracing::warn!(position = pos, "attempted to pop a reserved context position");
            return;
        }
        let len: u16 = self.stack.len() as u16;
        if pos == len {
            // Top of the stack: clear any slots emptied by earlier
            // out-of-order pops, then restore the next live context.
            while let Some(None) = self.stack.last() {
                _ = self.stack.pop();
            }
            if let Some(Some(next_cx)) = self.stack.pop() {
                self.current_cx = next_cx;
            }
        } else {
            if pos >= len {
                tracing::warn!(
                    position = pos,
                    stack_length = len,
                    "attempted to pop beyond the end of the context stack"
                );
                return;
            }
            // Out-of-order pop: clear the slot in place.
            _ = self.stack[pos as usize].take();
        }
    }

    #[inline(always)]
    fn map_current_cx<T>(&self, f: impl FnOnce(&Context) -> T) -> T {
        f(&self.current_cx)
    }
}

impl Default for ContextStack {
    fn default() -> Self {
        ContextStack {
            current_cx: Context::default(),
            stack: Vec::with_capacity(ContextStack::INITIAL_CAPACITY),
            _marker: PhantomData,
        }
    }
}

impl fmt::Debug for ContextStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextStack")
            .field("current_cx", &self.current_cx)
            .field("depth", &self.stack.len())
            .finish()
    }
}
