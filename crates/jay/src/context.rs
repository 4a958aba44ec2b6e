//! The process-wide engine context.
//!
//! Everything the interpreter mutates lives here: the heap, the interner,
//! the code table, the LCache, the built-in object slots, the global
//! environment, registered external functions and the value handles held by
//! the embedder. There are no globals and no thread-local state; the
//! context is a value the embedder owns and passes around, so independent
//! contexts are possible (one per thread) even though a single context is
//! strictly single-threaded.

use crate::{
    builtins::{self, BuiltinId, error},
    engine::JsValue,
    exception::{JsResult, Throw},
    heap::{Heap, HeapData, HeapRef, NoLimitTracker, ResourceTracker},
    intern::Interner,
    lcache::LCache,
    port::{HostPort, StdPort},
    value::Value,
    bytecode::CodeTable,
    envs,
};

/// External function handler registered by the embedder.
///
/// Receives the function object, the `this` value and the argument handles;
/// returns a result handle or a handle to throw. All handles passed in are
/// released by the engine after the call returns.
pub type ExternalHandler<T> = fn(
    ctx: &mut Context<T>,
    func: JsValue,
    this: JsValue,
    args: &[JsValue],
) -> Result<JsValue, JsValue>;

/// Callback releasing an embedder native handle bound to an object.
pub type NativeFreeCallback = fn(native: usize);

/// Maximum nesting of `[[Call]]`/`[[Construct]]` frames.
const MAX_CALL_DEPTH: u32 = 512;

/// The engine context. See the module docs.
///
/// Generic over the heap's resource tracking strategy; the default imposes
/// no limits.
pub struct Context<T: ResourceTracker = NoLimitTracker> {
    pub(crate) heap: Heap<T>,
    pub(crate) interns: Interner,
    pub(crate) code: CodeTable,
    pub(crate) lcache: LCache,
    /// Built-in object slots, filled lazily by the registry and cleared by
    /// `finalize_builtins`.
    pub(crate) builtin_objects: [Option<HeapRef>; BuiltinId::COUNT],
    /// The global object-bound environment, created on first use.
    pub(crate) global_env: Option<HeapRef>,
    pub(crate) external_handlers: Vec<ExternalHandler<T>>,
    /// Native pointers bound to objects, with optional free callbacks.
    pub(crate) native_bindings: Vec<Option<(usize, Option<NativeFreeCallback>)>>,
    /// Values held by the embedder through `JsValue` handles; these are GC
    /// roots.
    pub(crate) handles: Vec<Option<Value>>,
    handle_free_list: Vec<u32>,
    pub(crate) port: Box<dyn HostPort>,
    call_depth: u32,
    /// Guards against re-entering error-object construction when raising an
    /// exception itself fails (for example under a heap limit).
    pub(crate) in_raise: bool,
    /// xorshift state for Math.random, seeded from the port clock.
    pub(crate) rand_state: u64,
}

impl Context {
    /// Creates a context with no resource limits and the standard port.
    #[must_use]
    pub fn new() -> Self {
        Self::with_tracker(NoLimitTracker)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ResourceTracker> Context<T> {
    /// Creates a context with a custom resource tracker.
    #[must_use]
    pub fn with_tracker(tracker: T) -> Self {
        Self::with_tracker_and_port(tracker, Box::new(StdPort))
    }

    /// Creates a context with a custom tracker and host port.
    #[must_use]
    pub fn with_tracker_and_port(tracker: T, mut port: Box<dyn HostPort>) -> Self {
        let seed = port.current_time_ms().to_bits() | 1;
        Self {
            heap: Heap::new(tracker),
            interns: Interner::new(),
            code: CodeTable::default(),
            lcache: LCache::new(),
            builtin_objects: [None; BuiltinId::COUNT],
            global_env: None,
            external_handlers: Vec::new(),
            native_bindings: Vec::new(),
            handles: Vec::new(),
            handle_free_list: Vec::new(),
            port,
            call_depth: 0,
            in_raise: false,
            rand_state: seed,
        }
    }

    /// Allocates heap data, translating tracker rejection into a RangeError.
    pub(crate) fn alloc(&mut self, data: HeapData) -> JsResult<HeapRef> {
        match self.heap.alloc(data) {
            Ok(r) => Ok(r),
            Err(_) => Err(error::range_error(self, "allocation failed: heap limit reached")),
        }
    }

    /// The global object, instantiating the built-in on first use.
    pub(crate) fn global_object(&mut self) -> JsResult<HeapRef> {
        builtins::get_builtin(self, BuiltinId::Global)
    }

    /// The global lexical environment (object-bound over the global object).
    pub(crate) fn global_environment(&mut self) -> JsResult<HeapRef> {
        if let Some(env) = self.global_env {
            return Ok(env);
        }
        let global = self.global_object()?;
        let env = envs::create_object_env(self, global, None)?;
        self.global_env = Some(env);
        Ok(env)
    }

    /// Call-depth guard; raises a RangeError past the nesting limit.
    pub(crate) fn enter_call(&mut self) -> JsResult<()> {
        if self.call_depth >= MAX_CALL_DEPTH {
            return Err(error::range_error(self, "maximum call stack size exceeded"));
        }
        self.call_depth += 1;
        Ok(())
    }

    pub(crate) fn leave_call(&mut self) {
        self.call_depth -= 1;
    }

    /// Wraps an owned value into an embedder handle (a GC root).
    pub(crate) fn make_handle(&mut self, value: Value) -> JsValue {
        if let Some(slot) = self.handle_free_list.pop() {
            self.handles[slot as usize] = Some(value);
            JsValue::from_slot(slot)
        } else {
            self.handles.push(Some(value));
            JsValue::from_slot(u32::try_from(self.handles.len() - 1).expect("handle table exceeds u32"))
        }
    }

    /// Borrows the value behind a handle.
    ///
    /// # Panics
    /// Panics on released handles.
    pub(crate) fn handle_value(&self, handle: JsValue) -> &Value {
        self.handles
            .get(handle.slot() as usize)
            .and_then(Option::as_ref)
            .expect("JsValue handle already released")
    }

    /// Takes ownership of the value behind a handle, releasing the slot
    /// without touching the reference count.
    pub(crate) fn take_handle(&mut self, handle: JsValue) -> Value {
        let value = self.handles
            .get_mut(handle.slot() as usize)
            .and_then(Option::take)
            .expect("JsValue handle already released");
        self.handle_free_list.push(handle.slot());
        value
    }

    /// Invokes a registered external function handler.
    pub(crate) fn dispatch_external(
        &mut self,
        handler: u32,
        func: HeapRef,
        this: &Value,
        args: &[Value],
    ) -> JsResult<Value> {
        let Some(&handler) = self.external_handlers.get(handler as usize) else {
            return Err(error::type_error(self, "stale external function"));
        };
        self.heap.inc_ref(func);
        let func_handle = self.make_handle(Value::Ref(func));
        let this_copy = this.copy(&self.heap);
        let this_handle = self.make_handle(this_copy);
        let arg_handles: Vec<JsValue> = args
            .iter()
            .map(|arg| {
                let copy = arg.copy(&self.heap);
                self.make_handle(copy)
            })
            .collect();

        let result = handler(self, func_handle, this_handle, &arg_handles);

        for handle in arg_handles {
            let value = self.take_handle(handle);
            value.free(&mut self.heap);
        }
        self.take_handle(func_handle).free(&mut self.heap);
        self.take_handle(this_handle).free(&mut self.heap);

        match result {
            Ok(handle) => Ok(self.take_handle(handle)),
            Err(handle) => Err(Throw(self.take_handle(handle))),
        }
    }

    /// Releases any native binding attached to a dead object slot table
    /// entry when the object that owned it was freed.
    pub(crate) fn release_native_binding(&mut self, index: u32) {
        if let Some(Some((native, free_cb))) = self.native_bindings.get(index as usize).copied() {
            if let Some(free_cb) = free_cb {
                free_cb(native);
            }
            self.native_bindings[index as usize] = None;
        }
    }

    /// Drains pending code releases left behind by freed function objects.
    pub(crate) fn flush_freed_code(&mut self) {
        let freed = self.heap.take_freed_code();
        for code in freed {
            self.code.code_deref(code);
        }
    }

    /// Runs a garbage collection at this safe point.
    ///
    /// Roots are the embedder handles, the built-in slots and the global
    /// environment. The LCache is invalidated wholesale afterwards.
    pub fn gc(&mut self) {
        let mut roots: Vec<HeapRef> = Vec::new();
        for value in self.handles.iter().flatten() {
            if let Value::Ref(r) = value {
                roots.push(*r);
            }
        }
        roots.extend(self.builtin_objects.iter().flatten().copied());
        roots.extend(self.global_env);
        self.heap.collect_garbage(&roots);
        self.lcache.invalidate_all();
        self.flush_freed_code();
    }

    /// Releases every built-in slot and null-clears it, then the global
    /// environment. After this no built-in references survive.
    pub(crate) fn finalize_builtins(&mut self) {
        for index in 0..self.builtin_objects.len() {
            if let Some(obj) = self.builtin_objects[index].take() {
                self.heap.dec_ref(obj);
            }
        }
        if let Some(env) = self.global_env.take() {
            self.heap.dec_ref(env);
        }
        self.flush_freed_code();
    }

    /// Next Math.random value in [0, 1): xorshift64*.
    pub(crate) fn next_random(&mut self) -> f64 {
        let mut x = self.rand_state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.rand_state = x;
        let mantissa = x.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 11;
        mantissa as f64 / (1u64 << 53) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::PanicPort;

    #[test]
    fn finalize_builtins_null_clears_every_slot() {
        let mut ctx = Context::with_tracker_and_port(NoLimitTracker, Box::new(PanicPort));
        let result = ctx.eval("Math.floor(1.5) + [].length").unwrap();
        ctx.release_value(result);
        assert!(ctx.builtin_objects.iter().any(Option::is_some));

        ctx.finalize_builtins();
        assert!(ctx.builtin_objects.iter().all(Option::is_none));
        assert!(ctx.global_env.is_none());

        // With the roots gone, a collection leaves nothing behind.
        ctx.gc();
        assert_eq!(ctx.heap.stats().live_objects, 0);
    }

    #[test]
    fn handles_are_garbage_collection_roots() {
        let mut ctx = Context::with_tracker_and_port(NoLimitTracker, Box::new(PanicPort));
        let kept = ctx.eval("({held: 1})").unwrap();
        ctx.gc();
        assert!(ctx.is_object(kept));
        ctx.release_value(kept);
    }

    #[test]
    fn random_stays_in_the_half_open_unit_interval() {
        let mut ctx = Context::with_tracker_and_port(NoLimitTracker, Box::new(PanicPort));
        for _ in 0..64 {
            let x = ctx.next_random();
            assert!((0.0..1.0).contains(&x));
        }
    }
}

impl<T: ResourceTracker> Drop for Context<T> {
    fn drop(&mut self) {
        // Release embedder handles first, then the built-in graph; anything
        // left is unreachable and torn down by the heap's own Drop.
        for index in 0..self.handles.len() {
            if let Some(value) = self.handles[index].take() {
                value.free(&mut self.heap);
            }
        }
        self.finalize_builtins();
        for index in 0..self.native_bindings.len() {
            self.release_native_binding(u32::try_from(index).expect("native binding table exceeds u32"));
        }
    }
}
