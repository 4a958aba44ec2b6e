//! Embedding API.
//!
//! The host talks to the engine through [`Context`] methods and [`JsValue`]
//! handles. A handle is a small copyable token addressing a slot in the
//! context's handle table; the slot owns one reference on the value, keeps
//! it alive across garbage collections, and is released explicitly with
//! [`Context::release_value`]. Every value returned by these methods is a
//! fresh handle the caller owns.

use crate::{
    builtins::{self, BuiltinId, error},
    compiler::{self, CompileKind},
    context::{Context, ExternalHandler, NativeFreeCallback},
    convert,
    exception::{ExcKind, Exception, JsResult, Throw},
    function,
    heap::ResourceTracker,
    intern::Magic,
    object::{self, InternalKey, ObjectType, PropAttrs, PropDescriptor, PropViewKind},
    value::Value,
    vm,
};

/// Handle to an engine value held by the embedder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsValue(u32);

impl JsValue {
    pub(crate) fn from_slot(slot: u32) -> Self {
        Self(slot)
    }

    pub(crate) fn slot(self) -> u32 {
        self.0
    }
}

/// Descriptor of one own property, as observed through the API.
#[derive(Debug)]
pub struct PropertyInfo {
    /// Present for data properties.
    pub value: Option<JsValue>,
    /// Present for accessor properties with a getter.
    pub getter: Option<JsValue>,
    /// Present for accessor properties with a setter.
    pub setter: Option<JsValue>,
    pub writable: bool,
    pub enumerable: bool,
    pub configurable: bool,
}

impl<T: ResourceTracker> Context<T> {
    // ----- value creation and release -----

    pub fn create_undefined(&mut self) -> JsValue {
        self.make_handle(Value::Undefined)
    }

    pub fn create_null(&mut self) -> JsValue {
        self.make_handle(Value::Null)
    }

    pub fn create_boolean(&mut self, value: bool) -> JsValue {
        self.make_handle(Value::Bool(value))
    }

    pub fn create_number(&mut self, value: f64) -> Result<JsValue, Exception> {
        let number = convert::make_number(self, value).map_err(|thrown| self.exception_of(thrown))?;
        Ok(self.make_handle(number))
    }

    pub fn create_string(&mut self, value: &str) -> Result<JsValue, Exception> {
        let string = convert::make_string(self, value.to_owned()).map_err(|thrown| self.exception_of(thrown))?;
        Ok(self.make_handle(string))
    }

    /// Creates a plain object with the Object prototype.
    pub fn create_object(&mut self) -> Result<JsValue, Exception> {
        let result = (|| {
            let prototype = builtins::get_builtin(self, BuiltinId::ObjectPrototype)?;
            object::create_object(self, Some(prototype), true, ObjectType::General)
        })();
        let obj = result.map_err(|thrown| self.exception_of(thrown))?;
        Ok(self.make_handle(Value::Ref(obj)))
    }

    /// Creates an array with the given length.
    pub fn create_array(&mut self, length: u32) -> Result<JsValue, Exception> {
        let array = builtins::array::create_array(self, length).map_err(|thrown| self.exception_of(thrown))?;
        Ok(self.make_handle(Value::Ref(array)))
    }

    /// Registers a native handler and wraps it in an external function
    /// object (spec: `jerry_create_external_function`).
    pub fn create_external_function(&mut self, handler: ExternalHandler<T>) -> Result<JsValue, Exception> {
        let index = u32::try_from(self.external_handlers.len()).expect("external handler table exceeds u32");
        self.external_handlers.push(handler);
        let func = function::create_external_function(self, index).map_err(|thrown| self.exception_of(thrown))?;
        Ok(self.make_handle(Value::Ref(func)))
    }

    /// Releases a handle, dropping its reference.
    pub fn release_value(&mut self, handle: JsValue) {
        let value = self.take_handle(handle);
        value.free(&mut self.heap);
        self.flush_freed_code();
    }

    /// Duplicates a handle (both must be released).
    pub fn copy_value(&mut self, handle: JsValue) -> JsValue {
        let copy = self.handle_value(handle).copy(&self.heap);
        self.make_handle(copy)
    }

    // ----- predicates -----

    #[must_use]
    pub fn is_undefined(&self, handle: JsValue) -> bool {
        self.handle_value(handle).is_undefined()
    }

    #[must_use]
    pub fn is_null(&self, handle: JsValue) -> bool {
        self.handle_value(handle).is_null()
    }

    #[must_use]
    pub fn is_boolean(&self, handle: JsValue) -> bool {
        self.handle_value(handle).is_boolean()
    }

    #[must_use]
    pub fn is_number(&self, handle: JsValue) -> bool {
        self.handle_value(handle).is_number(&self.heap)
    }

    #[must_use]
    pub fn is_string(&self, handle: JsValue) -> bool {
        self.handle_value(handle).is_string(&self.heap)
    }

    #[must_use]
    pub fn is_object(&self, handle: JsValue) -> bool {
        self.handle_value(handle).is_object(&self.heap)
    }

    #[must_use]
    pub fn is_function(&self, handle: JsValue) -> bool {
        function::is_callable(self, self.handle_value(handle))
    }

    #[must_use]
    pub fn is_constructor(&self, handle: JsValue) -> bool {
        function::is_constructor(self, self.handle_value(handle))
    }

    #[must_use]
    pub fn is_array(&self, handle: JsValue) -> bool {
        self.handle_value(handle)
            .object_ref(&self.heap)
            .is_some_and(|obj| self.heap.object(obj).type_tag == ObjectType::Array)
    }

    // ----- scalar accessors -----

    #[must_use]
    pub fn get_boolean_value(&self, handle: JsValue) -> Option<bool> {
        match self.handle_value(handle) {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_number_value(&self, handle: JsValue) -> Option<f64> {
        self.handle_value(handle).as_number(&self.heap)
    }

    /// Character count of a string value.
    #[must_use]
    pub fn get_string_size(&self, handle: JsValue) -> Option<usize> {
        self.handle_value(handle)
            .as_str(&self.heap, &self.interns)
            .map(|s| s.chars().count())
    }

    /// Copies a string value out of the engine.
    #[must_use]
    pub fn get_string(&self, handle: JsValue) -> Option<String> {
        self.handle_value(handle)
            .as_str(&self.heap, &self.interns)
            .map(ToOwned::to_owned)
    }

    /// Array length, when the handle is an array.
    pub fn get_array_length(&mut self, handle: JsValue) -> Result<u32, Exception> {
        let Some(array) = self.handle_value(handle).object_ref(&self.heap) else {
            return Err(Exception::new(Some(ExcKind::TypeError), "value is not an array"));
        };
        object::array_length(self, array).map_err(|thrown| self.exception_of(thrown))
    }

    // ----- evaluation -----

    /// Parses and evaluates a script.
    pub fn eval(&mut self, source: &str) -> Result<JsValue, Exception> {
        let code = compiler::compile(self, source, CompileKind::Script).map_err(Exception::from_parse_error)?;
        let result = self.run_code(code);
        self.code.code_deref(code);
        self.flush_freed_code();
        // Tracker-driven safe point: collect cycles when the budget is near.
        if self.heap.wants_collection() {
            self.gc();
        }
        let value = result.map_err(|thrown| self.exception_of(thrown))?;
        Ok(self.make_handle(value))
    }

    /// Eval-mode evaluation (completion value semantics, deletable vars).
    pub fn eval_as_eval(&mut self, source: &str) -> Result<JsValue, Exception> {
        let code = compiler::compile(self, source, CompileKind::Eval { strict: false })
            .map_err(Exception::from_parse_error)?;
        let result = self.run_code(code);
        self.code.code_deref(code);
        self.flush_freed_code();
        let value = result.map_err(|thrown| self.exception_of(thrown))?;
        Ok(self.make_handle(value))
    }

    pub(crate) fn run_code(&mut self, code: crate::bytecode::CodeId) -> JsResult<Value> {
        let global = self.global_object()?;
        let env = self.global_environment()?;
        let this = Value::Ref(global);
        vm::run(self, code, &this, env, &[])
    }

    /// The global object.
    pub fn global(&mut self) -> Result<JsValue, Exception> {
        let global = self.global_object().map_err(|thrown| self.exception_of(thrown))?;
        self.heap.inc_ref(global);
        Ok(self.make_handle(Value::Ref(global)))
    }

    // ----- property access -----

    pub fn get_property(&mut self, obj: JsValue, name: &str) -> Result<JsValue, Exception> {
        let name = self.interns.intern(name);
        let Some(target) = self.handle_value(obj).object_ref(&self.heap) else {
            return Err(Exception::new(Some(ExcKind::TypeError), "value is not an object"));
        };
        let value = object::get(self, target, name).map_err(|thrown| self.exception_of(thrown))?;
        Ok(self.make_handle(value))
    }

    pub fn set_property(&mut self, obj: JsValue, name: &str, value: JsValue) -> Result<bool, Exception> {
        let name = self.interns.intern(name);
        let Some(target) = self.handle_value(obj).object_ref(&self.heap) else {
            return Err(Exception::new(Some(ExcKind::TypeError), "value is not an object"));
        };
        let stored = self.handle_value(value).copy(&self.heap);
        object::put(self, target, name, stored, true).map_err(|thrown| self.exception_of(thrown))
    }

    pub fn get_property_by_index(&mut self, obj: JsValue, index: u32) -> Result<JsValue, Exception> {
        let name = self.interns.intern_index(index);
        let Some(target) = self.handle_value(obj).object_ref(&self.heap) else {
            return Err(Exception::new(Some(ExcKind::TypeError), "value is not an object"));
        };
        let value = object::get(self, target, name).map_err(|thrown| self.exception_of(thrown))?;
        Ok(self.make_handle(value))
    }

    pub fn set_property_by_index(&mut self, obj: JsValue, index: u32, value: JsValue) -> Result<bool, Exception> {
        let name = self.interns.intern_index(index);
        let Some(target) = self.handle_value(obj).object_ref(&self.heap) else {
            return Err(Exception::new(Some(ExcKind::TypeError), "value is not an object"));
        };
        let stored = self.handle_value(value).copy(&self.heap);
        object::put(self, target, name, stored, true).map_err(|thrown| self.exception_of(thrown))
    }

    /// Defines an own data property with explicit attributes.
    pub fn define_own_property(
        &mut self,
        obj: JsValue,
        name: &str,
        value: JsValue,
        writable: bool,
        enumerable: bool,
        configurable: bool,
    ) -> Result<bool, Exception> {
        let name = self.interns.intern(name);
        let Some(target) = self.handle_value(obj).object_ref(&self.heap) else {
            return Err(Exception::new(Some(ExcKind::TypeError), "value is not an object"));
        };
        let stored = self.handle_value(value).copy(&self.heap);
        let desc = PropDescriptor::data(stored, PropAttrs::new(writable, enumerable, configurable));
        object::define_own_property(self, target, name, desc, true).map_err(|thrown| self.exception_of(thrown))
    }

    /// Reads an own property descriptor; `None` when absent.
    pub fn get_own_property_descriptor(
        &mut self,
        obj: JsValue,
        name: &str,
    ) -> Result<Option<PropertyInfo>, Exception> {
        let name = self.interns.intern(name);
        let Some(target) = self.handle_value(obj).object_ref(&self.heap) else {
            return Err(Exception::new(Some(ExcKind::TypeError), "value is not an object"));
        };
        let view = object::get_own_property(self, target, name).map_err(|thrown| self.exception_of(thrown))?;
        Ok(view.map(|view| {
            let attrs = view.attrs();
            match view.kind {
                PropViewKind::Data { value, .. } => {
                    let value = value.copy(&self.heap);
                    PropertyInfo {
                        value: Some(self.make_handle(value)),
                        getter: None,
                        setter: None,
                        writable: attrs.writable,
                        enumerable: attrs.enumerable,
                        configurable: attrs.configurable,
                    }
                }
                PropViewKind::Accessor { get, set, .. } => {
                    let getter = get.map(|func| {
                        self.heap.inc_ref(func);
                        self.make_handle(Value::Ref(func))
                    });
                    let setter = set.map(|func| {
                        self.heap.inc_ref(func);
                        self.make_handle(Value::Ref(func))
                    });
                    PropertyInfo {
                        value: None,
                        getter,
                        setter,
                        writable: false,
                        enumerable: attrs.enumerable,
                        configurable: attrs.configurable,
                    }
                }
            }
        }))
    }

    /// Deletes an own property.
    pub fn delete_property(&mut self, obj: JsValue, name: &str) -> Result<bool, Exception> {
        let name = self.interns.intern(name);
        let Some(target) = self.handle_value(obj).object_ref(&self.heap) else {
            return Err(Exception::new(Some(ExcKind::TypeError), "value is not an object"));
        };
        object::delete(self, target, name, false).map_err(|thrown| self.exception_of(thrown))
    }

    /// Own enumerable keys as an array value.
    pub fn get_object_keys(&mut self, obj: JsValue) -> Result<JsValue, Exception> {
        let Some(target) = self.handle_value(obj).object_ref(&self.heap) else {
            return Err(Exception::new(Some(ExcKind::TypeError), "value is not an object"));
        };
        let result = (|| {
            let names = object::own_property_names(self, target, true)?;
            let array = builtins::array::create_array(self, 0)?;
            for (index, name) in names.into_iter().enumerate() {
                let slot = self.interns.intern_index(index as u32);
                object::put(self, array, slot, Value::Str(name), false)?;
            }
            Ok(Value::Ref(array))
        })();
        let value = result.map_err(|thrown| self.exception_of(thrown))?;
        Ok(self.make_handle(value))
    }

    /// Visits every own property, lazily listable ones included. The
    /// callback receives name and value handles (released afterwards by the
    /// engine) and returns `false` to stop early.
    pub fn foreach_object_property(
        &mut self,
        obj: JsValue,
        mut callback: impl FnMut(&mut Self, JsValue, JsValue) -> bool,
    ) -> Result<(), Exception> {
        let Some(target) = self.handle_value(obj).object_ref(&self.heap) else {
            return Err(Exception::new(Some(ExcKind::TypeError), "value is not an object"));
        };
        let names = object::own_property_names(self, target, false).map_err(|thrown| self.exception_of(thrown))?;
        for name in names {
            let value = object::get(self, target, name).map_err(|thrown| self.exception_of(thrown))?;
            let name_handle = self.make_handle(Value::Str(name));
            let value_handle = self.make_handle(value);
            let proceed = callback(self, name_handle, value_handle);
            self.release_value(name_handle);
            self.release_value(value_handle);
            if !proceed {
                break;
            }
        }
        Ok(())
    }

    /// Prototype of an object (`None` encodes a null prototype).
    pub fn get_prototype(&mut self, obj: JsValue) -> Result<Option<JsValue>, Exception> {
        let Some(target) = self.handle_value(obj).object_ref(&self.heap) else {
            return Err(Exception::new(Some(ExcKind::TypeError), "value is not an object"));
        };
        Ok(self.heap.object(target).prototype.map(|proto| {
            self.heap.inc_ref(proto);
            self.make_handle(Value::Ref(proto))
        }))
    }

    /// Replaces an object's prototype.
    pub fn set_prototype(&mut self, obj: JsValue, prototype: Option<JsValue>) -> Result<(), Exception> {
        let Some(target) = self.handle_value(obj).object_ref(&self.heap) else {
            return Err(Exception::new(Some(ExcKind::TypeError), "value is not an object"));
        };
        let new_prototype = match prototype {
            Some(handle) => match self.handle_value(handle).object_ref(&self.heap) {
                Some(proto) => {
                    self.heap.inc_ref(proto);
                    Some(proto)
                }
                None => return Err(Exception::new(Some(ExcKind::TypeError), "prototype must be an object")),
            },
            None => None,
        };
        let old = std::mem::replace(&mut self.heap.object_mut(target).prototype, new_prototype);
        if let Some(old) = old {
            self.heap.dec_ref(old);
        }
        Ok(())
    }

    // ----- calls -----

    pub fn call_function(
        &mut self,
        func: JsValue,
        this: JsValue,
        args: &[JsValue],
    ) -> Result<JsValue, Exception> {
        let Some(target) = self.handle_value(func).object_ref(&self.heap) else {
            return Err(Exception::new(Some(ExcKind::TypeError), "value is not a function"));
        };
        let this_value = self.handle_value(this).copy(&self.heap);
        let arg_values: Vec<Value> = args.iter().map(|arg| self.handle_value(*arg).copy(&self.heap)).collect();
        let result = function::call(self, target, &this_value, &arg_values);
        this_value.free(&mut self.heap);
        for arg in arg_values {
            arg.free(&mut self.heap);
        }
        self.flush_freed_code();
        if self.heap.wants_collection() {
            self.gc();
        }
        let value = result.map_err(|thrown| self.exception_of(thrown))?;
        Ok(self.make_handle(value))
    }

    pub fn construct_object(&mut self, func: JsValue, args: &[JsValue]) -> Result<JsValue, Exception> {
        let Some(target) = self.handle_value(func).object_ref(&self.heap) else {
            return Err(Exception::new(Some(ExcKind::TypeError), "value is not a constructor"));
        };
        let arg_values: Vec<Value> = args.iter().map(|arg| self.handle_value(*arg).copy(&self.heap)).collect();
        let result = function::construct(self, target, &arg_values);
        for arg in arg_values {
            arg.free(&mut self.heap);
        }
        self.flush_freed_code();
        let value = result.map_err(|thrown| self.exception_of(thrown))?;
        Ok(self.make_handle(value))
    }

    // ----- native handles -----

    /// Binds a native pointer-sized handle to an object, with an optional
    /// free callback invoked at context teardown.
    pub fn set_object_native_handle(
        &mut self,
        obj: JsValue,
        native: usize,
        free_callback: Option<NativeFreeCallback>,
    ) -> Result<(), Exception> {
        let Some(target) = self.handle_value(obj).object_ref(&self.heap) else {
            return Err(Exception::new(Some(ExcKind::TypeError), "value is not an object"));
        };
        let index = u32::try_from(self.native_bindings.len()).expect("native binding table exceeds u32");
        self.native_bindings.push(Some((native, free_callback)));
        object::set_internal(self, target, InternalKey::NativeHandle, Value::Int(index as i32));
        Ok(())
    }

    /// Reads back a bound native handle.
    #[must_use]
    pub fn get_object_native_handle(&self, obj: JsValue) -> Option<usize> {
        let target = self.handle_value(obj).object_ref(&self.heap)?;
        match self.heap.object(target).find_internal(InternalKey::NativeHandle) {
            Some(Value::Int(index)) => self
                .native_bindings
                .get(*index as usize)
                .and_then(|binding| binding.map(|(native, _)| native)),
            _ => None,
        }
    }

    // ----- misc -----

    /// Pre-interns a set of host strings so later lookups are cheap.
    pub fn register_magic_strings(&mut self, strings: &[&str]) {
        for s in strings {
            self.interns.intern(s);
        }
    }

    /// Heap occupancy snapshot.
    #[must_use]
    pub fn heap_stats(&self) -> crate::heap::HeapStats {
        self.heap.stats()
    }

    /// Converts an in-flight throw into the public exception form,
    /// releasing the thrown value.
    pub(crate) fn exception_of(&mut self, thrown: Throw) -> Exception {
        let Throw(value) = thrown;
        let exception = if let Some(obj) = value.object_ref(&self.heap) {
            let name = object::get(self, obj, Magic::Name.id())
                .ok()
                .and_then(|name_value| {
                    let text = name_value.as_str(&self.heap, &self.interns).map(ToOwned::to_owned);
                    name_value.free(&mut self.heap);
                    text
                });
            let message = object::get(self, obj, Magic::Message.id())
                .ok()
                .map(|message_value| {
                    let text = message_value
                        .as_str(&self.heap, &self.interns)
                        .map(ToOwned::to_owned)
                        .unwrap_or_default();
                    message_value.free(&mut self.heap);
                    text
                })
                .unwrap_or_default();
            let kind = name.as_deref().and_then(|name| name.parse::<ExcKind>().ok());
            Exception::new(kind, message)
        } else {
            let message = convert::to_string_owned(self, &value).unwrap_or_else(|inner| {
                let Throw(inner_value) = inner;
                inner_value.free(&mut self.heap);
                "uncaught exception".to_owned()
            });
            Exception::new(None, message)
        };
        value.free(&mut self.heap);
        exception
    }
}

/// Raises a TypeError through the public API surface; used by embedder
/// handlers that need to throw.
pub fn throw_type_error<T: ResourceTracker>(ctx: &mut Context<T>, message: &str) -> JsValue {
    let Throw(value) = error::type_error(ctx, message);
    ctx.make_handle(value)
}
