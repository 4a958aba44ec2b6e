//! ECMA object model and property store.
//!
//! Every object is a type tag, a prototype link, two flag bits and the head
//! of its property chain: a singly linked list of fixed-size pair cells, each
//! holding up to two slots. A slot is named data, a named accessor pair, an
//! engine-internal property, or free (left behind by deletion). Iteration
//! order is insertion order, which the store preserves by only appending at
//! the tail of the chain.
//!
//! Lookup goes through the LCache first, then walks the chain, then gives
//! the built-in registry and the function model a chance to materialise the
//! property lazily (sections 4.B-4.D of the engine design).

use smallvec::SmallVec;

use crate::{
    builtins::{self, BuiltinId},
    bytecode::CodeId,
    context::Context,
    exception::JsResult,
    function,
    heap::{HeapData, HeapRef, ResourceTracker},
    intern::{Interner, Magic, StringId},
    value::{Value, same_value},
};

/// Object type tag.
///
/// Lexical environments are object-typed records; for them the `prototype`
/// field holds the outer environment instead of an ECMA prototype.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ObjectType {
    General,
    Function,
    BoundFunction,
    BuiltinFunction,
    ExternalFunction,
    Arguments,
    Array,
    StringWrapper,
    NumberWrapper,
    BooleanWrapper,
    DeclarativeEnv,
    ObjectBoundEnv,
}

impl ObjectType {
    pub(crate) fn is_lexical_env(self) -> bool {
        matches!(self, Self::DeclarativeEnv | Self::ObjectBoundEnv)
    }
}

/// The `{writable, enumerable, configurable}` attribute trio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PropAttrs {
    pub(crate) writable: bool,
    pub(crate) enumerable: bool,
    pub(crate) configurable: bool,
}

impl PropAttrs {
    pub(crate) const fn new(writable: bool, enumerable: bool, configurable: bool) -> Self {
        Self {
            writable,
            enumerable,
            configurable,
        }
    }

    /// Non-writable, non-enumerable, non-configurable.
    pub(crate) const FIXED: Self = Self::new(false, false, false);
    /// Writable only.
    pub(crate) const WRITABLE: Self = Self::new(true, false, false);
    /// Writable and configurable, non-enumerable.
    pub(crate) const WRITABLE_CONFIGURABLE: Self = Self::new(true, false, true);
    /// All three set; ordinary assignment creates properties like this.
    pub(crate) const ALL: Self = Self::new(true, true, true);
    /// Configurable only.
    pub(crate) const CONFIGURABLE: Self = Self::new(false, false, true);
}

/// Keys of engine-private properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InternalKey {
    /// Boxed primitive of wrapper objects and builtin prototypes.
    PrimitiveValue,
    /// Bound function: the wrapped target function object.
    BoundTarget,
    /// Bound function: the fixed `this` value.
    BoundThis,
    /// Bound function: heap list of leading arguments.
    BoundArgs,
    /// Bits 32-63 of a built-in's instantiated bitset.
    InstantiatedMask,
    /// Embedder-attached native pointer (index into the context's table).
    NativeHandle,
    /// Object-bound environments: the binding object.
    BindingObject,
}

/// One property slot.
#[derive(Debug)]
pub(crate) enum PropertySlot {
    /// Empty or deleted.
    Free,
    Data {
        name: StringId,
        attrs: PropAttrs,
        value: Value,
    },
    Accessor {
        name: StringId,
        attrs: PropAttrs,
        get: Option<HeapRef>,
        set: Option<HeapRef>,
    },
    Internal {
        key: InternalKey,
        value: Value,
    },
}

impl PropertySlot {
    fn name(&self) -> Option<StringId> {
        match self {
            Self::Data { name, .. } | Self::Accessor { name, .. } => Some(*name),
            _ => None,
        }
    }
}

/// A chain cell holding up to two slots.
#[derive(Debug)]
pub(crate) struct PropertyPair {
    slots: [PropertySlot; 2],
    next: Option<Box<PropertyPair>>,
}

/// Fixed extra state of extended objects, selected by type.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Extended {
    None,
    /// Ordinary function: scope environment and compiled-code blob.
    Function { scope: HeapRef, code: CodeId },
    /// Built-in object or routine.
    Builtin {
        builtin_id: BuiltinId,
        routine_id: u16,
        length: u8,
        /// Bits 0-31 of the lazily-instantiated-property bitset; bits 32-63
        /// live in the `InstantiatedMask` internal property when needed.
        instantiated: u32,
    },
    /// External (host) function: index into the context's handler table.
    External { handler: u32 },
}

/// An ECMA object (or lexical environment record).
#[derive(Debug)]
pub(crate) struct Object {
    pub(crate) type_tag: ObjectType,
    /// ECMA prototype, or the outer environment for env records.
    pub(crate) prototype: Option<HeapRef>,
    pub(crate) extensible: bool,
    pub(crate) is_builtin: bool,
    chain: Option<Box<PropertyPair>>,
    pub(crate) extended: Extended,
}

impl Object {
    pub(crate) fn new(type_tag: ObjectType, prototype: Option<HeapRef>, extensible: bool) -> Self {
        Self {
            type_tag,
            prototype,
            extensible,
            is_builtin: false,
            chain: None,
            extended: Extended::None,
        }
    }

    /// The compiled-code blob of an ordinary function object.
    pub(crate) fn function_code(&self) -> Option<CodeId> {
        match self.extended {
            Extended::Function { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Appends every heap reference this object owns.
    pub(crate) fn collect_refs(&self, out: &mut SmallVec<[HeapRef; 8]>) {
        if let Some(proto) = self.prototype {
            out.push(proto);
        }
        if let Extended::Function { scope, .. } = &self.extended {
            out.push(*scope);
        }
        let mut pair = self.chain.as_deref();
        while let Some(current) = pair {
            for slot in &current.slots {
                match slot {
                    PropertySlot::Data { value, .. } | PropertySlot::Internal { value, .. } => {
                        if let Value::Ref(r) = value {
                            out.push(*r);
                        }
                    }
                    PropertySlot::Accessor { get, set, .. } => {
                        if let Some(get) = get {
                            out.push(*get);
                        }
                        if let Some(set) = set {
                            out.push(*set);
                        }
                    }
                    PropertySlot::Free => {}
                }
            }
            pair = current.next.as_deref();
        }
    }

    /// Forgets owned values for the `ref-count-panic` teardown path.
    #[cfg(feature = "ref-count-panic")]
    pub(crate) fn disarm(&mut self) {
        let mut pair = self.chain.as_deref_mut();
        while let Some(current) = pair {
            for slot in &mut current.slots {
                if let PropertySlot::Data { value, .. } | PropertySlot::Internal { value, .. } = slot {
                    std::mem::forget(std::mem::replace(value, Value::Undefined));
                }
            }
            pair = current.next.as_deref_mut();
        }
    }

    /// Finds a named slot, returning its chain ordinal.
    pub(crate) fn find_named(&self, name: StringId) -> Option<(u16, &PropertySlot)> {
        let mut ordinal: u16 = 0;
        let mut pair = self.chain.as_deref();
        while let Some(current) = pair {
            for slot in &current.slots {
                if slot.name() == Some(name) {
                    return Some((ordinal, slot));
                }
                ordinal += 1;
            }
            pair = current.next.as_deref();
        }
        None
    }

    /// Returns the slot at a chain ordinal, if any.
    pub(crate) fn slot_at(&self, ordinal: u16) -> Option<&PropertySlot> {
        let mut index = ordinal;
        let mut pair = self.chain.as_deref();
        while let Some(current) = pair {
            if index < 2 {
                return Some(&current.slots[index as usize]);
            }
            index -= 2;
            pair = current.next.as_deref();
        }
        None
    }

    fn slot_at_mut(&mut self, ordinal: u16) -> Option<&mut PropertySlot> {
        let mut index = ordinal;
        let mut pair = self.chain.as_deref_mut();
        while let Some(current) = pair {
            if index < 2 {
                return Some(&mut current.slots[index as usize]);
            }
            index -= 2;
            pair = current.next.as_deref_mut();
        }
        None
    }

    /// Appends a slot at the tail of the chain, preserving insertion order.
    ///
    /// Only the trailing pair's second slot is ever reused; freed slots in
    /// the middle of the chain stay free so earlier ordinals remain stable.
    pub(crate) fn append_slot(&mut self, slot: PropertySlot) -> u16 {
        let mut ordinal: u16 = 0;
        let mut pair = &mut self.chain;
        loop {
            match pair {
                Some(current) => {
                    if current.next.is_some() {
                        ordinal += 2;
                        pair = &mut current.next;
                    } else if matches!(current.slots[1], PropertySlot::Free)
                        && !matches!(current.slots[0], PropertySlot::Free)
                    {
                        current.slots[1] = slot;
                        return ordinal + 1;
                    } else {
                        ordinal += 2;
                        current.next = Some(Box::new(PropertyPair {
                            slots: [slot, PropertySlot::Free],
                            next: None,
                        }));
                        return ordinal;
                    }
                }
                None => {
                    *pair = Some(Box::new(PropertyPair {
                        slots: [slot, PropertySlot::Free],
                        next: None,
                    }));
                    return ordinal;
                }
            }
        }
    }

    /// Finds an internal property's value.
    pub(crate) fn find_internal(&self, key: InternalKey) -> Option<&Value> {
        let mut pair = self.chain.as_deref();
        while let Some(current) = pair {
            for slot in &current.slots {
                if let PropertySlot::Internal { key: k, value } = slot {
                    if *k == key {
                        return Some(value);
                    }
                }
            }
            pair = current.next.as_deref();
        }
        None
    }

    fn find_internal_mut(&mut self, key: InternalKey) -> Option<&mut Value> {
        let mut pair = self.chain.as_deref_mut();
        while let Some(current) = pair {
            for slot in &mut current.slots {
                if let PropertySlot::Internal { key: k, value } = slot {
                    if *k == key {
                        return Some(value);
                    }
                }
            }
            pair = current.next.as_deref_mut();
        }
        None
    }

    /// Names of all named own properties in insertion order.
    pub(crate) fn chain_names(&self, only_enumerable: bool) -> Vec<StringId> {
        let mut names = Vec::new();
        let mut pair = self.chain.as_deref();
        while let Some(current) = pair {
            for slot in &current.slots {
                match slot {
                    PropertySlot::Data { name, attrs, .. } | PropertySlot::Accessor { name, attrs, .. } => {
                        if !only_enumerable || attrs.enumerable {
                            names.push(*name);
                        }
                    }
                    _ => {}
                }
            }
            pair = current.next.as_deref();
        }
        names
    }
}

/// Borrowed view of a resolved own property.
///
/// The carried value is a raw word copy: consume it immediately (copy it via
/// `Value::copy` before storing) and never free it.
#[derive(Debug)]
pub(crate) struct PropView {
    pub(crate) ordinal: u16,
    pub(crate) kind: PropViewKind,
}

#[derive(Debug)]
pub(crate) enum PropViewKind {
    Data {
        value: Value,
        attrs: PropAttrs,
    },
    Accessor {
        get: Option<HeapRef>,
        set: Option<HeapRef>,
        attrs: PropAttrs,
    },
}

impl PropView {
    pub(crate) fn attrs(&self) -> PropAttrs {
        match &self.kind {
            PropViewKind::Data { attrs, .. } | PropViewKind::Accessor { attrs, .. } => *attrs,
        }
    }

    fn of_slot(ordinal: u16, slot: &PropertySlot) -> Option<Self> {
        match slot {
            PropertySlot::Data { value, attrs, .. } => Some(Self {
                ordinal,
                kind: PropViewKind::Data {
                    value: value.word_copy(),
                    attrs: *attrs,
                },
            }),
            PropertySlot::Accessor { get, set, attrs, .. } => Some(Self {
                ordinal,
                kind: PropViewKind::Accessor {
                    get: *get,
                    set: *set,
                    attrs: *attrs,
                },
            }),
            _ => None,
        }
    }
}

/// Descriptor argument of [`define_own_property`]; absent fields were not
/// present in the source descriptor.
#[derive(Debug, Default)]
pub(crate) struct PropDescriptor {
    pub(crate) value: Option<Value>,
    pub(crate) get: Option<Option<HeapRef>>,
    pub(crate) set: Option<Option<HeapRef>>,
    pub(crate) writable: Option<bool>,
    pub(crate) enumerable: Option<bool>,
    pub(crate) configurable: Option<bool>,
}

impl PropDescriptor {
    pub(crate) fn is_data(&self) -> bool {
        self.value.is_some() || self.writable.is_some()
    }

    pub(crate) fn is_accessor(&self) -> bool {
        self.get.is_some() || self.set.is_some()
    }

    /// Plain data descriptor with all fields present.
    pub(crate) fn data(value: Value, attrs: PropAttrs) -> Self {
        Self {
            value: Some(value),
            writable: Some(attrs.writable),
            enumerable: Some(attrs.enumerable),
            configurable: Some(attrs.configurable),
            ..Self::default()
        }
    }

    /// Accessor descriptor with all fields present.
    pub(crate) fn accessor(get: Option<HeapRef>, set: Option<HeapRef>, attrs: PropAttrs) -> Self {
        Self {
            get: Some(get),
            set: Some(set),
            enumerable: Some(attrs.enumerable),
            configurable: Some(attrs.configurable),
            ..Self::default()
        }
    }

    /// Releases the owned value, if any.
    pub(crate) fn free(self, ctx: &mut Context<impl ResourceTracker>) {
        if let Some(value) = self.value {
            value.free(&mut ctx.heap);
        }
    }
}

/// Creates a general object.
///
/// The prototype gains a reference owned by the new object.
pub(crate) fn create_object(
    ctx: &mut Context<impl ResourceTracker>,
    prototype: Option<HeapRef>,
    extensible: bool,
    type_tag: ObjectType,
) -> JsResult<HeapRef> {
    if let Some(proto) = prototype {
        ctx.heap.inc_ref(proto);
    }
    ctx.alloc(HeapData::Object(Object::new(type_tag, prototype, extensible)))
}

/// `[[GetOwnProperty]]` with lazy materialisation (design section 4.B).
///
/// Order: LCache probe, chain walk, built-in instantiator, function
/// instantiator. Successful chain hits populate the LCache.
pub(crate) fn get_own_property(
    ctx: &mut Context<impl ResourceTracker>,
    obj: HeapRef,
    name: StringId,
) -> JsResult<Option<PropView>> {
    // 1. LCache probe; rows are hints and are re-validated against the chain.
    if let Some(ordinal) = ctx.lcache.lookup(obj, name) {
        let object = ctx.heap.object(obj);
        if let Some(slot) = object.slot_at(ordinal) {
            if slot.name() == Some(name) {
                return Ok(PropView::of_slot(ordinal, slot));
            }
        }
        ctx.lcache.invalidate(obj, name);
    }

    // 2. Chain walk.
    {
        let object = ctx.heap.object(obj);
        if let Some((ordinal, slot)) = object.find_named(name) {
            let view = PropView::of_slot(ordinal, slot);
            ctx.lcache.insert(obj, name, ordinal);
            return Ok(view);
        }
    }

    // 3. Built-in lazy instantiation.
    let (is_builtin, is_function) = {
        let object = ctx.heap.object(obj);
        (object.is_builtin, object.type_tag == ObjectType::Function)
    };
    if is_builtin {
        if let Some(ordinal) = builtins::try_to_instantiate_property(ctx, obj, name)? {
            let object = ctx.heap.object(obj);
            let slot = object.slot_at(ordinal).expect("freshly instantiated slot");
            let view = PropView::of_slot(ordinal, slot);
            ctx.lcache.insert(obj, name, ordinal);
            return Ok(view);
        }
        return Ok(None);
    }

    // 4. Ordinary-function lazy instantiation (`length`, `prototype`).
    if is_function {
        if let Some(ordinal) = function::try_lazy_instantiate_property(ctx, obj, name)? {
            let object = ctx.heap.object(obj);
            let slot = object.slot_at(ordinal).expect("freshly instantiated slot");
            let view = PropView::of_slot(ordinal, slot);
            ctx.lcache.insert(obj, name, ordinal);
            return Ok(view);
        }
    }

    Ok(None)
}

/// `[[Get]]` (ES5 8.12.3): walks the prototype chain, invoking getters.
pub(crate) fn get(ctx: &mut Context<impl ResourceTracker>, obj: HeapRef, name: StringId) -> JsResult<Value> {
    let mut current = obj;
    loop {
        if let Some(view) = get_own_property(ctx, current, name)? {
            return match view.kind {
                PropViewKind::Data { value, .. } => Ok(value.copy(&ctx.heap)),
                PropViewKind::Accessor { get: Some(getter), .. } => {
                    let this = Value::Ref(obj);
                    function::call(ctx, getter, &this, &[])
                }
                PropViewKind::Accessor { get: None, .. } => Ok(Value::Undefined),
            };
        }
        match ctx.heap.object(current).prototype {
            Some(proto) if !ctx.heap.object(current).type_tag.is_lexical_env() => current = proto,
            _ => return Ok(Value::Undefined),
        }
    }
}

/// `[[HasProperty]]` (ES5 8.12.6).
pub(crate) fn has_property(
    ctx: &mut Context<impl ResourceTracker>,
    obj: HeapRef,
    name: StringId,
) -> JsResult<bool> {
    let mut current = obj;
    loop {
        if get_own_property(ctx, current, name)?.is_some() {
            return Ok(true);
        }
        match ctx.heap.object(current).prototype {
            Some(proto) if !ctx.heap.object(current).type_tag.is_lexical_env() => current = proto,
            _ => return Ok(false),
        }
    }
}

/// `[[Put]]` (ES5 8.12.5). Consumes `value` on every path.
pub(crate) fn put(
    ctx: &mut Context<impl ResourceTracker>,
    obj: HeapRef,
    name: StringId,
    value: Value,
    is_throw: bool,
) -> JsResult<bool> {
    // Own property first.
    if let Some(view) = get_own_property(ctx, obj, name)? {
        match view.kind {
            PropViewKind::Data { attrs, .. } => {
                if !attrs.writable {
                    value.free(&mut ctx.heap);
                    return reject(ctx, is_throw, "property is not writable");
                }
                if ctx.heap.object(obj).type_tag == ObjectType::Array && name == Magic::Length.id() {
                    return set_array_length(ctx, obj, value, is_throw);
                }
                set_slot_value(ctx, obj, view.ordinal, value);
                ctx.lcache.invalidate(obj, name);
                return Ok(true);
            }
            PropViewKind::Accessor { set, .. } => {
                return call_setter(ctx, obj, set, value, is_throw);
            }
        }
    }

    // Inherited property.
    let mut proto = non_env_prototype(ctx, obj);
    while let Some(current) = proto {
        if let Some(view) = get_own_property(ctx, current, name)? {
            match view.kind {
                PropViewKind::Accessor { set, .. } => {
                    return call_setter(ctx, obj, set, value, is_throw);
                }
                PropViewKind::Data { attrs, .. } => {
                    if !attrs.writable {
                        value.free(&mut ctx.heap);
                        return reject(ctx, is_throw, "property is not writable");
                    }
                    break;
                }
            }
        }
        proto = non_env_prototype(ctx, current);
    }

    // Create an own data property.
    if !ctx.heap.object(obj).extensible {
        value.free(&mut ctx.heap);
        return reject(ctx, is_throw, "object is not extensible");
    }
    let array_index = array_index_of(ctx, obj, name);
    let ordinal = ctx.heap.object_mut(obj).append_slot(PropertySlot::Data {
        name,
        attrs: PropAttrs::ALL,
        value,
    });
    ctx.lcache.insert(obj, name, ordinal);
    if let Some(index) = array_index {
        grow_array_length(ctx, obj, index)?;
    }
    Ok(true)
}

/// `[[Delete]]` (ES5 8.12.7). Deleted slots become free chain cells.
pub(crate) fn delete(
    ctx: &mut Context<impl ResourceTracker>,
    obj: HeapRef,
    name: StringId,
    is_throw: bool,
) -> JsResult<bool> {
    let Some(view) = get_own_property(ctx, obj, name)? else {
        return Ok(true);
    };
    if !view.attrs().configurable {
        return reject(ctx, is_throw, "property is not configurable");
    }
    let object = ctx.heap.object_mut(obj);
    let slot = object.slot_at_mut(view.ordinal).expect("resolved slot exists");
    let old = std::mem::replace(slot, PropertySlot::Free);
    if let PropertySlot::Data { value, .. } = old {
        value.free(&mut ctx.heap);
    } else if let PropertySlot::Accessor { get, set, .. } = old {
        if let Some(get) = get {
            ctx.heap.dec_ref(get);
        }
        if let Some(set) = set {
            ctx.heap.dec_ref(set);
        }
    }
    ctx.lcache.invalidate(obj, name);
    Ok(true)
}

/// `[[DefineOwnProperty]]` (ES5 8.12.9), the attribute-override matrix.
///
/// Consumes the descriptor's owned value on every path.
pub(crate) fn define_own_property(
    ctx: &mut Context<impl ResourceTracker>,
    obj: HeapRef,
    name: StringId,
    desc: PropDescriptor,
    is_throw: bool,
) -> JsResult<bool> {
    let current = get_own_property(ctx, obj, name)?;
    let extensible = ctx.heap.object(obj).extensible;

    let Some(current) = current else {
        // 3. No current property: create from the descriptor.
        if !extensible {
            desc.free(ctx);
            return reject(ctx, is_throw, "object is not extensible");
        }
        let array_index = array_index_of(ctx, obj, name);
        let slot = if desc.is_accessor() {
            for accessor in [desc.get.flatten(), desc.set.flatten()].into_iter().flatten() {
                ctx.heap.inc_ref(accessor);
            }
            PropertySlot::Accessor {
                name,
                attrs: PropAttrs::new(
                    false,
                    desc.enumerable.unwrap_or(false),
                    desc.configurable.unwrap_or(false),
                ),
                get: desc.get.flatten(),
                set: desc.set.flatten(),
            }
        } else {
            PropertySlot::Data {
                name,
                attrs: PropAttrs::new(
                    desc.writable.unwrap_or(false),
                    desc.enumerable.unwrap_or(false),
                    desc.configurable.unwrap_or(false),
                ),
                value: desc.value.unwrap_or(Value::Undefined),
            }
        };
        let ordinal = ctx.heap.object_mut(obj).append_slot(slot);
        ctx.lcache.insert(obj, name, ordinal);
        if let Some(index) = array_index {
            grow_array_length(ctx, obj, index)?;
        }
        return Ok(true);
    };

    let attrs = current.attrs();
    let current_is_data = matches!(current.kind, PropViewKind::Data { .. });

    // 5-6. Absent or identical descriptors change nothing.
    if desc.value.is_none()
        && desc.get.is_none()
        && desc.set.is_none()
        && desc.writable.is_none()
        && desc.enumerable.is_none()
        && desc.configurable.is_none()
    {
        return Ok(true);
    }

    // 7. Non-configurable tie-breaks.
    if !attrs.configurable {
        if desc.configurable == Some(true) || desc.enumerable.is_some_and(|e| e != attrs.enumerable) {
            desc.free(ctx);
            return reject(ctx, is_throw, "property is not configurable");
        }
        // 9. Conversion between data and accessor is rejected.
        if (desc.is_data() && !current_is_data) || (desc.is_accessor() && current_is_data) {
            desc.free(ctx);
            return reject(ctx, is_throw, "property is not configurable");
        }
        // 10. Data on data: writability and value changes need writable.
        if current_is_data && desc.is_data() && !attrs.writable {
            if desc.writable == Some(true) {
                desc.free(ctx);
                return reject(ctx, is_throw, "property is not writable");
            }
            if let (Some(new), PropViewKind::Data { value, .. }) = (&desc.value, &current.kind) {
                if !same_value(&ctx.heap, &ctx.interns, new, value) {
                    desc.free(ctx);
                    return reject(ctx, is_throw, "property is not writable");
                }
            }
        }
        // 11. Accessor on accessor: both components must be unchanged.
        if let (PropViewKind::Accessor { get, set, .. }, true) = (&current.kind, desc.is_accessor()) {
            if desc.get.is_some_and(|g| g != *get) || desc.set.is_some_and(|s| s != *set) {
                desc.free(ctx);
                return reject(ctx, is_throw, "property is not configurable");
            }
        }
    }

    // 12. Apply: possibly converting between data and accessor in place.
    let new_attrs = PropAttrs::new(
        desc.writable.unwrap_or(if current_is_data { attrs.writable } else { false }),
        desc.enumerable.unwrap_or(attrs.enumerable),
        desc.configurable.unwrap_or(attrs.configurable),
    );
    for accessor in [desc.get.flatten(), desc.set.flatten()].into_iter().flatten() {
        if desc.is_accessor() {
            ctx.heap.inc_ref(accessor);
        }
    }
    let to_accessor = desc.is_accessor();
    let desc_get = desc.get;
    let desc_set = desc.set;
    let desc_value = desc.value;
    let object = ctx.heap.object_mut(obj);
    let slot = object.slot_at_mut(current.ordinal).expect("resolved slot exists");
    let old = std::mem::replace(slot, PropertySlot::Free);
    let new_slot = match old {
        PropertySlot::Data { name, value, .. } => {
            if to_accessor {
                value.free(&mut ctx.heap);
                PropertySlot::Accessor {
                    name,
                    attrs: PropAttrs::new(false, new_attrs.enumerable, new_attrs.configurable),
                    get: desc_get.flatten(),
                    set: desc_set.flatten(),
                }
            } else {
                let value = match desc_value {
                    Some(new) => {
                        value.free(&mut ctx.heap);
                        new
                    }
                    None => value,
                };
                PropertySlot::Data {
                    name,
                    attrs: new_attrs,
                    value,
                }
            }
        }
        PropertySlot::Accessor { name, get, set, .. } => {
            if desc_value.is_some() || desc.writable.is_some() {
                for accessor in [get, set].into_iter().flatten() {
                    ctx.heap.dec_ref(accessor);
                }
                PropertySlot::Data {
                    name,
                    attrs: new_attrs,
                    value: desc_value.unwrap_or(Value::Undefined),
                }
            } else {
                let new_get = match desc_get {
                    Some(new) => {
                        if let Some(old) = get {
                            ctx.heap.dec_ref(old);
                        }
                        new
                    }
                    None => get,
                };
                let new_set = match desc_set {
                    Some(new) => {
                        if let Some(old) = set {
                            ctx.heap.dec_ref(old);
                        }
                        new
                    }
                    None => set,
                };
                PropertySlot::Accessor {
                    name,
                    attrs: PropAttrs::new(false, new_attrs.enumerable, new_attrs.configurable),
                    get: new_get,
                    set: new_set,
                }
            }
        }
        _ => unreachable!("resolved property slot cannot be free"),
    };
    let object = ctx.heap.object_mut(obj);
    let slot = object.slot_at_mut(current.ordinal).expect("resolved slot exists");
    *slot = new_slot;
    ctx.lcache.invalidate(obj, name);
    Ok(true)
}

/// Own property names, lazy names included, insertion order preserved.
///
/// Lazily listable names are appended after materialised ones; a
/// materialised-and-deleted built-in name is re-listed only when a fresh
/// `get_own_property` confirms its presence.
pub(crate) fn own_property_names(
    ctx: &mut Context<impl ResourceTracker>,
    obj: HeapRef,
    only_enumerable: bool,
) -> JsResult<Vec<StringId>> {
    let mut names = ctx.heap.object(obj).chain_names(only_enumerable);
    let (is_builtin, is_function) = {
        let object = ctx.heap.object(obj);
        (object.is_builtin, object.type_tag == ObjectType::Function)
    };
    let mut lazy = Vec::new();
    if is_builtin {
        builtins::list_lazy_property_names(ctx, obj, only_enumerable, &mut lazy)?;
    } else if is_function {
        function::list_lazy_property_names(only_enumerable, &mut lazy);
    }
    for name in lazy {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    Ok(names)
}

/// Internal property read.
pub(crate) fn get_internal(
    ctx: &Context<impl ResourceTracker>,
    obj: HeapRef,
    key: InternalKey,
) -> Option<Value> {
    ctx.heap.object(obj).find_internal(key).map(Value::word_copy)
}

/// Internal property write; creates the slot on first use. Consumes `value`.
pub(crate) fn set_internal(ctx: &mut Context<impl ResourceTracker>, obj: HeapRef, key: InternalKey, value: Value) {
    let object = ctx.heap.object_mut(obj);
    if let Some(existing) = object.find_internal_mut(key) {
        let old = std::mem::replace(existing, value);
        old.free(&mut ctx.heap);
    } else {
        object.append_slot(PropertySlot::Internal { key, value });
    }
}

/// Replaces a data slot's value, releasing the old one. The caller must have
/// resolved `ordinal` to a data slot of `obj`.
pub(crate) fn set_slot_value(ctx: &mut Context<impl ResourceTracker>, obj: HeapRef, ordinal: u16, value: Value) {
    let object = ctx.heap.object_mut(obj);
    let slot = object.slot_at_mut(ordinal).expect("set_slot_value: slot missing");
    match slot {
        PropertySlot::Data { value: stored, .. } => {
            let old = std::mem::replace(stored, value);
            old.free(&mut ctx.heap);
        }
        _ => panic!("set_slot_value: not a data slot"),
    }
}

/// The prototype link, unless the object is an environment record.
fn non_env_prototype(ctx: &Context<impl ResourceTracker>, obj: HeapRef) -> Option<HeapRef> {
    let object = ctx.heap.object(obj);
    if object.type_tag.is_lexical_env() {
        None
    } else {
        object.prototype
    }
}

fn call_setter(
    ctx: &mut Context<impl ResourceTracker>,
    obj: HeapRef,
    setter: Option<HeapRef>,
    value: Value,
    is_throw: bool,
) -> JsResult<bool> {
    match setter {
        Some(setter) => {
            let this = Value::Ref(obj);
            let result = function::call(ctx, setter, &this, std::slice::from_ref(&value));
            value.free(&mut ctx.heap);
            result?.free(&mut ctx.heap);
            Ok(true)
        }
        None => {
            value.free(&mut ctx.heap);
            reject(ctx, is_throw, "property has no setter")
        }
    }
}

fn reject(ctx: &mut Context<impl ResourceTracker>, is_throw: bool, message: &str) -> JsResult<bool> {
    if is_throw {
        Err(builtins::error::type_error(ctx, message))
    } else {
        Ok(false)
    }
}

/// When `obj` is an array and `name` spells an array index, that index.
fn array_index_of(ctx: &mut Context<impl ResourceTracker>, obj: HeapRef, name: StringId) -> Option<u32> {
    if ctx.heap.object(obj).type_tag != ObjectType::Array {
        return None;
    }
    Interner::array_index_of(ctx.interns.get(name))
}

/// Reads an array's current `length` as u32.
pub(crate) fn array_length(ctx: &mut Context<impl ResourceTracker>, obj: HeapRef) -> JsResult<u32> {
    let view = get_own_property(ctx, obj, Magic::Length.id())?;
    match view {
        Some(PropView {
            kind: PropViewKind::Data { value, .. },
            ..
        }) => Ok(value.as_number(&ctx.heap).map_or(0, |x| x as u32)),
        _ => Ok(0),
    }
}

/// Auto-grows `length` after an index property landed at or past it.
fn grow_array_length(ctx: &mut Context<impl ResourceTracker>, obj: HeapRef, index: u32) -> JsResult<()> {
    let length = array_length(ctx, obj)?;
    if index >= length {
        let new_length = match Value::make_number(&mut ctx.heap, f64::from(index) + 1.0) {
            Ok(value) => value,
            Err(_) => return Err(builtins::error::range_error(ctx, "allocation failed")),
        };
        let view = get_own_property(ctx, obj, Magic::Length.id())?.expect("arrays always carry length");
        set_slot_value(ctx, obj, view.ordinal, new_length);
        ctx.lcache.invalidate(obj, Magic::Length.id());
    }
    Ok(())
}

/// `[[Put]]` on an array's `length`: validates and truncates (15.4.5.1).
fn set_array_length(
    ctx: &mut Context<impl ResourceTracker>,
    obj: HeapRef,
    value: Value,
    _is_throw: bool,
) -> JsResult<bool> {
    let requested = crate::convert::to_number(ctx, &value)?;
    value.free(&mut ctx.heap);
    let new_length = crate::value::to_uint32(requested);
    if f64::from(new_length) != requested {
        return Err(builtins::error::range_error(ctx, "invalid array length"));
    }
    // Delete own index properties at or past the new length.
    let names = ctx.heap.object(obj).chain_names(false);
    for name in names {
        if let Some(index) = Interner::array_index_of(ctx.interns.get(name)) {
            if index >= new_length {
                delete(ctx, obj, name, false)?;
            }
        }
    }
    let stored = match Value::make_number(&mut ctx.heap, f64::from(new_length)) {
        Ok(value) => value,
        Err(_) => return Err(builtins::error::range_error(ctx, "allocation failed")),
    };
    let view = get_own_property(ctx, obj, Magic::Length.id())?.expect("arrays always carry length");
    set_slot_value(ctx, obj, view.ordinal, stored);
    ctx.lcache.invalidate(obj, Magic::Length.id());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_preserves_insertion_order() {
        let mut object = Object::new(ObjectType::General, None, true);
        for (i, id) in (0..5).map(|i| (i, StringId::from_index(100 + i))).collect::<Vec<_>>() {
            let ordinal = object.append_slot(PropertySlot::Data {
                name: id,
                attrs: PropAttrs::ALL,
                value: Value::Int(i as i32),
            });
            assert_eq!(ordinal, i as u16);
        }
        let names = object.chain_names(false);
        assert_eq!(names.len(), 5);
        for (i, name) in names.iter().enumerate() {
            assert_eq!(*name, StringId::from_index(100 + i as u32));
        }
    }

    #[test]
    fn deleted_slots_keep_later_ordinals_stable() {
        let mut object = Object::new(ObjectType::General, None, true);
        let a = StringId::from_index(200);
        let b = StringId::from_index(201);
        let c = StringId::from_index(202);
        for name in [a, b, c] {
            object.append_slot(PropertySlot::Data {
                name,
                attrs: PropAttrs::ALL,
                value: Value::Undefined,
            });
        }
        let (b_ordinal, _) = object.find_named(b).unwrap();
        let (c_ordinal_before, _) = object.find_named(c).unwrap();
        let slot = object.slot_at_mut(b_ordinal).unwrap();
        *slot = PropertySlot::Free;
        let (c_ordinal_after, _) = object.find_named(c).unwrap();
        assert_eq!(c_ordinal_before, c_ordinal_after);
        assert!(object.find_named(b).is_none());
    }

    #[test]
    fn internal_properties_are_invisible_to_named_lookup() {
        let mut object = Object::new(ObjectType::General, None, true);
        object.append_slot(PropertySlot::Internal {
            key: InternalKey::PrimitiveValue,
            value: Value::Int(3),
        });
        assert!(object.chain_names(false).is_empty());
        assert!(matches!(object.find_internal(InternalKey::PrimitiveValue), Some(Value::Int(3))));
    }

    fn test_context() -> Context<crate::heap::NoLimitTracker> {
        Context::with_tracker_and_port(crate::heap::NoLimitTracker, Box::new(crate::port::PanicPort))
    }

    fn plain_object(ctx: &mut Context<crate::heap::NoLimitTracker>) -> HeapRef {
        create_object(ctx, None, true, ObjectType::General).unwrap()
    }

    #[test]
    fn get_own_property_after_put_returns_the_value_and_is_idempotent() {
        let mut ctx = test_context();
        let obj = plain_object(&mut ctx);
        let name = ctx.interns.intern("answer");
        put(&mut ctx, obj, name, Value::Int(42), false).unwrap();

        for _ in 0..2 {
            let view = get_own_property(&mut ctx, obj, name).unwrap().expect("present");
            match view.kind {
                PropViewKind::Data { value, attrs } => {
                    assert_eq!(value, Value::Int(42));
                    assert_eq!(attrs, PropAttrs::ALL);
                }
                PropViewKind::Accessor { .. } => panic!("expected a data property"),
            }
        }
    }

    #[test]
    fn lcache_hit_and_miss_return_identical_identities() {
        let mut ctx = test_context();
        let obj = plain_object(&mut ctx);
        let name = ctx.interns.intern("cached");
        put(&mut ctx, obj, name, Value::Int(1), false).unwrap();

        // First lookup misses and fills the cache; second hits.
        let miss = get_own_property(&mut ctx, obj, name).unwrap().expect("present");
        assert_eq!(ctx.lcache.lookup(obj, name), Some(miss.ordinal));
        let hit = get_own_property(&mut ctx, obj, name).unwrap().expect("present");
        assert_eq!(miss.ordinal, hit.ordinal);

        // Deletion invalidates the row; re-adding resolves to a fresh slot.
        delete(&mut ctx, obj, name, false).unwrap();
        assert_eq!(ctx.lcache.lookup(obj, name), None);
        put(&mut ctx, obj, name, Value::Int(2), false).unwrap();
        let fresh = get_own_property(&mut ctx, obj, name).unwrap().expect("present");
        match fresh.kind {
            PropViewKind::Data { value, .. } => assert_eq!(value, Value::Int(2)),
            PropViewKind::Accessor { .. } => panic!("expected a data property"),
        }
    }

    #[test]
    fn define_own_property_rejects_redefining_non_configurable() {
        let mut ctx = test_context();
        let obj = plain_object(&mut ctx);
        let name = ctx.interns.intern("fixed");
        let desc = PropDescriptor::data(Value::Int(1), PropAttrs::FIXED);
        assert!(define_own_property(&mut ctx, obj, name, desc, false).unwrap());

        // configurable: false -> true is rejected.
        let raise_configurable = PropDescriptor {
            configurable: Some(true),
            ..PropDescriptor::default()
        };
        assert!(!define_own_property(&mut ctx, obj, name, raise_configurable, false).unwrap());

        // Changing the value of a non-writable property is rejected...
        let new_value = PropDescriptor {
            value: Some(Value::Int(2)),
            ..PropDescriptor::default()
        };
        assert!(!define_own_property(&mut ctx, obj, name, new_value, false).unwrap());

        // ...but re-describing the same value is allowed.
        let same_value = PropDescriptor {
            value: Some(Value::Int(1)),
            ..PropDescriptor::default()
        };
        assert!(define_own_property(&mut ctx, obj, name, same_value, false).unwrap());

        // With the throw flag the rejection is a TypeError.
        let raise_configurable = PropDescriptor {
            configurable: Some(true),
            ..PropDescriptor::default()
        };
        assert!(define_own_property(&mut ctx, obj, name, raise_configurable, true).is_err());
    }

    #[test]
    fn define_own_property_converts_data_to_accessor_when_configurable() {
        let mut ctx = test_context();
        let obj = plain_object(&mut ctx);
        let name = ctx.interns.intern("mutating");
        let desc = PropDescriptor::data(Value::Int(1), PropAttrs::ALL);
        assert!(define_own_property(&mut ctx, obj, name, desc, false).unwrap());

        let accessor = PropDescriptor::accessor(None, None, PropAttrs::CONFIGURABLE);
        assert!(define_own_property(&mut ctx, obj, name, accessor, false).unwrap());
        let view = get_own_property(&mut ctx, obj, name).unwrap().expect("present");
        assert!(matches!(view.kind, PropViewKind::Accessor { get: None, set: None, .. }));

        // And back to data.
        let back = PropDescriptor {
            value: Some(Value::Int(9)),
            writable: Some(true),
            ..PropDescriptor::default()
        };
        assert!(define_own_property(&mut ctx, obj, name, back, false).unwrap());
        let view = get_own_property(&mut ctx, obj, name).unwrap().expect("present");
        assert!(matches!(view.kind, PropViewKind::Data { value: Value::Int(9), .. }));
    }

    #[test]
    fn non_extensible_objects_reject_new_properties() {
        let mut ctx = test_context();
        let obj = create_object(&mut ctx, None, false, ObjectType::General).unwrap();
        let name = ctx.interns.intern("nope");
        assert!(!put(&mut ctx, obj, name, Value::Int(1), false).unwrap());
        assert!(put(&mut ctx, obj, name, Value::Int(1), true).is_err());
    }

    #[test]
    fn function_length_and_prototype_materialise_lazily() {
        use crate::bytecode::{CompiledCode, Literal, flags};

        let mut ctx = test_context();
        let scope = ctx.global_environment().unwrap();
        let param = ctx.interns.intern("p");
        let code = ctx.code.insert(CompiledCode {
            flags: flags::IS_FUNCTION,
            argument_end: 2,
            register_end: 0,
            stack_limit: 1,
            literals: vec![Literal::Ident(param), Literal::Ident(param)],
            code: vec![],
        });
        let func = function::create_function_object(&mut ctx, scope, code).unwrap();
        ctx.code.code_deref(code);

        // Neither property exists on the chain until observed.
        assert!(ctx.heap.object(func).find_named(Magic::Length.id()).is_none());
        assert!(ctx.heap.object(func).find_named(Magic::Prototype.id()).is_none());

        let length = get_own_property(&mut ctx, func, Magic::Length.id()).unwrap().expect("lazy length");
        let attrs = length.attrs();
        assert!(!attrs.writable && !attrs.enumerable && !attrs.configurable);
        match length.kind {
            PropViewKind::Data { value, .. } => assert_eq!(value, Value::Int(2)),
            PropViewKind::Accessor { .. } => panic!("length is a data property"),
        }

        let prototype = get_own_property(&mut ctx, func, Magic::Prototype.id()).unwrap().expect("lazy prototype");
        let attrs = prototype.attrs();
        assert!(attrs.writable && !attrs.enumerable && !attrs.configurable);
        let PropViewKind::Data { value: Value::Ref(proto), .. } = prototype.kind else {
            panic!("prototype is a data property");
        };
        // prototype.constructor points back at the function.
        let constructor = get(&mut ctx, proto, Magic::Constructor.id()).unwrap();
        assert_eq!(constructor, Value::Ref(func));
        constructor.free(&mut ctx.heap);
    }

    #[test]
    fn deleted_builtin_properties_are_not_resurrected() {
        let mut ctx = test_context();
        let object_ctor = builtins::get_builtin(&mut ctx, BuiltinId::ObjectConstructor).unwrap();

        // First observation materialises the routine.
        let keys = get_own_property(&mut ctx, object_ctor, Magic::Keys.id()).unwrap();
        assert!(keys.is_some());

        // Delete it (it is configurable), then look it up again: the
        // instantiated bit must keep it gone.
        assert!(delete(&mut ctx, object_ctor, Magic::Keys.id(), false).unwrap());
        let keys = get_own_property(&mut ctx, object_ctor, Magic::Keys.id()).unwrap();
        assert!(keys.is_none());

        // And the lazy listing no longer mentions it either.
        let names = own_property_names(&mut ctx, object_ctor, false).unwrap();
        assert!(!names.contains(&Magic::Keys.id()));
        assert!(names.contains(&Magic::GetPrototypeOf.id()));
    }

    #[test]
    fn array_length_autogrows_past_new_indices() {
        let mut ctx = test_context();
        let array = builtins::array::create_array(&mut ctx, 0).unwrap();
        let index_name = ctx.interns.intern_index(5);
        let value = Value::make_number(&mut ctx.heap, 10.5).unwrap();
        put(&mut ctx, array, index_name, value, false).unwrap();
        assert_eq!(array_length(&mut ctx, array).unwrap(), 6);

        // Shrinking the length deletes trailing elements.
        put(&mut ctx, array, Magic::Length.id(), Value::Int(2), false).unwrap();
        assert_eq!(array_length(&mut ctx, array).unwrap(), 2);
        assert!(get_own_property(&mut ctx, array, index_name).unwrap().is_none());
    }
}
