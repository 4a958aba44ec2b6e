//! Reference-counted arena backing all heap-allocated runtime values.
//!
//! Every boxed number, string and object lives in one arena owned by the
//! engine context and is addressed by a compressed pointer: a 1-based slot
//! index whose raw encoding `0` is reserved for null. Slots freed by
//! `dec_ref` go on a free list and are reused by later allocations.
//!
//! Reference counts are the fast path for locally scoped values; the
//! mark-and-sweep collector in [`Heap::collect_garbage`] is the authority on
//! reachability and is what reclaims cycles such as
//! `F.prototype.constructor === F`. Collection runs only at safe points
//! chosen by the context, never from arbitrary allocation sites.

use std::{cell::Cell, collections::BTreeMap};

use smallvec::SmallVec;

use crate::{bytecode::CodeId, object::Object, value::Value};

/// Compressed pointer to a live heap slot.
///
/// The raw form is `slot index + 1`; raw `0` is the reserved null encoding
/// and never denotes a live object. See [`HeapRef::to_compressed`] /
/// [`HeapRef::from_compressed`] for the boundary with storage formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct HeapRef(u32);

impl HeapRef {
    /// Slot index into the arena.
    #[inline]
    fn index(self) -> usize {
        (self.0 - 1) as usize
    }

    /// Encodes an optional reference as a raw compressed word (null becomes 0).
    #[inline]
    #[must_use]
    pub(crate) fn to_compressed(value: Option<Self>) -> u32 {
        value.map_or(0, |r| r.0)
    }

    /// Decodes a raw compressed word; 0 decodes to `None`.
    #[inline]
    #[must_use]
    pub(crate) fn from_compressed(raw: u32) -> Option<Self> {
        if raw == 0 { None } else { Some(Self(raw)) }
    }

    /// Raw word for hashing (LCache keys).
    #[inline]
    pub(crate) fn raw(self) -> u32 {
        self.0
    }
}

/// Error returned when the resource tracker rejects an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceError;

/// Strategy for bounding heap growth.
///
/// The default [`NoLimitTracker`] compiles every check away. A
/// [`LimitedTracker`] enforces an object budget and asks for a collection
/// when the budget is near; this is the "heap-limit callback" safe point.
pub trait ResourceTracker {
    /// Called before each allocation; returning an error rejects it.
    fn on_allocate(&mut self) -> Result<(), ResourceError> {
        Ok(())
    }

    /// Called when a slot is freed.
    fn on_free(&mut self) {}

    /// True when the tracker wants a garbage collection at the next safe point.
    fn wants_collection(&self) -> bool {
        false
    }
}

/// Tracker imposing no limits; all checks are no-ops.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLimitTracker;

impl ResourceTracker for NoLimitTracker {}

/// Tracker enforcing a live-object budget.
#[derive(Debug, Clone)]
pub struct LimitedTracker {
    max_objects: usize,
    live: usize,
}

impl LimitedTracker {
    #[must_use]
    pub fn new(max_objects: usize) -> Self {
        Self { max_objects, live: 0 }
    }
}

impl ResourceTracker for LimitedTracker {
    fn on_allocate(&mut self) -> Result<(), ResourceError> {
        if self.live >= self.max_objects {
            return Err(ResourceError);
        }
        self.live += 1;
        Ok(())
    }

    fn on_free(&mut self) {
        self.live = self.live.saturating_sub(1);
    }

    fn wants_collection(&self) -> bool {
        // Ask for a cycle collection once most of the budget is in use.
        self.live >= self.max_objects - self.max_objects / 8
    }
}

/// Payload of one heap slot.
#[derive(Debug)]
pub(crate) enum HeapData {
    /// A boxed double; numbers outside the small-integer range live here.
    Number(f64),
    /// A computed (non-interned) string.
    Str(String),
    /// An ECMA object, including lexical environments.
    Object(Object),
    /// Engine-private value list (bound-function argument storage).
    List(Vec<Value>),
}

impl HeapData {
    /// Static variant name for heap statistics.
    fn variant_name(&self) -> &'static str {
        match self {
            Self::Number(_) => "Number",
            Self::Str(_) => "Str",
            Self::Object(_) => "Object",
            Self::List(_) => "List",
        }
    }

    /// Forgets owned values so the `ref-count-panic` drop guard does not fire
    /// while the heap itself tears a slot down.
    #[cfg(feature = "ref-count-panic")]
    fn disarm(&mut self) {
        match self {
            Self::Number(_) | Self::Str(_) => {}
            Self::Object(object) => object.disarm(),
            Self::List(values) => {
                for value in values.drain(..) {
                    std::mem::forget(value);
                }
            }
        }
    }

    /// Appends every heap reference this payload owns.
    fn collect_refs(&self, out: &mut SmallVec<[HeapRef; 8]>) {
        match self {
            Self::Number(_) | Self::Str(_) => {}
            Self::Object(object) => object.collect_refs(out),
            Self::List(values) => {
                for value in values {
                    if let Value::Ref(r) = value {
                        out.push(*r);
                    }
                }
            }
        }
    }
}

/// One arena slot: refcount, GC visited flag, payload.
///
/// The visited flag's meaning depends on the heap's current polarity; its
/// absolute value is only compared against [`Heap::visited_polarity`].
#[derive(Debug)]
struct HeapCell {
    refcount: Cell<u32>,
    visited: Cell<bool>,
    data: HeapData,
}

/// Snapshot of heap occupancy, used by tests and embedder diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapStats {
    /// Number of live heap slots.
    pub live_objects: usize,
    /// Number of recycled slots awaiting reuse.
    pub free_slots: usize,
    /// Total arena capacity (live + free).
    pub total_slots: usize,
    /// Live objects broken down by payload variant name.
    pub objects_by_type: BTreeMap<&'static str, usize>,
}

/// The arena. Generic over the resource tracking strategy.
#[derive(Debug)]
pub(crate) struct Heap<T: ResourceTracker> {
    cells: Vec<Option<HeapCell>>,
    /// Freed slots available for reuse. Populated by `dec_ref` and the
    /// sweep phase, consumed by `alloc`.
    free_list: Vec<HeapRef>,
    tracker: T,
    /// Current polarity of the "visited during the last collection" flag.
    visited_polarity: bool,
    /// Compiled-code blobs owned by objects freed since the last flush.
    /// The context drains these into `CodeTable::code_deref` at safe points;
    /// the heap itself has no access to the code table.
    freed_code: Vec<CodeId>,
}

impl<T: ResourceTracker> Heap<T> {
    pub(crate) fn new(tracker: T) -> Self {
        Self {
            cells: Vec::with_capacity(64),
            free_list: Vec::new(),
            tracker,
            visited_polarity: false,
            freed_code: Vec::new(),
        }
    }

    /// Records the code blob of a dying function object.
    fn note_freed_cell(&mut self, data: &HeapData) {
        if let HeapData::Object(object) = data {
            if let Some(code) = object.function_code() {
                self.freed_code.push(code);
            }
        }
    }

    /// Drains the blobs owned by objects freed since the last call.
    pub(crate) fn take_freed_code(&mut self) -> Vec<CodeId> {
        std::mem::take(&mut self.freed_code)
    }

    /// Allocates a new slot with refcount 1.
    ///
    /// Returns `Err(ResourceError)` when the tracker rejects the allocation;
    /// the context decides whether that becomes a collection-and-retry or a
    /// fatal out-of-memory.
    pub(crate) fn alloc(&mut self, data: HeapData) -> Result<HeapRef, ResourceError> {
        self.tracker.on_allocate()?;
        let cell = HeapCell {
            refcount: Cell::new(1),
            visited: Cell::new(!self.visited_polarity),
            data,
        };
        let r = if let Some(r) = self.free_list.pop() {
            self.cells[r.index()] = Some(cell);
            r
        } else {
            self.cells.push(Some(cell));
            HeapRef(u32::try_from(self.cells.len()).expect("heap exceeds u32 slots"))
        };
        Ok(r)
    }

    /// Increments the reference count of a live slot.
    ///
    /// Interior mutability keeps this `&self`, which avoids borrow conflicts
    /// during prototype-chain walks.
    ///
    /// # Panics
    /// Panics when the slot is missing, already freed, or the count would
    /// overflow (the reference-count-limit fatal condition).
    pub(crate) fn inc_ref(&self, r: HeapRef) {
        let cell = self
            .cells
            .get(r.index())
            .expect("Heap::inc_ref: slot missing")
            .as_ref()
            .expect("Heap::inc_ref: object already freed");
        let count = cell.refcount.get();
        assert!(count < u32::MAX, "reference count limit reached");
        cell.refcount.set(count + 1);
    }

    /// Decrements the reference count, freeing the slot (and releasing its
    /// children) once it reaches zero. Child release is iterative to keep
    /// deep object graphs off the Rust call stack.
    ///
    /// # Panics
    /// Panics when the slot is missing or already freed.
    pub(crate) fn dec_ref(&mut self, r: HeapRef) {
        let mut pending: SmallVec<[HeapRef; 8]> = SmallVec::new();
        pending.push(r);
        while let Some(r) = pending.pop() {
            let slot = self.cells.get_mut(r.index()).expect("Heap::dec_ref: slot missing");
            let cell = slot.as_mut().expect("Heap::dec_ref: object already freed");
            let count = cell.refcount.get();
            if count > 1 {
                cell.refcount.set(count - 1);
                continue;
            }
            let cell = slot.take().expect("Heap::dec_ref: object already freed");
            cell.data.collect_refs(&mut pending);
            self.note_freed_cell(&cell.data);
            #[cfg(feature = "ref-count-panic")]
            {
                let mut cell = cell;
                cell.data.disarm();
            }
            self.free_list.push(r);
            self.tracker.on_free();
        }
    }

    /// Current reference count of a live slot, or 0 when freed.
    pub(crate) fn refcount(&self, r: HeapRef) -> u32 {
        self.cells
            .get(r.index())
            .and_then(Option::as_ref)
            .map_or(0, |cell| cell.refcount.get())
    }

    /// Returns the payload of a live slot.
    ///
    /// # Panics
    /// Panics when the slot is missing or already freed.
    #[must_use]
    pub(crate) fn get(&self, r: HeapRef) -> &HeapData {
        self.cells
            .get(r.index())
            .expect("Heap::get: slot missing")
            .as_ref()
            .map(|cell| &cell.data)
            .expect("Heap::get: object already freed")
    }

    /// Mutable access to the payload of a live slot.
    pub(crate) fn get_mut(&mut self, r: HeapRef) -> &mut HeapData {
        self.cells
            .get_mut(r.index())
            .expect("Heap::get_mut: slot missing")
            .as_mut()
            .map(|cell| &mut cell.data)
            .expect("Heap::get_mut: object already freed")
    }

    /// Returns the payload if the slot is still live.
    pub(crate) fn get_if_live(&self, r: HeapRef) -> Option<&HeapData> {
        self.cells.get(r.index())?.as_ref().map(|cell| &cell.data)
    }

    /// Object accessor; panics when the slot does not hold an object.
    #[must_use]
    pub(crate) fn object(&self, r: HeapRef) -> &Object {
        match self.get(r) {
            HeapData::Object(object) => object,
            _ => panic!("Heap::object: slot does not hold an object"),
        }
    }

    /// Mutable object accessor; panics when the slot does not hold an object.
    pub(crate) fn object_mut(&mut self, r: HeapRef) -> &mut Object {
        match self.get_mut(r) {
            HeapData::Object(object) => object,
            _ => panic!("Heap::object_mut: slot does not hold an object"),
        }
    }

    /// True when the slot is live and holds an object.
    pub(crate) fn is_object(&self, r: HeapRef) -> bool {
        matches!(self.get_if_live(r), Some(HeapData::Object(_)))
    }

    pub(crate) fn tracker(&self) -> &T {
        &self.tracker
    }

    /// Mark-and-sweep collection over the given roots.
    ///
    /// Marking flips the visited polarity for the new session, walks the
    /// reference graph from the roots, then sweeps every unvisited slot in
    /// one pass. Swept slots are dropped without touching the reference
    /// counts of their children (everything unreachable dies together, which
    /// is how reference cycles are reclaimed).
    pub(crate) fn collect_garbage(&mut self, roots: &[HeapRef]) {
        self.visited_polarity = !self.visited_polarity;
        let polarity = self.visited_polarity;

        let mut worklist: Vec<HeapRef> = roots.to_vec();
        let mut child_refs: SmallVec<[HeapRef; 8]> = SmallVec::new();
        while let Some(r) = worklist.pop() {
            let Some(cell) = self.cells.get(r.index()).and_then(Option::as_ref) else {
                continue;
            };
            if cell.visited.get() == polarity {
                continue;
            }
            cell.visited.set(polarity);
            child_refs.clear();
            cell.data.collect_refs(&mut child_refs);
            worklist.extend_from_slice(&child_refs);
        }

        for index in 0..self.cells.len() {
            let swept = self.cells[index]
                .as_ref()
                .is_some_and(|cell| cell.visited.get() != polarity);
            if swept {
                let cell = self.cells[index].take();
                if let Some(cell) = &cell {
                    self.note_freed_cell(&cell.data);
                }
                #[cfg(feature = "ref-count-panic")]
                if let Some(mut cell) = cell {
                    cell.data.disarm();
                }
                #[cfg(not(feature = "ref-count-panic"))]
                drop(cell);
                self.free_list.push(HeapRef(index as u32 + 1));
                self.tracker.on_free();
            }
        }
    }

    /// True when the tracker asks for a collection.
    pub(crate) fn wants_collection(&self) -> bool {
        self.tracker.wants_collection()
    }

    /// Occupancy snapshot.
    pub(crate) fn stats(&self) -> HeapStats {
        let mut live_objects = 0;
        let mut objects_by_type: BTreeMap<&'static str, usize> = BTreeMap::new();
        for cell in self.cells.iter().flatten() {
            live_objects += 1;
            *objects_by_type.entry(cell.data.variant_name()).or_insert(0) += 1;
        }
        HeapStats {
            live_objects,
            free_slots: self.free_list.len(),
            total_slots: self.cells.len(),
            objects_by_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heap() -> Heap<NoLimitTracker> {
        Heap::new(NoLimitTracker)
    }

    #[test]
    fn compressed_pointer_round_trip() {
        let mut heap = heap();
        let r = heap.alloc(HeapData::Number(1.5)).unwrap();
        assert_eq!(HeapRef::from_compressed(HeapRef::to_compressed(Some(r))), Some(r));
        assert_eq!(HeapRef::to_compressed(None), 0);
        assert_eq!(HeapRef::from_compressed(0), None);
    }

    #[test]
    fn slots_are_one_based_so_zero_is_never_live() {
        let mut heap = heap();
        let first = heap.alloc(HeapData::Number(0.0)).unwrap();
        assert_eq!(first.raw(), 1);
    }

    #[test]
    fn dec_ref_to_zero_recycles_the_slot() {
        let mut heap = heap();
        let a = heap.alloc(HeapData::Str("x".to_owned())).unwrap();
        heap.dec_ref(a);
        let b = heap.alloc(HeapData::Str("y".to_owned())).unwrap();
        assert_eq!(a.raw(), b.raw());
        assert_eq!(heap.stats().live_objects, 1);
    }

    #[test]
    fn inc_then_dec_is_a_refcount_no_op() {
        let mut heap = heap();
        let r = heap.alloc(HeapData::Number(2.0)).unwrap();
        let before = heap.refcount(r);
        heap.inc_ref(r);
        heap.dec_ref(r);
        assert_eq!(heap.refcount(r), before);
    }

    #[test]
    fn list_release_cascades_to_children() {
        let mut heap = heap();
        let child = heap.alloc(HeapData::Number(7.0)).unwrap();
        let list = heap.alloc(HeapData::List(vec![Value::Ref(child)])).unwrap();
        assert_eq!(heap.refcount(child), 1);
        heap.dec_ref(list);
        assert_eq!(heap.refcount(child), 0);
    }

    #[test]
    fn garbage_collection_reclaims_unrooted_cycles() {
        let mut heap = heap();
        let a = heap.alloc(HeapData::List(Vec::new())).unwrap();
        let b = heap.alloc(HeapData::List(vec![Value::Ref(a)])).unwrap();
        heap.inc_ref(a);
        match heap.get_mut(a) {
            HeapData::List(items) => items.push(Value::Ref(b)),
            _ => unreachable!(),
        }
        heap.inc_ref(b);
        // Drop the external references; the cycle keeps both counts at 1.
        heap.dec_ref(a);
        heap.dec_ref(b);
        assert_eq!(heap.stats().live_objects, 2);
        heap.collect_garbage(&[]);
        assert_eq!(heap.stats().live_objects, 0);
    }

    #[test]
    fn garbage_collection_keeps_rooted_graphs() {
        let mut heap = heap();
        let child = heap.alloc(HeapData::Number(3.0)).unwrap();
        let root = heap.alloc(HeapData::List(vec![Value::Ref(child)])).unwrap();
        heap.collect_garbage(&[root]);
        assert_eq!(heap.stats().live_objects, 2);
        // A second collection flips polarity and must still retain the graph.
        heap.collect_garbage(&[root]);
        assert_eq!(heap.stats().live_objects, 2);
    }

    #[test]
    fn limited_tracker_rejects_allocations_over_budget() {
        let mut heap = Heap::new(LimitedTracker::new(2));
        heap.alloc(HeapData::Number(1.0)).unwrap();
        heap.alloc(HeapData::Number(2.0)).unwrap();
        assert_eq!(heap.alloc(HeapData::Number(3.0)), Err(ResourceError));
    }
}
