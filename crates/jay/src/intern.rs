//! String interning for property names, identifiers and string literals.
//!
//! Every property name the engine touches is interned once and referred to by
//! a compact [`StringId`]. The well-known names of the standard library (the
//! "magic strings") occupy a fixed prefix of the id space, so translating a
//! name to its magic id is a bounds check rather than a table lookup.
//!
//! StringIds are laid out as follows:
//! * `0 .. Magic::COUNT` - the predefined magic strings, in `Magic` order
//! * `Magic::COUNT ..` - strings interned at parse time or runtime

use ahash::AHashMap;
use strum::{EnumCount, FromRepr, IntoStaticStr};

/// Index into the interner's storage.
///
/// Uses `u32` to keep `Value` small. Ids below [`Magic::COUNT`] denote magic
/// strings and can be translated back with [`Interner::as_magic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct StringId(u32);

impl StringId {
    /// Reconstructs a StringId from a bytecode operand.
    ///
    /// The caller is responsible for ensuring the index is valid for the
    /// interner the bytecode was compiled against.
    #[inline]
    #[must_use]
    pub(crate) const fn from_index(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw index value.
    #[inline]
    #[must_use]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Property and identifier names known at compile time.
///
/// The discriminant doubles as the string's `StringId`, so the interner seeds
/// its table with these in declaration order. Variants serialize to their
/// ECMA-visible spelling (camelCase unless overridden).
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, IntoStaticStr, EnumCount)]
#[strum(serialize_all = "camelCase")]
pub(crate) enum Magic {
    #[strum(serialize = "")]
    Empty,
    Length,
    Prototype,
    Constructor,
    Caller,
    Arguments,
    Eval,
    Name,
    Message,
    Callee,

    // Global object value properties and constructors
    #[strum(serialize = "NaN")]
    NanName,
    #[strum(serialize = "Infinity")]
    InfinityName,
    Undefined,
    #[strum(serialize = "Object")]
    ObjectName,
    #[strum(serialize = "Function")]
    FunctionName,
    #[strum(serialize = "Array")]
    ArrayName,
    #[strum(serialize = "String")]
    StringName,
    #[strum(serialize = "Boolean")]
    BooleanName,
    #[strum(serialize = "Number")]
    NumberName,
    #[strum(serialize = "Math")]
    MathName,
    #[strum(serialize = "Error")]
    ErrorName,
    #[strum(serialize = "TypeError")]
    TypeErrorName,
    #[strum(serialize = "ReferenceError")]
    ReferenceErrorName,
    #[strum(serialize = "SyntaxError")]
    SyntaxErrorName,
    #[strum(serialize = "RangeError")]
    RangeErrorName,
    #[strum(serialize = "EvalError")]
    EvalErrorName,
    #[strum(serialize = "URIError")]
    UriErrorName,

    // Global routines
    IsNaN,
    IsFinite,
    ParseInt,
    ParseFloat,

    // Object / Object.prototype
    Keys,
    GetPrototypeOf,
    DefineProperty,
    GetOwnPropertyDescriptor,
    ToString,
    ValueOf,
    HasOwnProperty,
    IsPrototypeOf,

    // Property descriptor fields accepted by defineProperty
    Value,
    Get,
    Set,
    Writable,
    Enumerable,
    Configurable,

    // Function.prototype
    Call,
    Apply,
    Bind,

    // Array / Array.prototype
    IsArray,
    Push,
    Pop,
    Join,
    IndexOf,
    Concat,

    // String / String.prototype
    FromCharCode,
    CharAt,
    CharCodeAt,
    Substring,
    Slice,

    // Math value properties (ECMA-262 v5, 15.8.1)
    #[strum(serialize = "E")]
    MathE,
    #[strum(serialize = "LN10")]
    Ln10,
    #[strum(serialize = "LN2")]
    Ln2,
    #[strum(serialize = "LOG2E")]
    Log2E,
    #[strum(serialize = "LOG10E")]
    Log10E,
    #[strum(serialize = "PI")]
    Pi,
    #[strum(serialize = "SQRT1_2")]
    Sqrt1_2,
    #[strum(serialize = "SQRT2")]
    Sqrt2,

    // Math routines
    Abs,
    Floor,
    Ceil,
    Round,
    Sqrt,
    Pow,
    Min,
    Max,
    Random,

    // Number constructor value properties
    #[strum(serialize = "MAX_VALUE")]
    MaxValue,
    #[strum(serialize = "MIN_VALUE")]
    MinValue,
    #[strum(serialize = "POSITIVE_INFINITY")]
    PositiveInfinity,
    #[strum(serialize = "NEGATIVE_INFINITY")]
    NegativeInfinity,

    // RegExp literal backing properties
    Source,
    Flags,
}

impl Magic {
    /// Number of magic strings; also the first dynamically interned id.
    pub(crate) const COUNT: u32 = <Self as EnumCount>::COUNT as u32;

    /// Returns the interned id of this magic string.
    #[inline]
    pub(crate) fn id(self) -> StringId {
        StringId(self as u32)
    }

    /// Returns the ECMA-visible spelling.
    pub(crate) fn as_str(self) -> &'static str {
        self.into()
    }
}

/// Interner mapping strings to compact ids and back.
///
/// The first [`Magic::COUNT`] entries are always the magic strings; dynamic
/// entries are appended behind them. Ids are stable for the lifetime of the
/// engine context, which is what makes them usable inside compiled-code
/// literal pools and snapshots.
#[derive(Debug)]
pub(crate) struct Interner {
    strings: Vec<Box<str>>,
    ids: AHashMap<Box<str>, StringId>,
}

impl Interner {
    /// Creates an interner pre-seeded with every magic string.
    pub(crate) fn new() -> Self {
        let mut interner = Self {
            strings: Vec::with_capacity(Magic::COUNT as usize + 32),
            ids: AHashMap::with_capacity(Magic::COUNT as usize + 32),
        };
        for raw in 0..Magic::COUNT {
            let magic = Magic::from_repr(raw as u16).expect("Magic discriminants are contiguous");
            let id = interner.intern(magic.as_str());
            debug_assert_eq!(id, magic.id(), "magic string seeded out of order");
        }
        interner
    }

    /// Interns a string, returning the existing id when already present.
    pub(crate) fn intern(&mut self, s: &str) -> StringId {
        if let Some(&id) = self.ids.get(s) {
            return id;
        }
        let id = StringId(u32::try_from(self.strings.len()).expect("interner exceeds u32 ids"));
        let boxed: Box<str> = s.into();
        self.strings.push(boxed.clone());
        self.ids.insert(boxed, id);
        id
    }

    /// Interns the decimal spelling of an array index.
    pub(crate) fn intern_index(&mut self, index: u32) -> StringId {
        self.intern(&index.to_string())
    }

    /// Returns the string for an id.
    ///
    /// # Panics
    /// Panics if the id was not produced by this interner.
    #[must_use]
    pub(crate) fn get(&self, id: StringId) -> &str {
        self.strings.get(id.index()).expect("Interner::get: unknown StringId")
    }

    /// Translates an id back to its magic string, if it is one.
    #[inline]
    pub(crate) fn as_magic(id: StringId) -> Option<Magic> {
        if id.0 < Magic::COUNT {
            Magic::from_repr(id.0 as u16)
        } else {
            None
        }
    }

    /// Parses a string as an ECMA array index (canonical decimal, < 2^32-1).
    pub(crate) fn array_index_of(s: &str) -> Option<u32> {
        if s.is_empty() || s.len() > 10 {
            return None;
        }
        if s.len() > 1 && s.starts_with('0') {
            return None;
        }
        let mut value: u64 = 0;
        for b in s.bytes() {
            if !b.is_ascii_digit() {
                return None;
            }
            value = value * 10 + u64::from(b - b'0');
        }
        // 2^32 - 1 itself is not a valid array index
        if value < u64::from(u32::MAX) {
            Some(value as u32)
        } else {
            None
        }
    }

    /// Number of interned strings, magic prefix included.
    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.strings.len()
    }

    /// Returns all interned strings in id order, for snapshot serialization.
    pub(crate) fn all_strings(&self) -> impl Iterator<Item = &str> {
        self.strings.iter().map(AsRef::as_ref)
    }
}

impl serde::Serialize for Interner {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // The magic prefix is deterministic, so only the dynamic tail is stored.
        let tail: Vec<&str> = self.strings[Magic::COUNT as usize..].iter().map(AsRef::as_ref).collect();
        tail.serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for Interner {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tail = Vec::<String>::deserialize(deserializer)?;
        let mut interner = Self::new();
        for s in &tail {
            interner.intern(s);
        }
        Ok(interner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_ids_round_trip() {
        let interner = Interner::new();
        assert_eq!(interner.get(Magic::Length.id()), "length");
        assert_eq!(interner.get(Magic::Prototype.id()), "prototype");
        assert_eq!(interner.get(Magic::NanName.id()), "NaN");
        assert_eq!(interner.get(Magic::Sqrt1_2.id()), "SQRT1_2");
        assert_eq!(Interner::as_magic(Magic::Eval.id()), Some(Magic::Eval));
    }

    #[test]
    fn dynamic_interning_dedupes() {
        let mut interner = Interner::new();
        let a = interner.intern("userName");
        let b = interner.intern("userName");
        assert_eq!(a, b);
        assert!(a.index() >= Magic::COUNT as usize);
        assert_eq!(interner.get(a), "userName");
    }

    #[test]
    fn magic_names_resolve_to_magic_ids() {
        let mut interner = Interner::new();
        assert_eq!(interner.intern("length"), Magic::Length.id());
        assert_eq!(interner.intern("eval"), Magic::Eval.id());
        assert_eq!(interner.intern("arguments"), Magic::Arguments.id());
    }

    #[test]
    fn index_interning_matches_decimal_spelling() {
        let mut interner = Interner::new();
        let id = interner_index(&mut interner, 0);
        assert_eq!(interner.get(id), "0");
        let id = interner_index(&mut interner, 5);
        assert_eq!(interner.get(id), "5");
        let id = interner_index(&mut interner, 4_294_967_294);
        assert_eq!(interner.get(id), "4294967294");
    }

    fn interner_index(interner: &mut Interner, index: u32) -> StringId {
        interner.intern_index(index)
    }

    #[test]
    fn array_index_parsing() {
        assert_eq!(Interner::array_index_of("0"), Some(0));
        assert_eq!(Interner::array_index_of("5"), Some(5));
        assert_eq!(Interner::array_index_of("4294967294"), Some(4_294_967_294));
        assert_eq!(Interner::array_index_of("4294967295"), None);
        assert_eq!(Interner::array_index_of("05"), None);
        assert_eq!(Interner::array_index_of(""), None);
        assert_eq!(Interner::array_index_of("1x"), None);
    }

    #[test]
    fn serde_round_trip_preserves_ids() {
        let mut interner = Interner::new();
        let a = interner.intern("alpha");
        let b = interner.intern("bravo");
        let bytes = postcard::to_allocvec(&interner).unwrap();
        let restored: Interner = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(restored.get(a), "alpha");
        assert_eq!(restored.get(b), "bravo");
        assert_eq!(restored.len(), interner.len());
    }
}
