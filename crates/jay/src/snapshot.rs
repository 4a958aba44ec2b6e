//! Snapshot save and execute.
//!
//! A snapshot is a self-describing blob: a four-byte magic and a format
//! version, followed by the postcard-encoded payload holding the root blob
//! id, every reachable compiled-code blob, and the dynamic interner tail
//! the literal pools refer to. Consumers reject mismatched versions and
//! corrupt payloads: unknown opcodes, out-of-range literal indices, branch
//! targets outside the code, and absurd stack limits.
//!
//! Loading remaps both string ids and code ids into the executing context,
//! so a snapshot can be taken in one context and executed in another.

use ahash::AHashMap;

use crate::{
    bytecode::{CodeId, CompiledCode, Literal, Opcode, OperandSlot, decode_operands},
    compiler::{self, CompileKind},
    context::Context,
    engine::JsValue,
    exception::Exception,
    heap::ResourceTracker,
    intern::{Magic, StringId},
};

/// Magic bytes at the start of every snapshot.
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"JAYB";

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u16 = 1;

/// Why a snapshot was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    BadMagic,
    WrongVersion { found: u16 },
    Corrupt(&'static str),
}

impl std::fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadMagic => write!(f, "snapshot rejected: bad magic"),
            Self::WrongVersion { found } => {
                write!(f, "snapshot rejected: version {found}, expected {SNAPSHOT_VERSION}")
            }
            Self::Corrupt(reason) => write!(f, "snapshot rejected: {reason}"),
        }
    }
}

impl std::error::Error for SnapshotError {}

#[derive(serde::Serialize, serde::Deserialize)]
struct SnapshotPayload {
    /// Root blob id, as numbered within `code_entries`.
    root: u32,
    /// Dynamic interner strings; ids start at `Magic::COUNT`.
    strings: Vec<String>,
    /// Reachable blobs keyed by their saving-context id.
    code_entries: Vec<(u32, CompiledCode)>,
}

/// Compiles `source` and serializes the resulting blobs.
pub fn save_snapshot(
    ctx: &mut Context<impl ResourceTracker>,
    source: &str,
    as_eval: bool,
) -> Result<Vec<u8>, Exception> {
    let kind = if as_eval {
        CompileKind::Eval { strict: false }
    } else {
        CompileKind::Script
    };
    let root = compiler::compile(ctx, source, kind).map_err(Exception::from_parse_error)?;

    // Walk the blob graph from the root.
    let mut code_entries = Vec::new();
    let mut pending = vec![root];
    let mut seen = Vec::new();
    while let Some(id) = pending.pop() {
        if seen.contains(&id) {
            continue;
        }
        seen.push(id);
        let blob = ctx.code.get(id);
        pending.extend(blob.nested_code_ids());
        code_entries.push((id.0, (*blob).clone()));
    }

    let payload = SnapshotPayload {
        root: root.0,
        strings: ctx
            .interns
            .all_strings()
            .skip(Magic::COUNT as usize)
            .map(ToOwned::to_owned)
            .collect(),
        code_entries,
    };

    let mut bytes = Vec::new();
    bytes.extend_from_slice(&SNAPSHOT_MAGIC);
    bytes.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
    let encoded = postcard::to_allocvec(&payload)
        .map_err(|_| Exception::new(None, "snapshot serialization failed"))?;
    bytes.extend_from_slice(&encoded);

    ctx.code.code_deref(root);
    ctx.flush_freed_code();
    Ok(bytes)
}

/// Loads and executes a snapshot, returning its completion value.
pub fn run_snapshot(
    ctx: &mut Context<impl ResourceTracker>,
    bytes: &[u8],
) -> Result<JsValue, Exception> {
    let root = load_snapshot(ctx, bytes).map_err(|error| Exception::new(None, error.to_string()))?;
    let result = ctx.run_code(root);
    ctx.code.code_deref(root);
    ctx.flush_freed_code();
    let value = result.map_err(|thrown| ctx.exception_of(thrown))?;
    Ok(ctx.make_handle(value))
}

/// Validates a snapshot and loads its blobs, remapping string and code ids
/// into this context. Returns the root blob id (one reference owned by the
/// caller).
fn load_snapshot(ctx: &mut Context<impl ResourceTracker>, bytes: &[u8]) -> Result<CodeId, SnapshotError> {
    if bytes.len() < 6 || bytes[..4] != SNAPSHOT_MAGIC {
        return Err(SnapshotError::BadMagic);
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != SNAPSHOT_VERSION {
        return Err(SnapshotError::WrongVersion { found: version });
    }
    let payload: SnapshotPayload =
        postcard::from_bytes(&bytes[6..]).map_err(|_| SnapshotError::Corrupt("undecodable payload"))?;

    // Remap strings: the magic prefix is stable, the tail re-interns.
    let string_count = Magic::COUNT as usize + payload.strings.len();
    let remap_string = |interns: &mut crate::intern::Interner, id: StringId| -> Result<StringId, SnapshotError> {
        let index = id.index();
        if index < Magic::COUNT as usize {
            return Ok(id);
        }
        let tail_index = index - Magic::COUNT as usize;
        match payload.strings.get(tail_index) {
            Some(s) => Ok(interns.intern(s)),
            None => Err(SnapshotError::Corrupt("string id out of range")),
        }
    };

    // First pass: validate and insert each blob, recording the id mapping.
    let mut id_map: AHashMap<u32, CodeId> = AHashMap::new();
    let mut inserted: Vec<CodeId> = Vec::new();
    for (old_id, blob) in &payload.code_entries {
        validate_blob(blob, string_count)?;
        let mut blob = blob.clone();
        for literal in &mut blob.literals {
            match literal {
                Literal::Ident(name) => *name = remap_string(&mut ctx.interns, *name)?,
                Literal::Str(value) => *value = remap_string(&mut ctx.interns, *value)?,
                Literal::Regexp { source, flags } => {
                    *source = remap_string(&mut ctx.interns, *source)?;
                    *flags = remap_string(&mut ctx.interns, *flags)?;
                }
                Literal::Number(_) | Literal::Code(_) => {}
            }
        }
        let new_id = ctx.code.insert(blob);
        id_map.insert(*old_id, new_id);
        inserted.push(new_id);
    }

    // Second pass: rewrite nested code ids. The table owns the blobs behind
    // Rc, so rewriting builds fresh blobs where needed.
    for new_id in &inserted {
        let blob = ctx.code.get(*new_id);
        if blob.nested_code_ids().next().is_none() {
            continue;
        }
        let mut rewritten = (*blob).clone();
        for literal in &mut rewritten.literals {
            if let Literal::Code(nested) = literal {
                let Some(mapped) = id_map.get(&nested.0) else {
                    release_partial(ctx, &inserted);
                    return Err(SnapshotError::Corrupt("nested code id out of range"));
                };
                *nested = *mapped;
            }
        }
        ctx.code.replace(*new_id, rewritten);
    }

    match id_map.get(&payload.root) {
        Some(root) => Ok(*root),
        None => {
            release_partial(ctx, &inserted);
            Err(SnapshotError::Corrupt("root code id out of range"))
        }
    }
}

fn release_partial(ctx: &mut Context<impl ResourceTracker>, inserted: &[CodeId]) {
    for id in inserted {
        if ctx.code.is_live(*id) {
            ctx.code.code_deref(*id);
        }
    }
}

/// Structural validation of one blob: decodable opcode stream, in-range
/// literal indices, in-range branch targets, sane stack limit.
fn validate_blob(blob: &CompiledCode, string_count: usize) -> Result<(), SnapshotError> {
    const MAX_STACK_LIMIT: u16 = 4096;
    if blob.stack_limit > MAX_STACK_LIMIT {
        return Err(SnapshotError::Corrupt("stack limit overflow"));
    }
    for literal in &blob.literals {
        let string_ok = match literal {
            Literal::Ident(name) | Literal::Str(name) => name.index() < string_count,
            Literal::Regexp { source, flags } => source.index() < string_count && flags.index() < string_count,
            _ => true,
        };
        if !string_ok {
            return Err(SnapshotError::Corrupt("literal string id out of range"));
        }
    }

    let wide = blob.wide_literals();
    let code = blob.code.as_slice();
    let mut pc = 0usize;
    while pc < code.len() {
        let Some(op) = Opcode::from_repr(code[pc]) else {
            return Err(SnapshotError::Corrupt("unknown opcode"));
        };
        pc += 1;
        if pc + operand_size(op, wide) > code.len() {
            return Err(SnapshotError::Corrupt("truncated instruction"));
        }
        let operands = decode_operands(op, code, &mut pc, wide);
        for slot in op.layout() {
            match slot {
                OperandSlot::Lit1 => {
                    if usize::from(operands.lit1) >= blob.literals.len() {
                        return Err(SnapshotError::Corrupt("literal index out of range"));
                    }
                }
                OperandSlot::Lit2 => {
                    if usize::from(operands.lit2) >= blob.literals.len() {
                        return Err(SnapshotError::Corrupt("literal index out of range"));
                    }
                }
                OperandSlot::Branch => {
                    let in_range = if op == Opcode::JumpBackward {
                        usize::from(operands.branch) <= pc
                    } else {
                        pc + usize::from(operands.branch) <= code.len()
                    };
                    if !in_range {
                        return Err(SnapshotError::Corrupt("branch target out of range"));
                    }
                }
                _ => {}
            }
        }
    }
    Ok(())
}

fn operand_size(op: Opcode, wide: bool) -> usize {
    op.encoded_size(wide) - 1
}
