#![doc = include_str!("../../../README.md")]

// first so the heap's teardown hooks are available everywhere
mod heap;

mod builtins;
mod bytecode;
mod compiler;
mod context;
mod convert;
mod engine;
mod envs;
mod exception;
mod function;
mod intern;
mod lcache;
mod lexer;
mod object;
mod port;
mod snapshot;
mod value;
mod vm;

pub use crate::{
    context::{Context, ExternalHandler, NativeFreeCallback},
    engine::{JsValue, PropertyInfo, throw_type_error},
    exception::{ExcKind, Exception, FatalCode, ParseError, ParseErrorKind},
    heap::{HeapStats, LimitedTracker, NoLimitTracker, ResourceError, ResourceTracker},
    port::{HostPort, LogLevel, PanicPort, StdPort},
    snapshot::{SNAPSHOT_MAGIC, SNAPSHOT_VERSION, SnapshotError, run_snapshot, save_snapshot},
};
