// FFI functions perform null checks before dereferencing raw pointers.
// Clippy cannot verify this statically, so we allow it at crate level.
#![allow(clippy::not_unsafe_ptr_arg_deref)]

pub mod arena;
pub mod classify;
pub mod context;
pub mod ffi;
pub mod generation;
pub mod idle;
pub mod popen;
pub mod recognizer;
pub mod settings;
pub mod suggest;
pub mod trace_init;

pub use classify::{Classifications, ClassifyError, WordClass};
pub use context::{EngineContext, EngineError};
pub use generation::{GenerationCounter, GenerationId};
pub use idle::{CoroutineHost, HostError, IdleDriver, IdleOutcome, IdleState, WakeEvent};
pub use popen::{
    CloseStatus, HandleId, PipeMode, PopenError, PopenReader, PopenRegistry, PopenWriter,
    YieldGuard,
};
pub use recognizer::{CommandResolver, PathResolver, Recognition, Recognizer};
pub use suggest::{
    Match, MatchBatch, MatchBuilder, MatchFlags, MatchKind, MatchToolkit, SuggestOutcome,
    Suggester, Suggestion, SuggestionSource,
};
