//! Callable symbols: parameter tables, argument binding, functions and the
//! registry they are resolved through.

pub mod function;
pub mod registry;
pub mod signature;

pub use function::{CallError, Function, HaltSignal, Interruptible};
pub use registry::{parse_reference, Registry, ResolveError, Symbol};
pub use signature::{
    BindingError, BoundArgs, CallArgs, Param, ParamKind, Signature, SignatureError,
};
