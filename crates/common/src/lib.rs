//! Shared types, the normalized error model, and the extension runner used
//! across courier crates.

pub mod error;
pub mod hooks;
pub mod types;

pub use {
    error::{ErrorKind, RpcError},
    hooks::{ExtensionRegistry, HookHandler, HookPoint, HookStats},
    types::{CallContext, ReplyMessage, Response},
};
