// bndl-core/src/lib.rs
pub mod context;
pub mod extract;
pub mod git;
pub mod linker;
pub mod resolver;
mod transport;

pub use bndl_common::error::{BndlError, Result};
pub use context::ResolutionContext;
pub use git::{GitBackend, GitCli};
pub use linker::resolve_core_dependency;
pub use resolver::{CreateOptions, DescriptorHandle, Resolver};
