//! Session- and file-scoped caches.

mod file;
mod session;

pub use file::{FileCache, FileContext};
pub use session::SessionTreeCache;
