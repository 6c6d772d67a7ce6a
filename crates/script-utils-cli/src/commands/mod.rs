//! Handlers that live in the binary rather than the core library.

pub mod fix_dirs;
