//! LZSS-class compressors used by Nintendo DS executables and assets.
//!
//! | Module | Direction | Used for |
//! |--------|-----------|----------|
//! | [`lz10`] | forward  | general-purpose asset compression (tag `0x10`) |
//! | [`code`] | reverse, in place | ARM9 main code and overlays |
//!
//! Both share the same token grammar (flag byte + up to 8 literal/back-reference
//! tokens); `code` simply walks it from the tail of the buffer instead of the
//! head. See each submodule for the wire layout.

mod core;
pub mod code;
pub mod lz10;
