//! Content addressing and at-rest encryption primitives.

pub mod encryption;
pub mod hash;

pub use encryption::Encryptor;
pub use hash::ContentId;
