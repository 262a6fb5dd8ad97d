pub mod access;
pub mod file;
pub mod maintenance;
pub mod share;

pub use access::AccessGate;
pub use file::FileService;
pub use share::ShareService;
