mod file;

pub use file::{FilePatch, FileRecord, FileStatus, NewFileRecord};
