//! IO modules - side effects on the local filesystem

pub mod archive;
