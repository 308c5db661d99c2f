//! Host platform identifiers exposed to templates.
//!
//! Upstream projects name their release assets with either the Rust/kernel
//! convention (`x86_64`, `aarch64`, `linux`, `macos`) or the Go convention
//! (`amd64`, `arm64`, `linux`, `darwin`). Both spellings are offered so a
//! download template can match whichever one the vendor uses.
//!
//! # Example
//!
//! ```
//! use updo_schema::{Arch, Os};
//!
//! println!("Running on: {}/{}", Os::current(), Arch::current());
//! ```

/// CPU architecture of the running host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    /// Intel/AMD 64-bit.
    X86_64,
    /// ARM 64-bit.
    Aarch64,
    /// Any other architecture; carries the `std::env::consts::ARCH` value.
    Other(&'static str),
}

impl Arch {
    /// Get the current architecture
    pub fn current() -> Self {
        match std::env::consts::ARCH {
            "x86_64" => Self::X86_64,
            "aarch64" => Self::Aarch64,
            other => Self::Other(other),
        }
    }

    /// Rust-convention architecture name (`x86_64` / `aarch64`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::Aarch64 => "aarch64",
            Self::Other(s) => s,
        }
    }

    /// Go-convention architecture name (`amd64` / `arm64`).
    pub fn go_name(&self) -> &'static str {
        match self {
            Self::X86_64 => "amd64",
            Self::Aarch64 => "arm64",
            Self::Other(s) => s,
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Operating system of the running host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    /// Linux-based operating systems.
    Linux,
    /// Apple macOS.
    MacOS,
    /// Microsoft Windows.
    Windows,
    /// Any other operating system; carries the `std::env::consts::OS` value.
    Other(&'static str),
}

impl Os {
    /// Get the current operating system
    pub fn current() -> Self {
        match std::env::consts::OS {
            "linux" => Self::Linux,
            "macos" => Self::MacOS,
            "windows" => Self::Windows,
            other => Self::Other(other),
        }
    }

    /// Rust-convention OS name (`linux`, `macos`, `windows`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::MacOS => "macos",
            Self::Windows => "windows",
            Self::Other(s) => s,
        }
    }

    /// Go-convention OS name (`linux`, `darwin`, `windows`).
    pub fn go_name(&self) -> &'static str {
        match self {
            Self::MacOS => "darwin",
            other => other.as_str(),
        }
    }
}

impl std::fmt::Display for Os {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
