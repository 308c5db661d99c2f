//! Version command

/// Print the binary and core library versions
pub fn version() {
    println!("updo {}", env!("CARGO_PKG_VERSION"));
    println!("{}", updo_core::USER_AGENT);
}
