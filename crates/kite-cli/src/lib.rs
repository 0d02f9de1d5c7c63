//! Library wrapper around the `kite` CLI implementation.
//!
//! `cargo test -p kite-cli --lib` typechecks the CLI without building the integration tests, so
//! the binary crate root (`main.rs`) is compiled here as a module as well.

#[allow(dead_code)]
#[path = "main.rs"]
mod main_bin;
