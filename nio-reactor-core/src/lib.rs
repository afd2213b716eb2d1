#![deny(
    // The following are allowed by default lints according to
    // https://doc.rust-lang.org/rustc/lints/listing/allowed-by-default.html
    anonymous_parameters,
    bare_trait_objects,
    missing_debug_implementations,
    unstable_features,
    unused_extern_crates,
    unused_import_braces,
)]
#![warn(
    // elided_lifetimes_in_paths, // allow anonymous lifetime
    missing_copy_implementations,
    missing_docs,
    single_use_lifetimes,
    // trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unused_qualifications,
    unused_results,
    variant_size_differences,

    clippy::all,
    // clippy::restriction,
    clippy::pedantic,
    // clippy::nursery, // It's still under development
    clippy::cargo,
)]
#![allow(
    // Some explicitly allowed Clippy lints, must have clear reason to allow
    clippy::blanket_clippy_restriction_lints, // allow clippy::restriction
    clippy::implicit_return, // actually omitting the return keyword is idiomatic Rust code
    clippy::module_name_repetitions, // repeation of module name in a struct name is not big deal
    clippy::multiple_crate_versions, // multi-version dependency crates is not able to fix
    clippy::panic_in_result_fn,
    clippy::shadow_same, // Not too much bad
    clippy::shadow_reuse, // Not too much bad
    clippy::exhaustive_enums,
    clippy::exhaustive_structs,
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::separated_literal_suffix, // conflicts with clippy::unseparated_literal_suffix
)]

//! A multi-reactor, non-blocking tcp server runtime.
//!
//! Acceptor reactors own the listening sockets, io reactors own the accepted
//! connections and a fixed worker pool runs the business tasks. Every
//! multiplexer is only ever touched by the thread that owns it, other threads
//! talk to it through its bounded task queue.

#[allow(missing_docs)]
pub mod log;

/// Common traits.
pub mod common;

/// Global config.
pub mod config;

/// Channel abstraction over listening and connected sockets.
pub mod channel;

/// Event driven abstraction and impl.
pub mod selector;

/// Reactor thread, task queue and the acceptor/io roles.
pub mod reactor;

/// Business worker pool.
pub mod pool;

/// Server assembly.
pub mod server;

/// A tiny non-blocking client.
pub mod client;
