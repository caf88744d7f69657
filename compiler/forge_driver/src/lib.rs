//! Incremental build driver.
//!
//! Ties the pieces together for one invocation:
//!
//! 1. load the persisted knowledge base (discarded if the compiler settings
//!    changed)
//! 2. check for modified files and changed configuration, load the root
//!    directories, and run discovery for unresolved imports
//! 3. plan the requested targets and run the plan on a worker pool
//! 4. save the knowledge base if anything changed
//!
//! Compiler invocation is supplied by the caller as a
//! [`forge_kb::Compiler`]. Configuration sources come from a
//! [`forge_kb::Resolver`]; [`DirResolver`] is the plain-directory fallback.

mod config;
mod driver;
mod error;
mod resolver;

pub use config::BuildConfig;
pub use driver::{Driver, TargetSpec};
pub use error::DriverError;
pub use resolver::{DirResolver, SOURCE_EXTENSIONS};

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for debug output.
///
/// Safe to call multiple times. Does nothing unless `RUST_LOG` is set, e.g.
/// `RUST_LOG=forge_kb=debug` or `RUST_LOG=forge_plan=trace`.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}
