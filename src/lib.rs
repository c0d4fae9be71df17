//! Wirebench - Main Library
//!
//! Thin binary layer over the connectivity core.
//!
//! ## Architecture
//!
//! - **bin_common**: Common utilities for binary executables (CLI, runners)
//! - **connectivity**: Client, workers, listeners and codecs (re-exported from workspace)
//!
//! ## Usage in Binaries
//!
//! ```rust
//! use wirebench::bin_common::{load_config_from_env, ConfigType};
//! use wirebench::connectivity::Connection;
//! ```

// Re-export workspace libraries for convenience
pub use connectivity;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables
    //!
    //! Config path resolution, logging setup and the runner trait.

    pub mod cli;
    pub mod runner;

    pub use cli::{init_logging_with_level, load_config_from_env, parse_args, ConfigType};
    pub use runner::{BinaryRunner, RunConfig};
}
