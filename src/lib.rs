//! # tmcheck
//!
//! Conformance checker for TextMate grammars. Tokenizes a fixture with a
//! grammar (and the grammars it embeds), dumps the scopes of every line, and
//! asserts declarative expectations about which scopes appear where.
//!
//! - [`textmate`]: the grammar engine
//! - [`harness`]: loading, line-by-line driving, evaluation and reporting
//! - [`config`]: layered TOML configuration
//! - [`logging`]: opt-in `tracing` output

pub mod config;
pub mod error;
pub mod harness;
pub mod logging;
pub mod textmate;

pub use error::HarnessError;
pub use harness::{run, Invocation, Outcome};
