//! Feature gates for server-side applications.
//!
//! A feature is a named switch with five gates (boolean, actors, groups, percentage of actors
//! and percentage of time). Gate values live behind an [Adapter]: in memory, in a local JSON
//! file, or on a remote Feature API reached over HTTP. [Gatekeeper] ties an adapter to a
//! [GroupRegistry] and answers whether a feature is enabled for an optional [Actor].

mod actor;
mod adapter;
mod attribute_value;
mod error;
mod eval;
mod feature;
mod file;
mod gate;
mod gate_values;
mod gatekeeper;
mod group;
pub mod http;
mod memory;
mod test_common;

pub use actor::*;
pub use adapter::*;
pub use attribute_value::*;
pub use error::*;
pub use eval::*;
pub use feature::*;
pub use file::*;
pub use gate::*;
pub use gate_values::*;
pub use gatekeeper::*;
pub use group::*;
pub use http::{BasicAuth, HttpAdapter, HttpAdapterConfig};
pub use memory::*;
