//! Domain building blocks shared by the persistence layer and the API
//! server: identifiers, errors, lock rules, the task status machine, frame
//! reassembly and the worker wire protocol.
//!
//! Nothing in this crate touches the network or the database.

pub mod api_keys;
pub mod error;
pub mod framer;
pub mod hashing;
pub mod lock;
pub mod protocol;
pub mod status;
pub mod types;
