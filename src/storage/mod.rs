//! JSON document storage layer
//!
//! All cross-invocation state lives in small JSON documents under the backup
//! directory. Documents are read whole, mutated in memory, and rewritten
//! atomically; there is no cross-document transactionality.

pub mod file_io;
pub mod lock;

pub use file_io::{read_json, read_json_required, write_json_atomic};
pub use lock::InvocationLock;
