//! Financial Ping Module
//!
//! The text protocol spoken with the financial server, kept free of storage
//! concerns wherever possible so each stage can be tested on its own.
//!
//! ## Request
//! `/tools/pso/ping?as=<signature>[&brand=..][&pid=..][&hl=..][&id=..][&events=..]&rep=2&rlz=<AP>:<value>,..[&dcc=..]`
//!
//! ## Response
//! Lines of `name: value`, terminated by a `crc32: <hex>` line whose value is
//! the CRC-32 of everything before it (including the newline that opens the
//! checksum line). Recognized lines:
//! - `rlz<AP>: <value>`: new RLZ for an access point.
//! - `events: TOK,TOK`: transient events the server has counted.
//! - `stateful_events: TOK,TOK`: events to remember permanently.
//! - `dcc: ..` / `set_dcc: ..`: deal code echo and replacement.
//!
//! ## Submodules
//! - **`protocol`**: field names, limits and intervals.
//! - **`checksum`**: the CRC gate every response must pass.
//! - **`request`**: builders for the ping parameters and the request path.
//! - **`response`**: a two-level tokenizer turning a response into a plan.
//! - **`scheduler`**: last-ping bookkeeping and the throttle.
//! - **`transport`**: the `Transport` trait and the HTTP implementation.

pub mod checksum;
pub mod protocol;
pub mod request;
pub mod response;
pub mod scheduler;
pub mod transport;
