//! Local State Module
//!
//! Typed views over the persistent store for everything the ping protocol
//! reads and writes.
//!
//! ## Responsibilities
//! 1. **Layout**: owns the key paths below, so no other module spells a
//!    storage location by hand.
//! 2. **Validation**: rejects sentinel access points and events, enforces the
//!    RLZ and deal code length limits and normalizes their character set.
//! 3. **Verification**: every delete is read back; a value that survives is
//!    reported as `VerificationFailed`.
//!
//! ## Lock Discipline
//! Each view is built from a store reference and a borrowed
//! [`ExclusiveLock`](crate::access::ExclusiveLock). The views never lock on
//! their own; the caller holds the lock for the whole public operation.
//!
//! ## Layout
//! ```text
//! Shared/Rlz/RLZs                  <AP>    = RLZ text
//! Shared/Rlz/Events/<P>            <TOKEN> = 1
//! Shared/Rlz/StatefulEvents/<P>    <TOKEN> = 1
//! Shared/Rlz/PTimes                <P>     = last ping, ms since epoch
//! Shared/Rlz/DCC                   dcc     = deal code   (machine owner)
//! Shared/Rlz/Machine               id      = machine id  (machine owner)
//! ```
//!
//! ## Submodules
//! - **`events`**: `EventStore`, transient and stateful event sets.
//! - **`rlz`**: `RlzStore` and the RLZ character normalization.
//! - **`deal`**: `DealCodeStore`, the machine id and the deal code response parser.

pub mod deal;
pub mod events;
pub mod rlz;


use crate::model::types::Product;
use crate::storage::KeyPath;

pub const PARENT_KEY: &str = "Shared";
pub const LIB_KEY: &str = "Rlz";
pub const RLZS_KEY: &str = "RLZs";
pub const EVENTS_KEY: &str = "Events";
pub const STATEFUL_EVENTS_KEY: &str = "StatefulEvents";
pub const PING_TIMES_KEY: &str = "PTimes";
pub const DCC_KEY: &str = "DCC";
pub const MACHINE_KEY: &str = "Machine";

pub const DCC_VALUE: &str = "dcc";
pub const MACHINE_ID_VALUE: &str = "id";

pub fn parent_key() -> KeyPath {
    KeyPath::new(&[PARENT_KEY])
}

pub fn lib_key() -> KeyPath {
    parent_key().join(LIB_KEY)
}

pub fn rlzs_key() -> KeyPath {
    lib_key().join(RLZS_KEY)
}

pub fn events_root_key() -> KeyPath {
    lib_key().join(EVENTS_KEY)
}

pub fn events_key(product: Product) -> KeyPath {
    events_root_key().join(product.name())
}

pub fn stateful_events_root_key() -> KeyPath {
    lib_key().join(STATEFUL_EVENTS_KEY)
}

pub fn stateful_events_key(product: Product) -> KeyPath {
    stateful_events_root_key().join(product.name())
}

pub fn ping_times_key() -> KeyPath {
    lib_key().join(PING_TIMES_KEY)
}

pub fn dcc_key() -> KeyPath {
    lib_key().join(DCC_KEY)
}

pub fn machine_key() -> KeyPath {
    lib_key().join(MACHINE_KEY)
}
