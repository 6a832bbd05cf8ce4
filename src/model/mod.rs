//! Domain Model
//!
//! Value types shared by every other module.
//!
//! ## Submodules
//! - **`types`**: Products, access points, events, event tokens and owner scopes.
//! - **`buffer`**: `CappedString`, the bounded output used by the CGI builders.

pub mod buffer;
pub mod types;

#[cfg(test)]
mod tests;
