//! Wire constants of the financial ping protocol.

use std::time::Duration;

/// Protocol version argument, always first in the ping parameters.
pub const PROTOCOL_CGI_ARGUMENT: &str = "rep=2";

// Request and response field names.
pub const RLZ_CGI_VARIABLE: &str = "rlz";
pub const DCC_CGI_VARIABLE: &str = "dcc";
pub const EVENTS_CGI_VARIABLE: &str = "events";
pub const STATEFUL_EVENTS_CGI_VARIABLE: &str = "stateful_events";
pub const SET_DCC_RESPONSE_VARIABLE: &str = "set_dcc";
pub const PRODUCT_SIGNATURE_CGI_VARIABLE: &str = "as";
pub const PRODUCT_BRAND_CGI_VARIABLE: &str = "brand";
pub const PRODUCT_ID_CGI_VARIABLE: &str = "pid";
pub const PRODUCT_LANGUAGE_CGI_VARIABLE: &str = "hl";
pub const MACHINE_ID_CGI_VARIABLE: &str = "id";

/// Joins an access point code and its RLZ: `I7:1R3_en`.
pub const RLZ_CGI_INDICATOR: &str = ":";
pub const RLZ_CGI_SEPARATOR: &str = ",";
pub const EVENTS_CGI_SEPARATOR: char = ',';

/// Separates a response field name from its value.
pub const RESPONSE_FIELD_SEPARATOR: &str = ": ";
/// Marks the checksum line of a response.
pub const CHECKSUM_FIELD: &str = "crc32: ";

pub const FINANCIAL_PING_PATH: &str = "/tools/pso/ping";
pub const DEFAULT_FINANCIAL_SERVER: &str = "https://clients1.google.com";

pub const MAX_PING_RESPONSE_LENGTH: usize = 16384;
pub const MAX_CGI_LENGTH: usize = 2048;
/// Room for the request path: events and ping params of up to
/// `MAX_CGI_LENGTH` each plus the product fields.
pub const MAX_PING_REQUEST_LENGTH: usize = 3 * MAX_CGI_LENGTH;

/// Minimum spacing of pings for a product with pending events.
pub const EVENTS_PING_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
/// Minimum spacing of pings for a product with nothing to report.
pub const NO_EVENTS_PING_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
