//! Core Domain Types
//!
//! Products, access points and events are closed enumerations. Each one has a
//! fixed short code that is used both as a storage key and on the wire:
//!
//! - **`Product`**: one letter, namespaces event and ping-time state.
//! - **`AccessPoint`**: two characters, keys the stored RLZ value.
//! - **`Event`**: one letter. An access point code followed by an event code
//!   forms the 3-character event token (`I7I` = IE default search, install).
//!
//! `AccessPoint::NoAccessPoint` and `Event::InvalidEvent` carry the empty code
//! and act as the "nothing here" sentinels.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RlzError;

/// Longest RLZ value that may be stored for an access point.
pub const MAX_RLZ_LENGTH: usize = 64;
/// Longest deal confirmation code.
pub const MAX_DCC_LENGTH: usize = 128;

/// The application hosting the library. All event and ping-time state is
/// scoped by product.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Product {
    IeToolbar,
    ToolbarNotifier,
    Pack,
    Desktop,
    Chrome,
    FfToolbar,
    QsbWin,
    Webapps,
    PinyinIme,
    Partner,
}

impl Product {
    pub const ALL: [Product; 10] = [
        Product::IeToolbar,
        Product::ToolbarNotifier,
        Product::Pack,
        Product::Desktop,
        Product::Chrome,
        Product::FfToolbar,
        Product::QsbWin,
        Product::Webapps,
        Product::PinyinIme,
        Product::Partner,
    ];

    /// Storage name of the product namespace.
    pub fn name(self) -> &'static str {
        match self {
            Product::IeToolbar => "T",
            Product::ToolbarNotifier => "P",
            Product::Pack => "U",
            Product::Desktop => "D",
            Product::Chrome => "C",
            Product::FfToolbar => "B",
            Product::QsbWin => "K",
            Product::Webapps => "W",
            Product::PinyinIme => "N",
            Product::Partner => "V",
        }
    }

    pub fn from_name(name: &str) -> Option<Product> {
        Product::ALL.into_iter().find(|product| product.name() == name)
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Product {
    type Err = RlzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Product::from_name(s).ok_or_else(|| RlzError::UnknownProduct(s.to_string()))
    }
}

/// A UI surface that can carry an RLZ value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AccessPoint {
    NoAccessPoint,
    IeDefaultSearch,
    IeHomePage,
    IetbSearchBox,
    QuickSearchBox,
    GdDeskband,
    GdSearchGadget,
    GdWebServer,
    GdOutlook,
    ChromeOmnibox,
    ChromeHomePage,
    ChromeFrame,
    Fftb2Box,
    Fftb3Box,
    PinyinImeBho,
    IgoogleWebpage,
    MobileIdleScreenBlackberry,
    MobileIdleScreenWinmob,
    MobileIdleScreenSymbian,
    FfHomePage,
    FfSearchBox,
    IeBrowsedPage,
    QsbWinBox,
    WebappsCalendar,
    WebappsDocs,
    WebappsGmail,
    IetbLinkdoctor,
    FftbLinkdoctor,
    Ietb7SearchBox,
    Tb8SearchBox,
    PartnerAp1,
    PartnerAp2,
    PartnerAp3,
    PartnerAp4,
    PartnerAp5,
}

impl AccessPoint {
    pub const ALL: [AccessPoint; 35] = [
        AccessPoint::NoAccessPoint,
        AccessPoint::IeDefaultSearch,
        AccessPoint::IeHomePage,
        AccessPoint::IetbSearchBox,
        AccessPoint::QuickSearchBox,
        AccessPoint::GdDeskband,
        AccessPoint::GdSearchGadget,
        AccessPoint::GdWebServer,
        AccessPoint::GdOutlook,
        AccessPoint::ChromeOmnibox,
        AccessPoint::ChromeHomePage,
        AccessPoint::ChromeFrame,
        AccessPoint::Fftb2Box,
        AccessPoint::Fftb3Box,
        AccessPoint::PinyinImeBho,
        AccessPoint::IgoogleWebpage,
        AccessPoint::MobileIdleScreenBlackberry,
        AccessPoint::MobileIdleScreenWinmob,
        AccessPoint::MobileIdleScreenSymbian,
        AccessPoint::FfHomePage,
        AccessPoint::FfSearchBox,
        AccessPoint::IeBrowsedPage,
        AccessPoint::QsbWinBox,
        AccessPoint::WebappsCalendar,
        AccessPoint::WebappsDocs,
        AccessPoint::WebappsGmail,
        AccessPoint::IetbLinkdoctor,
        AccessPoint::FftbLinkdoctor,
        AccessPoint::Ietb7SearchBox,
        AccessPoint::Tb8SearchBox,
        AccessPoint::PartnerAp1,
        AccessPoint::PartnerAp2,
        AccessPoint::PartnerAp3,
        AccessPoint::PartnerAp4,
        AccessPoint::PartnerAp5,
    ];

    /// Two-character wire code. Empty for `NoAccessPoint`.
    pub fn code(self) -> &'static str {
        match self {
            AccessPoint::NoAccessPoint => "",
            AccessPoint::IeDefaultSearch => "I7",
            AccessPoint::IeHomePage => "W1",
            AccessPoint::IetbSearchBox => "T4",
            AccessPoint::QuickSearchBox => "Q1",
            AccessPoint::GdDeskband => "D1",
            AccessPoint::GdSearchGadget => "D2",
            AccessPoint::GdWebServer => "D3",
            AccessPoint::GdOutlook => "D4",
            AccessPoint::ChromeOmnibox => "C1",
            AccessPoint::ChromeHomePage => "C2",
            AccessPoint::ChromeFrame => "C3",
            AccessPoint::Fftb2Box => "B2",
            AccessPoint::Fftb3Box => "B3",
            AccessPoint::PinyinImeBho => "N1",
            AccessPoint::IgoogleWebpage => "G1",
            AccessPoint::MobileIdleScreenBlackberry => "H1",
            AccessPoint::MobileIdleScreenWinmob => "H2",
            AccessPoint::MobileIdleScreenSymbian => "H3",
            AccessPoint::FfHomePage => "R0",
            AccessPoint::FfSearchBox => "R1",
            AccessPoint::IeBrowsedPage => "R2",
            AccessPoint::QsbWinBox => "R3",
            AccessPoint::WebappsCalendar => "R4",
            AccessPoint::WebappsDocs => "R5",
            AccessPoint::WebappsGmail => "R6",
            AccessPoint::IetbLinkdoctor => "R7",
            AccessPoint::FftbLinkdoctor => "R8",
            AccessPoint::Ietb7SearchBox => "T7",
            AccessPoint::Tb8SearchBox => "T8",
            AccessPoint::PartnerAp1 => "V1",
            AccessPoint::PartnerAp2 => "V2",
            AccessPoint::PartnerAp3 => "V3",
            AccessPoint::PartnerAp4 => "V4",
            AccessPoint::PartnerAp5 => "V5",
        }
    }

    /// Decodes a wire code. The empty string decodes to `NoAccessPoint`;
    /// anything unknown (including lowercase or padded codes) is `None`.
    pub fn from_code(code: &str) -> Option<AccessPoint> {
        AccessPoint::ALL.into_iter().find(|point| point.code() == code)
    }

    /// Whether this access point may carry an RLZ on this platform.
    ///
    /// The mobile idle screens never exist on a desktop. Every other point is
    /// assumed to be configured for us.
    pub fn is_supported(self) -> bool {
        !matches!(
            self,
            AccessPoint::NoAccessPoint
                | AccessPoint::MobileIdleScreenBlackberry
                | AccessPoint::MobileIdleScreenWinmob
                | AccessPoint::MobileIdleScreenSymbian
        )
    }

    /// All points that can carry an RLZ, in declaration order.
    pub fn supported() -> impl Iterator<Item = AccessPoint> {
        AccessPoint::ALL.into_iter().filter(|point| point.is_supported())
    }
}

impl fmt::Display for AccessPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for AccessPoint {
    type Err = RlzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match AccessPoint::from_code(s) {
            Some(point) if point != AccessPoint::NoAccessPoint => Ok(point),
            _ => Err(RlzError::UnsupportedAccessPoint(s.to_string())),
        }
    }
}

/// A product lifecycle signal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Event {
    InvalidEvent,
    Install,
    SetToGoogle,
    FirstSearch,
    ReportRls,
    Activate,
}

impl Event {
    pub const ALL: [Event; 6] = [
        Event::InvalidEvent,
        Event::Install,
        Event::SetToGoogle,
        Event::FirstSearch,
        Event::ReportRls,
        Event::Activate,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Event::InvalidEvent => "",
            Event::Install => "I",
            Event::SetToGoogle => "S",
            Event::FirstSearch => "F",
            Event::ReportRls => "R",
            Event::Activate => "A",
        }
    }

    pub fn from_code(code: &str) -> Option<Event> {
        Event::ALL.into_iter().find(|event| event.code() == code)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Event {
    type Err = RlzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Event::from_code(s) {
            Some(event) if event != Event::InvalidEvent => Ok(event),
            _ => Err(RlzError::UnsupportedEvent(s.to_string())),
        }
    }
}

/// An (access point, event) pair as stored and sent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventToken {
    pub point: AccessPoint,
    pub event: Event,
}

impl EventToken {
    /// Length of an encoded token: two access point characters plus one event character.
    pub const LEN: usize = 3;

    /// Builds a token, rejecting the sentinels.
    pub fn new(point: AccessPoint, event: Event) -> Result<Self, RlzError> {
        if point == AccessPoint::NoAccessPoint {
            return Err(RlzError::UnsupportedAccessPoint(point.code().to_string()));
        }
        if event == Event::InvalidEvent {
            return Err(RlzError::UnsupportedEvent(event.code().to_string()));
        }
        Ok(Self { point, event })
    }

    pub fn encode(&self) -> String {
        format!("{}{}", self.point.code(), self.event.code())
    }

    /// Decodes a 3-character token. Wrong length, unknown codes and the
    /// sentinels all decode to `None`.
    pub fn decode(token: &str) -> Option<Self> {
        if token.len() != Self::LEN || !token.is_char_boundary(2) {
            return None;
        }
        let point = AccessPoint::from_code(&token[..2])?;
        let event = Event::from_code(&token[2..])?;
        Self::new(point, event).ok()
    }
}

impl fmt::Display for EventToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.point.code(), self.event.code())
    }
}

/// Scope under which all state is stored: one user, or the whole machine.
///
/// Opaque to the library; only compared for equality and used as a namespace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(pub String);

impl OwnerId {
    const MACHINE: &'static str = "machine";

    pub fn machine() -> Self {
        Self(Self::MACHINE.to_string())
    }

    pub fn user(name: impl Into<String>) -> Self {
        Self(format!("user-{}", name.into()))
    }

    /// The user running this process, from `USER` / `USERNAME`.
    pub fn current_user() -> Self {
        let name = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "default".to_string());
        Self::user(name)
    }

    pub fn is_machine(&self) -> bool {
        self.0 == Self::MACHINE
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
