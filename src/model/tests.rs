//! Model Tests
//!
//! Covers code tables, sentinel handling and the bounded output buffer.

#[cfg(test)]
mod tests {
    use crate::error::RlzError;
    use crate::model::buffer::CappedString;
    use crate::model::types::{AccessPoint, Event, EventToken, OwnerId, Product};
    use std::collections::HashSet;

    // ============================================================
    // CODE TABLES
    // ============================================================

    #[test]
    fn test_access_point_from_code() {
        assert_eq!(AccessPoint::from_code(""), Some(AccessPoint::NoAccessPoint));
        assert_eq!(AccessPoint::from_code("i1"), None);
        assert_eq!(AccessPoint::from_code("I7"), Some(AccessPoint::IeDefaultSearch));
        assert_eq!(AccessPoint::from_code("T4"), Some(AccessPoint::IetbSearchBox));
        assert_eq!(AccessPoint::from_code("T4 "), None);
    }

    #[test]
    fn test_event_from_code() {
        assert_eq!(Event::from_code(""), Some(Event::InvalidEvent));
        assert_eq!(Event::from_code("i1"), None);
        assert_eq!(Event::from_code("I"), Some(Event::Install));
        assert_eq!(Event::from_code("F"), Some(Event::FirstSearch));
        assert_eq!(Event::from_code("F "), None);
    }

    #[test]
    fn test_codes_are_unique() {
        let points: HashSet<&str> = AccessPoint::ALL.iter().map(|p| p.code()).collect();
        assert_eq!(points.len(), AccessPoint::ALL.len());

        let events: HashSet<&str> = Event::ALL.iter().map(|e| e.code()).collect();
        assert_eq!(events.len(), Event::ALL.len());

        let products: HashSet<&str> = Product::ALL.iter().map(|p| p.name()).collect();
        assert_eq!(products.len(), Product::ALL.len());
    }

    #[test]
    fn test_non_sentinel_codes_have_fixed_width() {
        for point in AccessPoint::ALL.iter().skip(1) {
            assert_eq!(point.code().len(), 2, "{:?}", point);
        }
        for event in Event::ALL.iter().skip(1) {
            assert_eq!(event.code().len(), 1, "{:?}", event);
        }
    }

    #[test]
    fn test_parse_rejects_sentinels() {
        assert!(matches!(
            "".parse::<AccessPoint>(),
            Err(RlzError::UnsupportedAccessPoint(_))
        ));
        assert!(matches!("".parse::<Event>(), Err(RlzError::UnsupportedEvent(_))));
        assert!(matches!("Z".parse::<Product>(), Err(RlzError::UnknownProduct(_))));
        assert_eq!("C".parse::<Product>().unwrap(), Product::Chrome);
    }

    #[test]
    fn test_support_table() {
        assert!(!AccessPoint::NoAccessPoint.is_supported());
        assert!(!AccessPoint::MobileIdleScreenBlackberry.is_supported());
        assert!(!AccessPoint::MobileIdleScreenWinmob.is_supported());
        assert!(!AccessPoint::MobileIdleScreenSymbian.is_supported());

        assert!(AccessPoint::IeDefaultSearch.is_supported());
        assert!(AccessPoint::ChromeOmnibox.is_supported());
        assert!(AccessPoint::PartnerAp5.is_supported());

        assert_eq!(AccessPoint::supported().count(), AccessPoint::ALL.len() - 4);
    }

    // ============================================================
    // EVENT TOKENS
    // ============================================================

    #[test]
    fn test_token_encode_and_decode() {
        let token = EventToken::new(AccessPoint::IeDefaultSearch, Event::Install).unwrap();
        assert_eq!(token.encode(), "I7I");
        assert_eq!(EventToken::decode("I7I"), Some(token));
        assert_eq!(token.to_string(), "I7I");
    }

    #[test]
    fn test_token_decode_rejects_garbage() {
        assert_eq!(EventToken::decode(""), None);
        assert_eq!(EventToken::decode("I7"), None);
        assert_eq!(EventToken::decode("I7II"), None);
        assert_eq!(EventToken::decode("ZZI"), None);
        assert_eq!(EventToken::decode("I7Z"), None);
        assert_eq!(EventToken::decode("é1"), None);
    }

    #[test]
    fn test_token_new_rejects_sentinels() {
        assert!(EventToken::new(AccessPoint::NoAccessPoint, Event::Install).is_err());
        assert!(EventToken::new(AccessPoint::IeHomePage, Event::InvalidEvent).is_err());
    }

    // ============================================================
    // OWNERS
    // ============================================================

    #[test]
    fn test_owner_scopes() {
        assert!(OwnerId::machine().is_machine());
        assert!(!OwnerId::user("alice").is_machine());
        assert_eq!(OwnerId::user("alice"), OwnerId::user("alice"));
        assert_ne!(OwnerId::user("alice"), OwnerId::user("bob"));
    }

    // ============================================================
    // CAPPED STRING
    // ============================================================

    #[test]
    fn test_capped_string_fill_fits() {
        let mut buf = CappedString::with_capacity(4);
        buf.fill("abc").unwrap();
        assert_eq!(buf.as_str(), "abc");
    }

    #[test]
    fn test_capped_string_overflow_leaves_empty() {
        let mut buf = CappedString::with_capacity(3);
        buf.fill("ab").unwrap();

        let err = buf.fill("abc").unwrap_err();
        assert!(matches!(
            err,
            RlzError::BufferTooSmall {
                needed: 4,
                capacity: 3
            }
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_capped_string_zero_capacity_is_invalid() {
        let mut buf = CappedString::with_capacity(0);
        assert!(matches!(buf.reset(), Err(RlzError::InvalidArgument(_))));
    }
}
