//! Tests for message types and domain identifiers.

use super::*;

mod queue_name {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(QueueName::new("orders".to_string()).is_ok());
        assert!(QueueName::new("orders-eu_west.v2".to_string()).is_ok());
        assert!(QueueName::new("a".to_string()).is_ok());
        assert!(QueueName::new("q".repeat(260)).is_ok());
    }

    #[test]
    fn test_invalid_names() {
        assert!(QueueName::new("".to_string()).is_err());
        assert!(QueueName::new("q".repeat(261)).is_err());
        assert!(QueueName::new("-leading".to_string()).is_err());
        assert!(QueueName::new("trailing-".to_string()).is_err());
        assert!(QueueName::new("double--hyphen".to_string()).is_err());
        assert!(QueueName::new("white space".to_string()).is_err());
        assert!(QueueName::new("special@chars".to_string()).is_err());
    }

    #[test]
    fn test_empty_name_reports_out_of_range() {
        let error = QueueName::new(String::new()).unwrap_err();
        assert!(matches!(error, ValidationError::OutOfRange { .. }));
    }

    #[test]
    fn test_parse_and_display() {
        let name: QueueName = "billing".parse().unwrap();
        assert_eq!(name.as_str(), "billing");
        assert_eq!(name.to_string(), "billing");
    }
}

mod delivery_tag {
    use super::*;

    #[test]
    fn test_ordering_follows_numeric_value() {
        assert!(DeliveryTag::new(1) < DeliveryTag::new(2));
        assert_eq!(DeliveryTag::from(7), DeliveryTag::new(7));
    }

    #[test]
    fn test_parse_valid_tag() {
        let tag: DeliveryTag = "42".parse().unwrap();
        assert_eq!(tag.as_u64(), 42);
        assert_eq!(tag.to_string(), "42");
    }

    #[test]
    fn test_parse_invalid_tag() {
        let result = "forty-two".parse::<DeliveryTag>();
        assert!(matches!(
            result,
            Err(ValidationError::InvalidFormat { .. })
        ));
    }
}

mod timestamp {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_display_format() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 45).unwrap();
        let ts = Timestamp::from_datetime(dt);
        assert_eq!(ts.to_string(), "2024-03-01 12:30:45 UTC");
        assert_eq!(ts.as_datetime(), dt);
    }

    #[test]
    fn test_now_is_monotonic_enough_for_ordering() {
        let first = Timestamp::now();
        let second = Timestamp::now();
        assert!(second >= first);
    }
}

#[test]
fn test_queue_status_serializes_counts() {
    let status = QueueStatus {
        queue_name: "orders".to_string(),
        ready_count: 3,
        in_flight_count: 1,
    };

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["queue_name"], "orders");
    assert_eq!(json["ready_count"], 3);
    assert_eq!(json["in_flight_count"], 1);
}
