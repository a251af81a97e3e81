use super::*;

#[test]
fn parse_timestamp_accepts_offset_with_microseconds() {
    let ts = parse_timestamp("2024-05-01T10:00:00.123456+00:00").expect("parse");
    assert_eq!(ts.unix_timestamp(), 1_714_557_600);
    assert_eq!(ts.microsecond(), 123_456);
}

#[test]
fn parse_timestamp_accepts_zulu() {
    let ts = parse_timestamp("2024-05-01T10:00:00Z").expect("parse");
    assert_eq!(ts.unix_timestamp(), 1_714_557_600);
}

#[test]
fn parse_timestamp_treats_naive_values_as_utc() {
    let ts = parse_timestamp("2024-05-01T10:00:00.5").expect("parse");
    assert_eq!(ts.unix_timestamp(), 1_714_557_600);
    assert_eq!(ts.offset(), time::UtcOffset::UTC);
}

#[test]
fn parse_timestamp_normalizes_offsets_for_ordering() {
    let east = parse_timestamp("2024-05-01T12:00:00+02:00").expect("parse");
    let utc = parse_timestamp("2024-05-01T10:00:00+00:00").expect("parse");
    assert_eq!(east, utc);
}

#[test]
fn parse_timestamp_rejects_garbage() {
    assert!(parse_timestamp("yesterday").is_none());
    assert!(parse_timestamp("").is_none());
}

#[test]
fn format_timestamp_round_trips_through_parse() {
    let ts = parse_timestamp("2024-05-01T10:00:00.25Z").expect("parse");
    assert_eq!(parse_timestamp(&format_timestamp(ts)), Some(ts));
}

#[test]
fn epoch_millis_values_are_accepted() {
    let ts = timestamp_from_value::<serde_json::Error>(&serde_json::json!(1_714_557_600_000_i64))
        .expect("number")
        .expect("some");
    assert_eq!(ts.unix_timestamp(), 1_714_557_600);
}

#[test]
fn boolean_values_are_rejected() {
    let err = timestamp_from_value::<serde_json::Error>(&serde_json::json!(true));
    assert!(err.is_err());
}
