//! Property tests for target and duration parsing.

use entrygate::config::parse_duration_string;
use entrygate::ServiceTarget;
use proptest::prelude::*;
use std::time::Duration;

fn hostname() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z][a-z0-9-]{0,20}(\\.[a-z][a-z0-9-]{0,10}){0,2}",
        (any::<u8>(), any::<u8>(), any::<u8>(), any::<u8>())
            .prop_map(|(a, b, c, d)| format!("{}.{}.{}.{}", a, b, c, d)),
    ]
}

proptest! {
    #[test]
    fn host_port_round_trips(host in hostname(), port in 1u16..=65535) {
        let rendered = format!("{}:{}", host, port);
        let target = ServiceTarget::parse(&rendered).unwrap();
        prop_assert_eq!(target.host(), host.as_str());
        prop_assert_eq!(target.port(), port);
        prop_assert_eq!(target.to_string(), rendered);
    }

    #[test]
    fn bracketed_ipv6_round_trips(segments in prop::collection::vec(any::<u16>(), 8), port in 1u16..=65535) {
        let addr = std::net::Ipv6Addr::new(
            segments[0], segments[1], segments[2], segments[3],
            segments[4], segments[5], segments[6], segments[7],
        );
        let rendered = format!("[{}]:{}", addr, port);
        let target = ServiceTarget::parse(&rendered).unwrap();
        prop_assert_eq!(target.to_string(), rendered);
    }

    #[test]
    fn out_of_range_ports_are_rejected(host in hostname(), port in 65536u32..1_000_000) {
        let rendered = format!("{}:{}", host, port);
        prop_assert!(ServiceTarget::parse(&rendered).is_err());
    }

    #[test]
    fn padded_or_signed_ports_are_rejected(host in hostname(), port in 1u16..=65535, zeros in 1usize..4) {
        let padded = format!("{}:{}{}", host, "0".repeat(zeros), port);
        prop_assert!(ServiceTarget::parse(&padded).is_err());
        let signed = format!("{}:+{}", host, port);
        prop_assert!(ServiceTarget::parse(&signed).is_err());
    }

    #[test]
    fn parse_never_panics(input in "\\PC{0,40}") {
        let _ = ServiceTarget::parse(&input);
        let _ = parse_duration_string(&input);
    }

    #[test]
    fn millisecond_durations_are_exact(ms in 0u64..10_000_000) {
        prop_assert_eq!(parse_duration_string(&format!("{}ms", ms)), Some(Duration::from_millis(ms)));
    }

    #[test]
    fn bare_numbers_are_seconds(secs in 0u64..100_000) {
        prop_assert_eq!(parse_duration_string(&secs.to_string()), Some(Duration::from_secs(secs)));
        prop_assert_eq!(parse_duration_string(&format!("{}s", secs)), Some(Duration::from_secs(secs)));
    }
}
