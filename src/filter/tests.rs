use super::*;
use crate::policy::FileSource;
use chrono::Utc;

struct Fixture {
    _dir: tempfile::TempDir,
    filter: MessageFilter,
}

fn fixture(blacklist: &str, whitelist: &str, blocked: &str, config: FilterConfig) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let write = |name: &str, content: &str| {
        let path = dir.path().join(name);
        if !content.is_empty() {
            std::fs::write(&path, content).unwrap();
        }
        path
    };
    let policy = PolicyStore::new(
        Box::new(FileSource::new(write("blacklist.txt", blacklist))),
        Box::new(FileSource::new(write("whitelist.txt", whitelist))),
        Box::new(FileSource::new(write("blocked_phones.json", blocked))),
    );
    let filter = MessageFilter::new(
        config,
        Arc::new(policy),
        Arc::new(RateLedger::in_memory()),
    );
    Fixture { _dir: dir, filter }
}

fn msg(from: &str, body: &str) -> InboundMessage {
    InboundMessage {
        provider_message_id: format!("SM-{body}"),
        from_phone: from.into(),
        body: body.into(),
        received_at: Utc::now(),
    }
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 12, 24).unwrap()
}

const PHONE: &str = "+15551234567";

#[test]
fn test_extract_name_strips_greeting_and_symbols() {
    assert_eq!(extract_name("Hi, santa!", 40, "Guest"), "Santa");
    assert_eq!(extract_name("MERRY CHRISTMAS mary-jane", 40, "Guest"), "Mary-Jane");
    assert_eq!(extract_name("  john   SMITH 123 ", 40, "Guest"), "John Smith");
    assert_eq!(extract_name("hey", 40, "Guest"), "Guest");
    assert_eq!(extract_name("!!!", 40, "Guest"), "Guest");
    assert_eq!(extract_name("", 40, "Friend"), "Friend");
}

#[test]
fn test_extract_name_keeps_names_starting_like_greetings() {
    assert_eq!(extract_name("Hilda", 40, "Guest"), "Hilda");
    assert_eq!(extract_name("heyward", 40, "Guest"), "Heyward");
}

#[test]
fn test_extract_name_caps_length() {
    assert_eq!(extract_name("Bartholomew", 4, "Guest"), "Bart");
    assert_eq!(extract_name("Ann Marie", 4, "Guest"), "Ann");
}

#[test]
fn test_blocked_phone_rejected() {
    let f = fixture("", "", r#"["+15551234567"]"#, FilterConfig::default());
    let v = f.filter.evaluate_on(&msg(PHONE, "Santa"), day());
    assert!(!v.accept);
    assert_eq!(v.reason, Reason::PhoneBlocked);
}

#[test]
fn test_profanity_rejected() {
    let f = fixture("damn\n", "", "", FilterConfig::default());
    let v = f.filter.evaluate_on(&msg(PHONE, "damn it"), day());
    assert!(!v.accept);
    assert_eq!(v.reason, Reason::Profanity);

    let v = f.filter.evaluate_on(&msg(PHONE, "Santa"), day());
    assert!(v.accept);
    assert_eq!(v.display_name, "Santa");
}

#[test]
fn test_profanity_phrase_in_body_caught() {
    let f = fixture("naughty list\n", "", "", FilterConfig::default());
    // neither word of the name is listed on its own; the phrase in the body is
    let v = f.filter.evaluate_on(&msg(PHONE, "Naughty, List!"), day());
    assert_eq!(v.reason, Reason::Profanity);
    assert_eq!(v.display_name, "Naughty List");
}

#[test]
fn test_hyphenated_name_not_caught_by_symbol_entry() {
    let f = fixture("f-ing\n", "", "", FilterConfig::default());
    let v = f.filter.evaluate_on(&msg(PHONE, "Tiff-Ingram"), day());
    assert!(v.accept);
    assert_eq!(v.display_name, "Tiff-Ingram");

    let v = f.filter.evaluate_on(&msg("+15550001111", "f-ing grinch"), day());
    assert!(!v.accept);
    assert_eq!(v.reason, Reason::Profanity);
}

#[test]
fn test_profanity_filter_disabled() {
    let config = FilterConfig {
        profanity_filter: false,
        ..FilterConfig::default()
    };
    let f = fixture("damn\n", "", "", config);
    let v = f.filter.evaluate_on(&msg(PHONE, "damn it"), day());
    assert!(v.accept);
}

#[test]
fn test_whitelist_enforced() {
    let config = FilterConfig {
        use_whitelist: true,
        ..FilterConfig::default()
    };
    let f = fixture("", "santa\nrudolph\n", "", config);

    let v = f.filter.evaluate_on(&msg(PHONE, "Frosty"), day());
    assert_eq!(v.reason, Reason::NotWhitelisted);
    assert!(!v.accept);

    let v = f.filter.evaluate_on(&msg(PHONE, "rudolph"), day());
    assert!(v.accept);
    assert_eq!(v.display_name, "Rudolph");
}

#[test]
fn test_empty_whitelist_allows_everything() {
    let config = FilterConfig {
        use_whitelist: true,
        ..FilterConfig::default()
    };
    let f = fixture("", "", "", config);
    assert!(f.filter.evaluate_on(&msg(PHONE, "Frosty"), day()).accept);
}

#[test]
fn test_rate_limit_after_max_accepted() {
    let config = FilterConfig {
        max_messages_per_phone: 2,
        ..FilterConfig::default()
    };
    let f = fixture("", "", "", config);
    assert!(f.filter.evaluate_on(&msg(PHONE, "Santa"), day()).accept);
    assert!(f.filter.evaluate_on(&msg(PHONE, "Rudolph"), day()).accept);
    let third = f.filter.evaluate_on(&msg(PHONE, "Frosty"), day());
    assert!(!third.accept);
    assert_eq!(third.reason, Reason::RateLimited);

    // another phone has its own budget, and tomorrow starts fresh
    assert!(f.filter.evaluate_on(&msg("+15550000000", "Frosty"), day()).accept);
    let tomorrow = day().succ_opt().unwrap();
    assert!(f.filter.evaluate_on(&msg(PHONE, "Frosty"), tomorrow).accept);
}

#[test]
fn test_rejections_do_not_consume_budget() {
    let config = FilterConfig {
        max_messages_per_phone: 1,
        ..FilterConfig::default()
    };
    let f = fixture("damn\n", "", "", config);
    for _ in 0..3 {
        assert_eq!(
            f.filter.evaluate_on(&msg(PHONE, "damn"), day()).reason,
            Reason::Profanity
        );
    }
    assert!(f.filter.evaluate_on(&msg(PHONE, "Santa"), day()).accept);
}

#[test]
fn test_invalid_format() {
    let f = fixture("", "", "", FilterConfig::default());
    let v = f
        .filter
        .evaluate_on(&msg(PHONE, "please show my whole family"), day());
    assert_eq!(v.reason, Reason::InvalidFormat);

    let config = FilterConfig {
        one_word_only: true,
        ..FilterConfig::default()
    };
    let f = fixture("", "", "", config);
    assert_eq!(
        f.filter.evaluate_on(&msg(PHONE, "John Smith"), day()).reason,
        Reason::InvalidFormat
    );
    assert!(f.filter.evaluate_on(&msg(PHONE, "John"), day()).accept);
}

#[test]
fn test_overlong_name_invalid() {
    let config = FilterConfig {
        max_message_length: 200,
        two_words_max: false,
        ..FilterConfig::default()
    };
    let f = fixture("", "", "", config);
    let body = "a".repeat(60);
    assert_eq!(
        f.filter.evaluate_on(&msg(PHONE, &body), day()).reason,
        Reason::InvalidFormat
    );
}

#[test]
fn test_duplicate_name_same_day() {
    let f = fixture("", "", "", FilterConfig::default());
    assert!(f.filter.evaluate_on(&msg(PHONE, "Santa"), day()).accept);
    let v = f.filter.evaluate_on(&msg(PHONE, "SANTA"), day());
    assert_eq!(v.reason, Reason::Duplicate);
    assert_eq!(v.display_name, "Santa");
    assert!(f.filter.evaluate_on(&msg("+15550000000", "Santa"), day()).accept);
}

#[test]
fn test_duplicate_allowed_when_disabled() {
    let config = FilterConfig {
        reject_duplicate_names: false,
        ..FilterConfig::default()
    };
    let f = fixture("", "", "", config);
    assert!(f.filter.evaluate_on(&msg(PHONE, "Santa"), day()).accept);
    assert!(f.filter.evaluate_on(&msg(PHONE, "Santa"), day()).accept);
}

#[test]
fn test_release_restores_budget() {
    let config = FilterConfig {
        max_messages_per_phone: 1,
        ..FilterConfig::default()
    };
    let f = fixture("", "", "", config);
    assert!(f.filter.evaluate_on(&msg(PHONE, "Santa"), day()).accept);
    f.filter.release(PHONE, day(), "Santa");
    assert!(f.filter.evaluate_on(&msg(PHONE, "Santa"), day()).accept);
}

mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn blocked_phone_always_rejected(body in ".{0,80}") {
            let f = fixture("damn\n", "santa\n", r#"["+15551234567"]"#, FilterConfig {
                use_whitelist: true,
                ..FilterConfig::default()
            });
            let v = f.filter.evaluate_on(&msg(PHONE, &body), day());
            prop_assert!(!v.accept);
            prop_assert_eq!(v.reason, Reason::PhoneBlocked);
        }

        #[test]
        fn accepted_never_exceeds_daily_limit(
            limit in 1u32..6,
            names in proptest::collection::vec("[a-z]{3,8}", 1..15)
        ) {
            let f = fixture("", "", "", FilterConfig {
                max_messages_per_phone: limit,
                reject_duplicate_names: false,
                ..FilterConfig::default()
            });
            let accepted = names
                .iter()
                .filter(|n| f.filter.evaluate_on(&msg(PHONE, n), day()).accept)
                .count();
            prop_assert_eq!(accepted, names.len().min(limit as usize));
        }
    }
}
