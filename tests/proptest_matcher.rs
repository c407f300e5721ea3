//! Property-based tests for matching and mapping rules.
//!
//! Uses proptest to verify that:
//! - `every[!] N days` directives parse for any positive N and any surrounding text
//! - whitespace normalization is idempotent and spacing-insensitive
//! - marker stripping removes trailing markers and nothing else
//! - the mapping store keeps both directions one-to-one under any insert order

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use std::collections::BTreeSet;
use tracing::info;

use tasksync::matcher::{has_marker, parse_recurrence, strip_markers};
use tasksync::model::RecurrenceSpec;
use tasksync::store::IdentityStore;
use tasksync::util::normalize_whitespace;

fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

fn markers() -> Vec<String> {
    vec!["⭐".to_string(), "*".to_string()]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 100,
        ..Default::default()
    })]

    /// Property: a completion directive yields its day count wherever it sits in the text
    #[test]
    fn completion_directive_parses_anywhere(
        days in 1u32..10_000u32,
        prefix in "[a-z ]{0,20}",
        suffix in "[a-z ]{0,20}",
    ) {
        init_test_logging();
        let text = format!("{prefix} every! {days} days {suffix}");
        info!("proptest_directive: text={text:?}");

        let spec = parse_recurrence(&text);
        prop_assert_eq!(spec, Some(RecurrenceSpec::AfterCompletion { days }));
    }

    /// Property: without `!` the directive is kept as an opaque calendar rule
    #[test]
    fn calendar_directive_is_strict(days in 1u32..500u32) {
        let text = format!("Every {days} day");
        let spec = parse_recurrence(&text).expect("directive");
        prop_assert!(spec.is_strict());
        prop_assert_eq!(spec, RecurrenceSpec::Calendar { rule: text });
    }

    /// Property: zero-day directives never parse
    #[test]
    fn zero_days_is_rejected(bang in proptest::bool::ANY) {
        let text = format!("every{} 0 days", if bang { "!" } else { "" });
        prop_assert_eq!(parse_recurrence(&text), None);
    }

    /// Property: normalization is idempotent
    #[test]
    fn normalize_is_idempotent(text in "[a-z \t\n]{0,60}") {
        let once = normalize_whitespace(&text);
        prop_assert_eq!(normalize_whitespace(&once), once.clone());
        prop_assert!(!once.starts_with(' '));
        prop_assert!(!once.ends_with(' '));
        prop_assert!(!once.contains("  "));
    }

    /// Property: texts that differ only in spacing normalize equal
    #[test]
    fn normalize_ignores_spacing(
        words in proptest::collection::vec("[a-z]{1,8}", 1..8),
        gap in "[ \t\n]{1,4}",
    ) {
        let single = words.join(" ");
        let spaced = format!("{gap}{}{gap}", words.join(&gap));
        prop_assert_eq!(normalize_whitespace(&single), normalize_whitespace(&spaced));
    }

    /// Property: a trailing marker is detected and stripped, leaving the title
    #[test]
    fn trailing_marker_is_stripped(
        title in "[A-Za-z][A-Za-z ]{0,30}[A-Za-z]",
        use_star in proptest::bool::ANY,
    ) {
        let marker = if use_star { "*" } else { "⭐" };
        let text = format!("{title} {marker}");
        prop_assert!(has_marker(&text, &markers()));
        prop_assert_eq!(strip_markers(&text, &markers()), title.trim().to_string());
    }

    /// Property: marker-free text is neither starred nor altered beyond trimming
    #[test]
    fn unmarked_text_is_left_alone(title in "[A-Za-z0-9 ]{0,40}") {
        prop_assert!(!has_marker(&title, &markers()));
        prop_assert_eq!(strip_markers(&title, &markers()), title.trim().to_string());
    }

    /// Property: the store stays one-to-one whatever sequence of mappings is recorded
    #[test]
    fn store_mappings_stay_unique(
        pairs in proptest::collection::vec((0u8..12, 0u8..12), 1..40),
    ) {
        init_test_logging();
        let mut store = IdentityStore::in_memory();
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        for (step, (source, target)) in pairs.iter().enumerate() {
            let at = base + chrono::Duration::minutes(i64::try_from(step).expect("step fits"));
            store
                .record_mapping(&format!("t{source}"), &format!("g{target}"), "L1", at)
                .expect("non-empty ids");
        }

        let mut sources = BTreeSet::new();
        let mut targets = BTreeSet::new();
        for mapping in store.mappings() {
            prop_assert!(sources.insert(mapping.source_id.clone()));
            prop_assert!(targets.insert(mapping.target_id.clone()));
            let reverse = store.get_by_target(&mapping.target_id).expect("reverse entry");
            prop_assert_eq!(&reverse.source_id, &mapping.source_id);
        }

        // The most recent pair always survives.
        let (source, target) = pairs[pairs.len() - 1];
        let last = store.get_by_source(&format!("t{source}")).expect("last mapping");
        prop_assert_eq!(last.target_id.clone(), format!("g{target}"));
    }
}
