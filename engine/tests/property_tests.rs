use proptest::prelude::*;

use crmflow_engine::config::Config;
use crmflow_engine::helpers::analytics::{score_ascending, score_recency};
use crmflow_engine::helpers::contact::{apply_format, parse_name};
use crmflow_engine::helpers::template::render;
use sdk::FieldMap;

fn ascending_thresholds() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(1u32..1000, 4).prop_map(|steps| {
        let mut total = 0.0;
        steps
            .into_iter()
            .map(|step| {
                total += step as f64;
                total
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn test_ascending_score_is_bounded_and_monotonic(
        thresholds in ascending_thresholds(),
        a in 0.0..5000.0f64,
        b in 0.0..5000.0f64,
    ) {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        let low_score = score_ascending(low, &thresholds);
        let high_score = score_ascending(high, &thresholds);
        prop_assert!((1..=5).contains(&low_score));
        prop_assert!((1..=5).contains(&high_score));
        prop_assert!(low_score <= high_score);
    }

    #[test]
    fn test_recency_score_favours_recent_orders(
        windows in ascending_thresholds(),
        a in 0.0..5000.0f64,
        b in 0.0..5000.0f64,
    ) {
        let (recent, older) = if a <= b { (a, b) } else { (b, a) };
        let recent_score = score_recency(recent, &windows);
        let older_score = score_recency(older, &windows);
        prop_assert!((1..=5).contains(&recent_score));
        prop_assert!(recent_score >= older_score);
    }

    #[test]
    fn test_template_without_placeholders_is_unchanged(text in "[A-Za-z0-9 .,!?:-]{0,80}") {
        let mut fields = FieldMap::new();
        fields.insert("first_name".to_string(), serde_json::json!("Ada"));
        prop_assert_eq!(render(&text, &fields), text);
    }

    #[test]
    fn test_formats_are_idempotent(
        text in "[A-Za-z0-9 ]{0,40}",
        format in "upper|lower|title|trim|sentence|digits_only",
    ) {
        let once = apply_format(&text, &format);
        let twice = apply_format(&once, &format);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn test_parse_name_keeps_every_token(words in prop::collection::vec("[A-Z][a-z]{0,8}\\.?", 1..6)) {
        let full = words.join(" ");
        let parsed = parse_name(&full);
        let rebuilt: Vec<String> = [
            parsed.prefix,
            parsed.first,
            parsed.middle,
            parsed.last,
            parsed.suffix,
        ]
        .into_iter()
        .flatten()
        .collect();
        prop_assert_eq!(rebuilt.join(" "), full);
    }

    #[test]
    fn test_config_timeout_round_trip(timeout in 1u64..=3600, level in "error|warn|info|debug|trace") {
        let toml_str = format!(
            "[core]\nlog_level = \"{}\"\n\n[execution]\ntimeout_secs = {}\n",
            level, timeout
        );
        let config = Config::from_toml(&toml_str).unwrap();
        prop_assert_eq!(config.execution.timeout_secs, timeout);

        let serialized = toml::to_string(&config).unwrap();
        let reparsed = Config::from_toml(&serialized).unwrap();
        prop_assert_eq!(reparsed, config);
    }
}
