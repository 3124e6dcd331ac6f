//! Integration tests for the built-in helpers
//!
//! Every helper runs through the executor against the memory connector, the
//! same way `crmflow run` drives it.

use serde_json::{json, Value};
use std::sync::Arc;

use crmflow_engine::config::ExecutionConfig;
use crmflow_engine::connectors::memory::ConnectorEvent;
use crmflow_engine::connectors::MemoryConnector;
use crmflow_engine::executor::{ExecutionRecord, ExecutionRequest, HelperExecutor};
use crmflow_engine::registry;
use sdk::{ActionType, ConnectorError, HelperConfig};

async fn run(helper_type: &str, crm: &Arc<MemoryConnector>, config: Value) -> ExecutionRecord {
    let executor = HelperExecutor::new(registry::global(), &ExecutionConfig::default());
    let config = HelperConfig::from_value(config).unwrap();
    executor
        .execute(ExecutionRequest::new(helper_type, "c-1", config), crm.clone())
        .await
        .unwrap()
}

fn contact(fields: &[(&str, Value)]) -> Arc<MemoryConnector> {
    Arc::new(MemoryConnector::new().with_fields("c-1", fields))
}

#[tokio::test]
async fn test_vacuous_preconditions_succeed_without_actions() {
    let cases = [
        ("copy_it", json!({"source_field": "nickname", "target_field": "alias"})),
        ("move_it", json!({"source_field": "nickname", "target_field": "alias"})),
        (
            "merge_it",
            json!({"source_fields": ["a", "b", "c"], "target_field": "merged"}),
        ),
        (
            "combine_it",
            json!({"first_field": "a", "second_field": "b", "target_field": "combined"}),
        ),
        ("name_parse_it", json!({"source_field": "full_name"})),
        ("format_it", json!({"field": "nickname", "format": "upper"})),
    ];

    for (helper_type, config) in cases {
        let crm = contact(&[]);
        let record = run(helper_type, &crm, config).await;
        assert!(record.succeeded(), "{} should succeed", helper_type);
        assert!(
            record.output.actions.is_empty(),
            "{} should perform no actions",
            helper_type
        );
    }
}

#[tokio::test]
async fn test_copy_it_without_overwrite_never_clobbers() {
    let crm = contact(&[("email", json!("new@example.com")), ("backup_email", json!("old@example.com"))]);
    let config = json!({"source_field": "email", "target_field": "backup_email", "overwrite": false});

    let record = run("copy_it", &crm, config).await;
    assert!(record.succeeded());
    assert!(record.output.actions.is_empty());
    assert_eq!(crm.field("c-1", "backup_email"), Some(json!("old@example.com")));
}

#[tokio::test]
async fn test_copy_it_twice_is_idempotent() {
    let crm = contact(&[("email", json!("ada@example.com"))]);
    let config = json!({"source_field": "email", "target_field": "backup_email"});

    let first = run("copy_it", &crm, config.clone()).await;
    let after_first = crm.contact("c-1");
    let second = run("copy_it", &crm, config).await;

    assert_eq!(first.output.actions, second.output.actions);
    assert_eq!(crm.contact("c-1").map(|c| c.custom_fields), after_first.map(|c| c.custom_fields));
}

#[tokio::test]
async fn test_merge_it_skip_empty_separator_counts() {
    let crm = contact(&[("a", json!("x")), ("b", json!("")), ("c", json!("z"))]);
    let skip = json!({
        "source_fields": ["a", "b", "c"],
        "target_field": "merged",
        "separator": "|",
    });
    run("merge_it", &crm, skip.clone()).await;
    assert_eq!(crm.field("c-1", "merged"), Some(json!("x|z")));

    let mut keep = skip;
    keep["skip_empty"] = json!(false);
    run("merge_it", &crm, keep).await;
    assert_eq!(crm.field("c-1", "merged"), Some(json!("x||z")));
}

#[tokio::test]
async fn test_combine_it_with_one_empty_side() {
    let crm = contact(&[("first_name", json!("Ada"))]);
    let record = run(
        "combine_it",
        &crm,
        json!({"first_field": "first_name", "second_field": "last_name", "target_field": "display"}),
    )
    .await;

    assert_eq!(record.output.actions.len(), 1);
    assert_eq!(crm.field("c-1", "display"), Some(json!("Ada")));
}

#[tokio::test]
async fn test_name_parse_it_with_suffix() {
    let crm = contact(&[("full_name", json!("John Doe Jr."))]);
    let record = run(
        "name_parse_it",
        &crm,
        json!({"source_field": "full_name", "suffix_field": "suffix"}),
    )
    .await;

    assert!(record.succeeded());
    assert_eq!(record.output.actions.len(), 3);
    assert_eq!(crm.field("c-1", "first_name"), Some(json!("John")));
    assert_eq!(crm.field("c-1", "last_name"), Some(json!("Doe")));
    assert_eq!(crm.field("c-1", "suffix"), Some(json!("Jr.")));
}

#[tokio::test]
async fn test_move_it_moves_and_clears() {
    let crm = contact(&[("temp_phone", json!("555-0100"))]);
    let record = run(
        "move_it",
        &crm,
        json!({"source_field": "temp_phone", "target_field": "phone"}),
    )
    .await;

    assert!(record.succeeded());
    assert_eq!(record.output.actions.len(), 2);
    assert_eq!(crm.field("c-1", "phone"), Some(json!("555-0100")));
    assert_eq!(crm.field("c-1", "temp_phone"), Some(json!("")));
}

#[tokio::test]
async fn test_move_it_preserve_leaves_both_fields() {
    let crm = contact(&[("temp_phone", json!("555-0100")), ("phone", json!("555-0199"))]);
    let record = run(
        "move_it",
        &crm,
        json!({"source_field": "temp_phone", "target_field": "phone", "preserve": true}),
    )
    .await;

    assert!(record.succeeded());
    assert!(record.output.actions.is_empty());
    assert_eq!(crm.field("c-1", "phone"), Some(json!("555-0199")));
    assert_eq!(crm.field("c-1", "temp_phone"), Some(json!("555-0100")));
}

#[tokio::test]
async fn test_move_it_clear_failure_is_secondary() {
    let crm = contact(&[("temp_phone", json!("555-0100"))]);
    crm.fail_on(
        "set_field",
        Some("temp_phone"),
        ConnectorError::Platform("locked".to_string()),
    );

    let record = run(
        "move_it",
        &crm,
        json!({"source_field": "temp_phone", "target_field": "phone"}),
    )
    .await;

    assert!(record.succeeded());
    assert_eq!(record.output.actions.len(), 1);
    assert_eq!(record.output.logs.len(), 1);
    assert_eq!(crm.field("c-1", "phone"), Some(json!("555-0100")));
}

#[tokio::test]
async fn test_found_it_branches_on_presence() {
    let config = json!({
        "check_field": "email",
        "found_tag": 10,
        "not_found_tag": 20,
    });

    let crm = contact(&[("email", json!("a@b.co"))]);
    let record = run("found_it", &crm, config.clone()).await;
    let applied: Vec<_> = record.output.actions_of(ActionType::TagApplied).collect();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].target, "10");

    let crm = contact(&[]);
    let record = run("found_it", &crm, config).await;
    let applied: Vec<_> = record.output.actions_of(ActionType::TagApplied).collect();
    assert_eq!(applied[0].target, "20");
}

#[tokio::test]
async fn test_tag_it_and_goal_it_produce_events() {
    let crm = contact(&[]);
    run("tag_it", &crm, json!({"apply_tags": ["vip"], "remove_tags": []})).await;
    assert!(crm.contact("c-1").unwrap().tags.contains(&"vip".to_string()));

    run("goal_it", &crm, json!({"goal": "purchase", "integration": "shop"})).await;
    assert_eq!(
        crm.events(),
        vec![ConnectorEvent::GoalAchieved {
            contact_id: "c-1".to_string(),
            goal: "purchase".to_string(),
            integration: "shop".to_string(),
        }]
    );
}

#[tokio::test]
async fn test_opt_out_records_status() {
    let crm = contact(&[]);
    let record = run("opt_out", &crm, json!({"reason": "Unsubscribed by form"})).await;

    assert!(record.succeeded());
    assert_eq!(crm.opt_status("c-1"), Some(false));
    assert_eq!(record.output.actions[0].action_type, ActionType::OptOut);
}

#[tokio::test]
async fn test_rfm_is_monotonic_in_frequency() {
    let thresholds = json!({
        "recency_thresholds": [7, 30, 90, 180],
        "frequency_thresholds": [2, 5, 10, 20],
        "monetary_thresholds": [100, 500, 1000, 5000],
    });

    let mut previous = 0;
    for count in [1, 2, 4, 5, 9, 10, 20, 500] {
        let crm = contact(&[("orders.count", json!(count)), ("orders.total", json!(50))]);
        run("rfm_calculation", &crm, thresholds.clone()).await;
        let score = crm
            .field("c-1", "rfm_frequency")
            .and_then(|v| v.as_u64())
            .unwrap();
        assert!(score >= previous, "score dropped at {} orders", count);
        previous = score;
    }
    assert_eq!(previous, 5);
}

#[tokio::test]
async fn test_clv_zero_orders() {
    let crm = contact(&[("orders.count", json!(0))]);
    let record = run("customer_lifetime_value", &crm, json!({})).await;

    assert!(record.succeeded());
    assert_eq!(record.output.message, "No invoices found for contact");
    assert!(record.output.actions.is_empty());
}

#[tokio::test]
async fn test_note_it_renders_merge_fields() {
    let crm = contact(&[("first_name", json!("Grace")), ("plan", json!("pro"))]);
    run(
        "note_it",
        &crm,
        json!({"template": "@FirstName upgraded to {{plan}}", "mode": "replace"}),
    )
    .await;

    assert_eq!(crm.field("c-1", "notes"), Some(json!("Grace upgraded to pro")));
}

#[tokio::test]
async fn test_interrupted_connector_calls_fail_every_family() {
    let cases = [
        ("copy_it", json!({"source_field": "email", "target_field": "backup"})),
        ("move_it", json!({"source_field": "email", "target_field": "backup"})),
        (
            "merge_it",
            json!({"source_fields": ["first_name", "email"], "target_field": "merged"}),
        ),
        ("snapshot_it", json!({"fields": ["email"], "target_field": "history"})),
        ("found_it", json!({"check_field": "email", "found_tag": 10})),
        ("tag_it", json!({"apply_tags": [10]})),
        ("goal_it", json!({"goal": "purchase"})),
        ("company_link", json!({"company_id": "co-1", "company_name": "Acme"})),
        ("note_it", json!({"template": "Hello @FirstName"})),
        ("customer_lifetime_value", json!({})),
    ];

    for interrupt in [ConnectorError::Cancelled, ConnectorError::DeadlineExceeded] {
        for (helper_type, config) in cases.clone() {
            let crm = contact(&[("first_name", json!("Ada")), ("email", json!("ada@example.com"))]);
            for operation in ["get_contact", "get_field", "set_field", "apply_tag", "achieve_goal"] {
                crm.fail_on(operation, None, interrupt.clone());
            }

            let record = run(helper_type, &crm, config).await;
            assert!(
                !record.succeeded(),
                "{} reported success after {:?}",
                helper_type,
                interrupt
            );
            assert!(record.output.actions.is_empty(), "{}", helper_type);
            assert!(crm.events().is_empty(), "{}", helper_type);
        }
    }
}

#[tokio::test]
async fn test_merged_email_is_written_verbatim() {
    // `company` is always part of the flattened contact, so an unguarded
    // second pass would expand the "@company" inside the email
    let crm = contact(&[("email", json!("ada@company.com")), ("company", json!("Acme"))]);

    run(
        "note_it",
        &crm,
        json!({"template": "Contact: {{email}} at {{company}}", "mode": "replace"}),
    )
    .await;
    assert_eq!(
        crm.field("c-1", "notes"),
        Some(json!("Contact: ada@company.com at Acme"))
    );

    run(
        "default_to_field",
        &crm,
        json!({"target_field": "reply_to", "default_value": "@Email"}),
    )
    .await;
    assert_eq!(crm.field("c-1", "reply_to"), Some(json!("ada@company.com")));
}
