mod common;

use assert_matches::assert_matches;
use authenticity_tracker::{
    errors::ServiceError,
    models::{InputStatus, ProductionLine, UpdateProductionInput},
    repositories::ProductionStore,
    services::{
        mo_cache::ErpManufacturingOrder,
        mo_completion::{reconcile_mo, Reconciliation, NO_ACTIVE_INPUTS, WARN_NOT_CONFIGURED},
        notifier::DeliveryMethod,
        receiver::ManufacturingRecord,
    },
};
use chrono::Utc;
use common::{admin_user, new_input, production_user, TestApp, DASHBOARD_URL};
use rstest::rstest;

const LINE: ProductionLine = ProductionLine::Liquid;

async fn statuses(app: &TestApp, mo_number: &str) -> Vec<InputStatus> {
    ProductionStore::new(LINE)
        .list_by_mo(&*app.state.db, mo_number, None)
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.status)
        .collect()
}

#[tokio::test]
async fn end_to_end_submit_then_admin_revert() {
    let app = TestApp::new().await;
    app.state
        .services
        .mo_cache
        .upsert(
            &[ErpManufacturingOrder {
                id: 1,
                name: "MO-0001".to_string(),
                product: Some("MANGO-30ML".to_string()),
                quantity: 120.0,
                uom: Some("Units".to_string()),
                note: Some("liquid".to_string()),
                create_date: None,
            }],
            Utc::now(),
        )
        .await
        .unwrap();

    let id = app.insert(LINE, "MO-0001", "1000", "1050").await;

    let active = app.notifier.sent();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].method, DeliveryMethod::Post);
    assert_eq!(active[0].url, format!("{}/manufacturing", DASHBOARD_URL));
    assert_eq!(active[0].payload.done_qty, None);
    assert_eq!(active[0].payload.target_qty, 120.0);

    let outcome = app
        .state
        .services
        .completion
        .submit_mo_group(LINE, "MO-0001", Some("S1"))
        .await
        .unwrap();
    assert_eq!(outcome.updated_count, 1);
    assert!(!outcome.auto_reverted);
    assert!(outcome.external_api_sent);
    assert_eq!(outcome.manufacturing_id.as_deref(), Some("MO-0001"));

    let sent = app.notifier.sent();
    assert_eq!(sent.len(), 2);
    let completed = &sent[1];
    assert_eq!(completed.method, DeliveryMethod::Put);
    assert_eq!(
        completed.url,
        format!("{}/manufacturing/MO-0001", DASHBOARD_URL)
    );
    assert_eq!(completed.payload.done_qty, Some(50));
    assert_eq!(completed.payload.sku, "MANGO-30ML");
    assert_eq!(completed.payload.sku_name, "Product MANGO-30ML");
    assert_eq!(completed.payload.leader_name, "Rina");
    assert!(completed.payload.finished_at.is_some());

    let input = app.state.services.completion.get_input(LINE, id).await.unwrap();
    assert_eq!(input.status, InputStatus::Completed);
    assert!(input.completed_at.is_some());

    let reverted = app
        .state
        .services
        .completion
        .revert_mo_group(&admin_user(), LINE, "MO-0001")
        .await
        .unwrap();
    assert_eq!(reverted.reverted_count, 1);

    let input = app.state.services.completion.get_input(LINE, id).await.unwrap();
    assert_eq!(input.status, InputStatus::Active);
    assert_eq!(input.completed_at, None);
    assert_eq!(app.notifier.sent().len(), 2, "revert must not notify");
}

#[tokio::test]
async fn second_submit_reports_no_active_inputs() {
    let app = TestApp::new().await;
    app.insert(LINE, "MO-0002", "2000", "2100").await;

    let completion = &app.state.services.completion;
    completion
        .submit_mo_group(LINE, "MO-0002", None)
        .await
        .unwrap();

    let err = completion
        .submit_mo_group(LINE, "MO-0002", None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Conflict(msg) if msg == NO_ACTIVE_INPUTS);
    assert_eq!(statuses(&app, "MO-0002").await, vec![InputStatus::Completed]);
}

#[tokio::test]
async fn submit_covers_every_session_of_the_mo() {
    let app = TestApp::new().await;
    let completion = &app.state.services.completion;
    completion
        .insert_input(LINE, new_input("S1", "MO-0003", &[("10", "20")]))
        .await
        .unwrap();
    completion
        .insert_input(LINE, new_input("S2", "MO-0003", &[("30", "45")]))
        .await
        .unwrap();

    let outcome = completion
        .submit_mo_group(LINE, "MO-0003", Some("S1"))
        .await
        .unwrap();
    assert_eq!(outcome.updated_count, 2);

    let put = app.notifier.sent().pop().unwrap();
    assert_eq!(put.payload.done_qty, Some(25));
}

#[tokio::test]
async fn active_row_appearing_after_update_reverts_whole_mo() {
    let app = TestApp::new().await;
    app.insert(LINE, "MO-0004", "100", "150").await;
    app.insert(LINE, "MO-0004", "150", "175").await;

    let store = ProductionStore::new(LINE);
    let db = &*app.state.db;
    store.mark_completed(db, "MO-0004", Utc::now()).await.unwrap();

    // A late insert lands between the update and the recheck.
    app.insert(LINE, "MO-0004", "175", "180").await;

    let result = reconcile_mo(db, &store, "MO-0004").await.unwrap();
    assert_eq!(
        result,
        Reconciliation::AutoReverted {
            active_count: 1,
            reverted: 2
        }
    );
    assert_eq!(statuses(&app, "MO-0004").await, vec![InputStatus::Active; 3]);
    let rows = store.list_by_mo(db, "MO-0004", None).await.unwrap();
    assert!(rows.iter().all(|r| r.completed_at.is_none()));
}

#[tokio::test]
async fn completing_one_row_while_siblings_are_active_is_reverted() {
    let app = TestApp::new().await;
    let first = app.insert(LINE, "MO-0005", "500", "600").await;
    app.insert(LINE, "MO-0005", "600", "650").await;
    let sent_before = app.notifier.sent().len();

    let outcome = app
        .state
        .services
        .completion
        .update_input_status(&production_user(), LINE, first, "completed")
        .await
        .unwrap();

    assert!(outcome.auto_reverted);
    assert_eq!(outcome.active_count, 1);
    assert_eq!(outcome.input.status, InputStatus::Active);
    assert!(!outcome.external_api_sent);
    assert_eq!(statuses(&app, "MO-0005").await, vec![InputStatus::Active; 2]);
    assert_eq!(app.notifier.sent().len(), sent_before);
}

#[tokio::test]
async fn reopening_a_completed_row_requires_admin_and_reopens_the_mo() {
    let app = TestApp::new().await;
    let first = app.insert(LINE, "MO-MIX", "100", "150").await;
    app.insert(LINE, "MO-MIX", "150", "200").await;
    let completion = &app.state.services.completion;
    completion
        .submit_mo_group(LINE, "MO-MIX", Some("S1"))
        .await
        .unwrap();

    let err = completion
        .update_input_status(&production_user(), LINE, first, "active")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));
    assert_eq!(statuses(&app, "MO-MIX").await, vec![InputStatus::Completed; 2]);

    let sent_before = app.notifier.sent().len();
    let outcome = completion
        .update_input_status(&admin_user(), LINE, first, "active")
        .await
        .unwrap();
    assert_eq!(outcome.input.status, InputStatus::Active);
    assert!(outcome.input.completed_at.is_none());
    assert_eq!(statuses(&app, "MO-MIX").await, vec![InputStatus::Active; 2]);
    assert_eq!(app.notifier.sent().len(), sent_before);
}

#[tokio::test]
async fn oversized_ranges_are_saved_and_summarised_without_overflow() {
    let app = TestApp::new().await;
    let max = u64::MAX.to_string();
    let outcome = app
        .state
        .services
        .completion
        .insert_input(LINE, new_input("S1", "MO-HUGE", &[("0", max.as_str()), ("0", max.as_str())]))
        .await
        .unwrap();
    assert_eq!(outcome.range_issues.len(), 2);

    let summary = app
        .state
        .services
        .reports
        .mo_summary("MO-HUGE", Some(LINE))
        .await
        .unwrap();
    assert_eq!(summary.total.gross_yield, u64::MAX);
    assert_eq!(summary.total.net_production, i64::MAX);
}

#[rstest]
#[case::zero_difference("1000", "1000")]
#[case::negative_difference("1050", "1000")]
#[case::exceeds_ceiling("1000", "8001")]
#[case::non_numeric("10A0", "1050")]
#[tokio::test]
async fn invalid_range_blocks_submission(#[case] first: &str, #[case] last: &str) {
    let app = TestApp::new().await;
    let outcome = app
        .state
        .services
        .completion
        .insert_input(LINE, new_input("S1", "MO-0006", &[(first, last)]))
        .await
        .unwrap();
    assert_eq!(outcome.range_issues.len(), 1);

    let err = app
        .state
        .services
        .completion
        .submit_mo_group(LINE, "MO-0006", None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
    assert_eq!(statuses(&app, "MO-0006").await, vec![InputStatus::Active]);
    assert_eq!(app.notifier.sent().len(), 1, "only the active POST");
}

#[tokio::test]
async fn span_at_ceiling_is_accepted() {
    let app = TestApp::new().await;
    app.insert(LINE, "MO-0007", "1000", "8000").await;
    let outcome = app
        .state
        .services
        .completion
        .submit_mo_group(LINE, "MO-0007", None)
        .await
        .unwrap();
    assert_eq!(outcome.updated_count, 1);
}

#[tokio::test]
async fn revert_requires_admin() {
    let app = TestApp::new().await;
    app.insert(LINE, "MO-0008", "1", "11").await;
    app.state
        .services
        .completion
        .submit_mo_group(LINE, "MO-0008", None)
        .await
        .unwrap();

    let err = app
        .state
        .services
        .completion
        .revert_mo_group(&production_user(), LINE, "MO-0008")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));
    assert_eq!(statuses(&app, "MO-0008").await, vec![InputStatus::Completed]);
}

#[tokio::test]
async fn completed_inputs_cannot_be_edited() {
    let app = TestApp::new().await;
    let id = app.insert(LINE, "MO-0009", "1", "5").await;
    let completion = &app.state.services.completion;

    let edited = completion
        .update_input_fields(
            LINE,
            id,
            UpdateProductionInput {
                pic: Some("Budi".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(edited.pic, "Budi");

    completion
        .submit_mo_group(LINE, "MO-0009", None)
        .await
        .unwrap();
    let err = completion
        .update_input_fields(
            LINE,
            id,
            UpdateProductionInput {
                pic: Some("Citra".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));

    let err = completion
        .update_input_fields(LINE, id, UpdateProductionInput::default())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn missing_external_url_is_a_warning_not_an_error() {
    let app = TestApp::with_external_url(None).await;
    let inserted = app
        .state
        .services
        .completion
        .insert_input(LINE, new_input("S1", "MO-0010", &[("1", "9")]))
        .await
        .unwrap();
    assert!(!inserted.external_api_sent);
    assert_eq!(inserted.warning.as_deref(), Some(WARN_NOT_CONFIGURED));

    let outcome = app
        .state
        .services
        .completion
        .submit_mo_group(LINE, "MO-0010", None)
        .await
        .unwrap();
    assert!(!outcome.external_api_sent);
    assert_eq!(outcome.warning.as_deref(), Some(WARN_NOT_CONFIGURED));
    assert!(app.notifier.sent().is_empty());
}

#[tokio::test]
async fn completed_put_targets_dashboard_record_id() {
    let app = TestApp::new().await;
    app.state
        .services
        .receiver
        .receive_active(ManufacturingRecord {
            manufacturing_id: Some("MO-0011".to_string()),
            sku: Some("MANGO-30ML".to_string()),
            sku_name: Some("Product MANGO-30ML".to_string()),
            target_qty: Some(10.0),
            leader_name: Some("Rina".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    let record_id = app
        .state
        .services
        .receiver
        .find("MO-0011", None)
        .await
        .unwrap()[0]
        .id;

    app.insert(LINE, "MO-0011", "1", "3").await;
    let outcome = app
        .state
        .services
        .completion
        .submit_mo_group(LINE, "MO-0011", None)
        .await
        .unwrap();

    assert_eq!(outcome.manufacturing_id, Some(record_id.to_string()));
    let put = app.notifier.sent().pop().unwrap();
    assert_eq!(
        put.url,
        format!("{}/manufacturing/{}", DASHBOARD_URL, record_id)
    );
    assert_eq!(put.payload.manufacturing_id, "MO-0011");
}

#[tokio::test]
async fn lines_are_isolated() {
    let app = TestApp::new().await;
    app.insert(ProductionLine::Device, "MO-0012", "1", "2").await;
    let err = app
        .state
        .services
        .completion
        .submit_mo_group(ProductionLine::Cartridge, "MO-0012", None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));
}
