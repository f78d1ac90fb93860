mod common;

use assert_matches::assert_matches;
use authenticity_tracker::{
    errors::ServiceError,
    models::{InputStatus, ProductionLine},
    repositories::ProductionStore,
};
use chrono::{NaiveDate, Utc};
use common::TestApp;

async fn complete_at(app: &TestApp, line: ProductionLine, mo_number: &str, rfc3339: &str) {
    let at = chrono::DateTime::parse_from_rfc3339(rfc3339)
        .unwrap()
        .with_timezone(&Utc);
    ProductionStore::new(line)
        .mark_completed(&*app.state.db, mo_number, at)
        .await
        .unwrap();
}

#[tokio::test]
async fn fully_completed_mo_reports_completed() {
    let app = TestApp::new().await;
    app.insert(ProductionLine::Liquid, "MO-EXT-1", "10", "20").await;
    app.insert(ProductionLine::Cartridge, "MO-EXT-1", "30", "40").await;
    app.state
        .services
        .completion
        .submit_mo_group(ProductionLine::Liquid, "MO-EXT-1", None)
        .await
        .unwrap();
    app.state
        .services
        .completion
        .submit_mo_group(ProductionLine::Cartridge, "MO-EXT-1", None)
        .await
        .unwrap();

    let status = app
        .state
        .services
        .external
        .mo_status(Some("MO-EXT-1"), None)
        .await
        .unwrap();
    assert_eq!(status, InputStatus::Completed);
}

#[tokio::test]
async fn active_row_on_another_line_wins() {
    let app = TestApp::new().await;
    app.insert(ProductionLine::Liquid, "MO-EXT-2", "10", "20").await;
    app.state
        .services
        .completion
        .submit_mo_group(ProductionLine::Liquid, "MO-EXT-2", None)
        .await
        .unwrap();
    app.insert(ProductionLine::Device, "MO-EXT-2", "50", "60").await;

    let status = app
        .state
        .services
        .external
        .mo_status(Some("MO-EXT-2"), None)
        .await
        .unwrap();
    assert_eq!(status, InputStatus::Active);
}

#[tokio::test]
async fn completed_date_is_read_in_the_reporting_offset() {
    let app = TestApp::new().await;
    app.insert(ProductionLine::Device, "MO-EXT-3", "10", "20").await;
    // 20:00 UTC is already the next day at UTC+7.
    complete_at(&app, ProductionLine::Device, "MO-EXT-3", "2024-03-10T20:00:00Z").await;
    let external = &app.state.services.external;

    let next_day = NaiveDate::from_ymd_opt(2024, 3, 11).unwrap();
    assert_eq!(
        external.mo_status(Some("MO-EXT-3"), Some(next_day)).await.unwrap(),
        InputStatus::Completed
    );

    let utc_day = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
    let err = external
        .mo_status(Some("MO-EXT-3"), Some(utc_day))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(msg) if msg == "MO number not found");

    assert_eq!(
        external.mo_status(Some("MO-EXT-3"), None).await.unwrap(),
        InputStatus::Completed
    );
}

#[tokio::test]
async fn missing_mo_number_is_a_validation_error() {
    let app = TestApp::new().await;
    let err = app
        .state
        .services
        .external
        .mo_status(Some("  "), None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn completed_report_spans_lines_and_days_in_order() {
    let app = TestApp::new().await;
    app.insert(ProductionLine::Cartridge, "MO-R-1", "1", "5").await;
    app.insert(ProductionLine::Liquid, "MO-R-2", "1", "5").await;
    app.insert(ProductionLine::Device, "MO-R-3", "1", "5").await;
    complete_at(&app, ProductionLine::Cartridge, "MO-R-1", "2024-05-02T03:00:00Z").await;
    complete_at(&app, ProductionLine::Liquid, "MO-R-2", "2024-05-01T01:00:00Z").await;
    // Lands on 2024-05-04 at UTC+7, outside the range.
    complete_at(&app, ProductionLine::Device, "MO-R-3", "2024-05-03T18:00:00Z").await;

    let report = app
        .state
        .services
        .external
        .completed_between(
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 3).unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(report.total_records, 2);
    let mos: Vec<&str> = report.records.iter().map(|r| r.mo_number.as_str()).collect();
    assert_eq!(mos, vec!["MO-R-2", "MO-R-1"]);
    assert_eq!(report.records[1].production_type, ProductionLine::Cartridge);
}

#[tokio::test]
async fn completed_report_rejects_inverted_range() {
    let app = TestApp::new().await;
    let err = app
        .state
        .services
        .external
        .completed_between(
            NaiveDate::from_ymd_opt(2024, 5, 3).unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}
