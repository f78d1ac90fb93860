mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use authenticity_tracker::{
    errors::ServiceError,
    models::ProductionLine,
    services::mo_cache::{
        ErpManufacturingOrder, ManufacturingOrderSource, OdooClient, OdooError,
    },
};
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use common::TestApp;
use mockall::{mock, predicate::eq};
use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

mock! {
    pub Source {}

    #[async_trait]
    impl ManufacturingOrderSource for Source {
        async fn fetch_manufacturing_orders(
            &self,
            line: ProductionLine,
            since: NaiveDate,
        ) -> Result<Vec<ErpManufacturingOrder>, OdooError>;
    }
}

fn order(id: i64, name: &str, note: &str, quantity: f64) -> ErpManufacturingOrder {
    ErpManufacturingOrder {
        id,
        name: name.to_string(),
        product: Some(format!("SKU-{}", id)),
        quantity,
        uom: Some("Units".to_string()),
        note: Some(note.to_string()),
        create_date: None,
    }
}

#[tokio::test]
async fn refresh_continues_past_a_failing_line() {
    let app = TestApp::new().await;
    let mut source = MockSource::new();
    source
        .expect_fetch_manufacturing_orders()
        .with(eq(ProductionLine::Liquid), mockall::predicate::always())
        .times(1)
        .returning(|_, _| {
            Ok(vec![
                order(1, "MO/L/001", "liquid mango", 100.0),
                order(2, "MO/L/002", "liquid grape", 80.0),
            ])
        });
    source
        .expect_fetch_manufacturing_orders()
        .with(eq(ProductionLine::Device), mockall::predicate::always())
        .times(1)
        .returning(|_, _| Err(OdooError::Status(502)));
    source
        .expect_fetch_manufacturing_orders()
        .with(eq(ProductionLine::Cartridge), mockall::predicate::always())
        .times(1)
        .returning(|_, _| Ok(vec![order(3, "MO/C/001", "cartirdge 2ml", 40.0)]));

    let cache = &app.state.services.mo_cache;
    let report = cache.refresh_from(&source, Utc::now()).await.unwrap();

    assert!(!report.skipped);
    assert_eq!(report.total_updated, 3);
    assert_eq!(report.lines.len(), 3);
    let device = report.lines.iter().find(|l| l.line == "device").unwrap();
    assert_eq!(device.fetched, 0);
    assert_eq!(device.error.as_deref(), Some("ERP returned status 502"));

    assert_eq!(cache.lookup_quantity("MO/L/002").await.unwrap(), Some(80.0));
    let cartridge = cache
        .list_for_line(Some(ProductionLine::Cartridge))
        .await
        .unwrap();
    assert_eq!(cartridge.len(), 1);
    assert_eq!(cartridge[0].mo_number, "MO/C/001");
}

#[tokio::test]
async fn refresh_updates_existing_rows() {
    let app = TestApp::new().await;
    let cache = &app.state.services.mo_cache;
    let now = Utc::now();
    cache
        .upsert(&[order(1, "MO/L/001", "liquid", 100.0)], now)
        .await
        .unwrap();
    cache
        .upsert(&[order(1, "MO/L/001", "liquid", 150.0)], now)
        .await
        .unwrap();

    assert_eq!(cache.lookup_quantity("MO/L/001").await.unwrap(), Some(150.0));
    assert_eq!(cache.stats(now).await.unwrap().total, 1);
    assert_eq!(cache.lookup_quantity("MO/L/404").await.unwrap(), None);
}

#[tokio::test]
async fn search_matches_mo_or_sku_and_filters_by_line() {
    let app = TestApp::new().await;
    let cache = &app.state.services.mo_cache;
    cache
        .upsert(
            &[
                order(1, "MO/L/001", "liquid", 1.0),
                order(2, "MO/D/002", "device", 1.0),
            ],
            Utc::now(),
        )
        .await
        .unwrap();

    let all = cache.search("mo/", None).await.unwrap();
    assert_eq!(all.len(), 2);

    let by_sku = cache.search("sku-2", None).await.unwrap();
    assert_eq!(by_sku.len(), 1);
    assert_eq!(by_sku[0].mo_number, "MO/D/002");

    let liquid = cache
        .search("MO", Some(ProductionLine::Liquid))
        .await
        .unwrap();
    assert_eq!(liquid.len(), 1);

    let err = cache.search("  ", None).await.unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn cleanup_drops_rows_outside_retention() {
    let app = TestApp::new().await;
    let cache = &app.state.services.mo_cache;
    let now = Utc::now();
    let mut stale = order(1, "MO/OLD", "liquid", 1.0);
    stale.create_date = Some(now - ChronoDuration::days(10));
    let mut fresh = order(2, "MO/NEW", "liquid", 1.0);
    fresh.create_date = Some(now - ChronoDuration::days(1));
    cache.upsert(&[stale, fresh], now).await.unwrap();

    assert_eq!(cache.stats(now).await.unwrap().older_than_7_days, 1);
    assert_eq!(cache.cleanup(now).await.unwrap(), 1);
    assert!(cache.get("MO/OLD").await.unwrap().is_none());
    assert!(cache.get("MO/NEW").await.unwrap().is_some());
}

#[tokio::test]
async fn odoo_client_sends_session_cookie_and_parses_records() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/web/dataset/call_kw/mrp.production/search_read"))
        .and(header("cookie", "session_id=sess-123"))
        .and(body_partial_json(json!({
            "params": { "model": "mrp.production", "method": "search_read" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": null,
            "result": [{
                "id": 9,
                "name": "MO/0009",
                "product_id": [4, "Mango 30ml"],
                "product_qty": 300.0,
                "product_uom_id": [1, "Units"],
                "note": "liquid",
                "create_date": "2024-04-02 08:15:00"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = OdooClient::new(&server.uri(), "sess-123", Duration::from_secs(5), 50).unwrap();
    let since = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
    let orders = client
        .fetch_manufacturing_orders(ProductionLine::Liquid, since)
        .await
        .unwrap();

    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].name, "MO/0009");
    assert_eq!(orders[0].product.as_deref(), Some("Mango 30ml"));
    assert_eq!(orders[0].uom.as_deref(), Some("Units"));
    assert_eq!(orders[0].quantity, 300.0);
}

#[tokio::test]
async fn odoo_rpc_error_prefers_data_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "error": {
                "code": 100,
                "message": "Odoo Session Expired",
                "data": { "message": "Session expired" }
            }
        })))
        .mount(&server)
        .await;

    let client = OdooClient::new(&server.uri(), "stale", Duration::from_secs(5), 50).unwrap();
    let since = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
    let err = client
        .fetch_manufacturing_orders(ProductionLine::Device, since)
        .await
        .unwrap_err();
    assert_matches!(err, OdooError::Rpc(msg) if msg == "Session expired");
}

#[tokio::test]
async fn odoo_http_failure_is_reported_as_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = OdooClient::new(&server.uri(), "s", Duration::from_secs(5), 50).unwrap();
    let since = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
    let err = client
        .fetch_manufacturing_orders(ProductionLine::Cartridge, since)
        .await
        .unwrap_err();
    assert_matches!(err, OdooError::Status(503));
}

#[tokio::test]
async fn refresh_without_erp_session_is_skipped() {
    let app = TestApp::new().await;
    let report = app.state.services.mo_cache.refresh().await.unwrap();
    assert!(report.skipped);
    assert!(report.lines.is_empty());
}
