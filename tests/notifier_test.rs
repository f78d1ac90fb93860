use std::{sync::Arc, time::Duration};

use assert_matches::assert_matches;
use authenticity_tracker::{
    circuit_breaker::{CircuitBreaker, CircuitState},
    services::notifier::{
        publish_mo_list, DeliveryMethod, HttpStatusNotifier, ManufacturingPayload, MoListItem,
        Notification, NotifierError,
    },
};
use serde_json::json;
use wiremock::{
    matchers::{body_json, body_partial_json, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn notifier(threshold: u32) -> HttpStatusNotifier {
    let breaker = Arc::new(CircuitBreaker::new(threshold, Duration::from_secs(300), 1));
    HttpStatusNotifier::new(Duration::from_secs(5), breaker).unwrap()
}

fn payload(done_qty: Option<u64>) -> ManufacturingPayload {
    ManufacturingPayload::new("MO-0001", "MANGO-30ML", 120.0, done_qty, "Rina", None, 7)
}

#[tokio::test]
async fn active_notification_is_posted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/manufacturing"))
        .and(body_json(json!({
            "manufacturing_id": "MO-0001",
            "sku": "MANGO-30ML",
            "sku_name": "Product MANGO-30ML",
            "target_qty": 120.0,
            "done_qty": null,
            "leader_name": "Rina",
            "finished_at": null
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = notifier(5)
        .deliver(&Notification {
            method: DeliveryMethod::Post,
            url: format!("{}/api/manufacturing", server.uri()),
            payload: payload(None),
        })
        .await
        .unwrap();
    assert_eq!(outcome.status, 201);
}

#[tokio::test]
async fn completed_notification_is_put() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/manufacturing/17"))
        .and(body_partial_json(json!({ "done_qty": 50 })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    notifier(5)
        .deliver(&Notification {
            method: DeliveryMethod::Put,
            url: format!("{}/api/manufacturing/17", server.uri()),
            payload: payload(Some(50)),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn non_success_status_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(405).set_body_string("Method Not Allowed"))
        .mount(&server)
        .await;

    let notifier = notifier(5);
    let err = notifier
        .deliver(&Notification {
            method: DeliveryMethod::Put,
            url: format!("{}/api/manufacturing/1", server.uri()),
            payload: payload(Some(1)),
        })
        .await
        .unwrap_err();
    assert_matches!(err, NotifierError::Status { status: 405, .. });

    let metrics = notifier.breaker().metrics();
    assert_eq!(metrics.method_not_allowed_errors, 1);
    assert_eq!(metrics.total_failures, 1);
}

#[tokio::test]
async fn breaker_opens_and_short_circuits() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let notifier = notifier(2);
    let notification = Notification {
        method: DeliveryMethod::Post,
        url: format!("{}/api/manufacturing", server.uri()),
        payload: payload(None),
    };
    for _ in 0..2 {
        assert_matches!(
            notifier.deliver(&notification).await,
            Err(NotifierError::Status { status: 500, .. })
        );
    }
    assert_eq!(notifier.breaker().state(), CircuitState::Open);
    assert_matches!(
        notifier.deliver(&notification).await,
        Err(NotifierError::CircuitOpen)
    );

    notifier.breaker().reset();
    assert_eq!(notifier.breaker().state(), CircuitState::Closed);
}

#[tokio::test]
async fn mo_list_is_posted_as_one_document() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api"))
        .and(body_json(json!({
            "mo_list": [{
                "mo_number": "MO-0001",
                "sku_name": "MANGO-30ML",
                "quantity": 120.0,
                "uom": "Units",
                "note": "liquid"
            }]
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let items = vec![MoListItem {
        mo_number: "MO-0001".to_string(),
        sku_name: "MANGO-30ML".to_string(),
        quantity: 120.0,
        uom: Some("Units".to_string()),
        note: Some("liquid".to_string()),
    }];
    publish_mo_list(&notifier(5), &format!("{}/api", server.uri()), &items)
        .await
        .unwrap();
}
