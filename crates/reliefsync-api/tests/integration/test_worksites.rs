//! Worksite, count and secondary-data endpoints

use chrono::{TimeZone, Utc};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, ResponseTemplate};

use reliefsync_core::domain::{BoundingBox, NetworkId};
use reliefsync_core::ports::{IRemoteDataSource, RecordShape};

use crate::common::{self, incident, list_body, worksite_json};

#[tokio::test]
async fn test_count_sends_incident_and_token() {
    let (server, remote) = common::setup_api_mock().await;

    Mock::given(method("GET"))
        .and(path("/worksites/count"))
        .and(query_param("incident", "151"))
        .and(query_param_is_missing("updated_at__gt"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "count": 1234 })))
        .expect(1)
        .mount(&server)
        .await;

    let count = remote
        .count_worksites(incident(), None)
        .await
        .expect("count failed");
    assert_eq!(count, 1234);
}

#[tokio::test]
async fn test_delta_count_filters_by_update_time() {
    let (server, remote) = common::setup_api_mock().await;
    let since = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

    Mock::given(method("GET"))
        .and(path("/worksites/count"))
        .and(query_param("updated_at__gt", "2024-06-01T12:00:00.000Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "count": 3 })))
        .expect(1)
        .mount(&server)
        .await;

    let count = remote
        .count_worksites(incident(), Some(since))
        .await
        .expect("count failed");
    assert_eq!(count, 3);
}

#[tokio::test]
async fn test_page_requests_offset_and_shape() {
    let (server, remote) = common::setup_api_mock().await;

    Mock::given(method("GET"))
        .and(path("/worksites"))
        .and(query_param("incident", "151"))
        .and(query_param("limit", "40"))
        .and(query_param("offset", "80"))
        .and(query_param("sort", "id"))
        .and(query_param("fields", "short"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(list_body(vec![worksite_json(81), worksite_json(82)])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let page = remote
        .fetch_worksites_page(incident(), RecordShape::Short, 40, 2, None)
        .await
        .expect("page failed");

    assert_eq!(page.len(), 2);
    assert_eq!(page[0].id, 81);
    assert_eq!(page[1].address, "82 Bayou Rd");
}

#[tokio::test]
async fn test_full_page_decodes_nested_records() {
    let (server, remote) = common::setup_api_mock().await;

    Mock::given(method("GET"))
        .and(path("/worksites"))
        .and(query_param("fields", "full"))
        .respond_with(ResponseTemplate::new(200).set_body_json(list_body(vec![worksite_json(5)])))
        .mount(&server)
        .await;

    let page = remote
        .fetch_worksites_page(incident(), RecordShape::Full, 40, 0, None)
        .await
        .expect("page failed");

    let worksite = page[0].to_worksite().expect("valid worksite");
    assert_eq!(worksite.network_id.get(), 5);
    assert_eq!(worksite.work_types.len(), 1);
    assert_eq!(worksite.notes.len(), 1);
    assert_eq!(worksite.form_data.len(), 1);
    assert_eq!(
        page[0].updated_at.timestamp_millis(),
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0)
            .unwrap()
            .timestamp_millis()
            + 250
    );
}

#[tokio::test]
async fn test_bounds_requests_use_bbox() {
    let (server, remote) = common::setup_api_mock().await;
    let bounds = BoundingBox {
        south: 29.5,
        north: 30.5,
        west: -90.5,
        east: -89.5,
    };

    Mock::given(method("GET"))
        .and(path("/worksites/count"))
        .and(query_param("bbox", "-90.5,29.5,-89.5,30.5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "count": 1 })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/worksites"))
        .and(query_param("bbox", "-90.5,29.5,-89.5,30.5"))
        .and(query_param("fields", "full"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(list_body(vec![worksite_json(9)])))
        .expect(1)
        .mount(&server)
        .await;

    let count = remote
        .count_worksites_in_bounds(incident(), &bounds)
        .await
        .expect("count failed");
    let page = remote
        .fetch_worksites_in_bounds(incident(), &bounds, 40, 0)
        .await
        .expect("page failed");

    assert_eq!(count, 1);
    assert_eq!(page.len(), 1);
}

#[tokio::test]
async fn test_fetch_by_ids() {
    let (server, remote) = common::setup_api_mock().await;

    Mock::given(method("GET"))
        .and(path("/worksites"))
        .and(query_param("id__in", "3,8"))
        .and(query_param("fields", "full"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(list_body(vec![worksite_json(3), worksite_json(8)])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let ids = [NetworkId::new(3).unwrap(), NetworkId::new(8).unwrap()];
    let records = remote
        .fetch_worksites_by_ids(&ids)
        .await
        .expect("fetch failed");
    assert_eq!(records.len(), 2);
}

#[tokio::test]
async fn test_fetch_by_no_ids_skips_request() {
    let (server, remote) = common::setup_api_mock().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let records = remote
        .fetch_worksites_by_ids(&[])
        .await
        .expect("fetch failed");
    assert!(records.is_empty());
}

#[tokio::test]
async fn test_flags_form_data_page() {
    let (server, remote) = common::setup_api_mock().await;
    let since = Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap();

    Mock::given(method("GET"))
        .and(path("/worksites_data_flags"))
        .and(query_param("incident", "151"))
        .and(query_param("limit", "300"))
        .and(query_param("offset", "300"))
        .and(query_param("updated_at__gt", "2024-06-02T00:00:00.000Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 1,
            "results": [{
                "id": 44,
                "updated_at": "2024-06-03T10:00:00Z",
                "flags": [{
                    "id": 901,
                    "created_at": null,
                    "is_high_priority": true,
                    "notes": null,
                    "reason_t": "flag.worksite_high_priority",
                    "requested_action": null
                }],
                "form_data": [{ "field_key": "tarps_needed", "field_value": "2" }]
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let page = remote
        .fetch_flags_form_data_page(incident(), 300, 1, Some(since))
        .await
        .expect("page failed");

    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, 44);
    assert!(page[0].flags[0].is_high_priority);
    assert_eq!(page[0].form_data[0].field_key, "tarps_needed");
}
