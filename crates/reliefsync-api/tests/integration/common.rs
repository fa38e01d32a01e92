//! Shared test helpers for API integration tests

use serde_json::{json, Value};
use wiremock::MockServer;

use reliefsync_api::HttpRemoteDataSource;
use reliefsync_core::domain::IncidentId;

pub const TOKEN: &str = "test-token";

pub fn incident() -> IncidentId {
    IncidentId::new(151).expect("valid incident id")
}

/// Starts a mock server and a data source pointing at it
pub async fn setup_api_mock() -> (MockServer, HttpRemoteDataSource) {
    let server = MockServer::start().await;
    let remote = HttpRemoteDataSource::new(server.uri(), Some(TOKEN.to_string()));
    (server, remote)
}

/// A full-shape worksite as the server sends it
pub fn worksite_json(id: i64) -> Value {
    json!({
        "id": id,
        "incident": 151,
        "address": format!("{id} Bayou Rd"),
        "case_number": format!("W{id}"),
        "city": "New Orleans",
        "county": "Orleans",
        "created_at": "2024-05-30T08:00:00Z",
        "email": null,
        "key_work_type": "muck_out",
        "latitude": 29.95,
        "longitude": -90.07,
        "name": "Resident",
        "phone1": "555-0100",
        "postal_code": "70119",
        "state": "LA",
        "svi": 0.4,
        "updated_at": "2024-06-01T12:00:00.250Z",
        "what3words": null,
        "work_types": [{
            "id": id * 10,
            "created_at": null,
            "claimed_by": 7,
            "next_recur_at": null,
            "phase": 4,
            "recur": null,
            "status": "open_assigned",
            "work_type": "muck_out"
        }],
        "flags": [],
        "notes": [{
            "id": id * 100,
            "created_at": null,
            "is_survivor": false,
            "note": "Water line at 3ft"
        }],
        "form_data": [{ "field_key": "habitable_y", "field_value": true }]
    })
}

pub fn list_body(results: Vec<Value>) -> Value {
    json!({ "count": results.len(), "results": results })
}
