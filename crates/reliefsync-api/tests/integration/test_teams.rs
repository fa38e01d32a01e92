//! Team endpoint

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use reliefsync_core::ports::IRemoteDataSource;

use crate::common::{self, incident};

#[tokio::test]
async fn test_fetch_teams() {
    let (server, remote) = common::setup_api_mock().await;

    Mock::given(method("GET"))
        .and(path("/teams"))
        .and(query_param("incident", "151"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 2,
            "results": [
                {
                    "id": 71,
                    "incident": 151,
                    "name": "Blue crew",
                    "color": "#0044ff",
                    "users": [3, 4],
                    "updated_at": "2024-06-01T00:00:00Z"
                },
                { "id": 72, "incident": 151, "name": "Chainsaws" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let teams = remote.fetch_teams(incident()).await.expect("teams failed");

    assert_eq!(teams.len(), 2);
    assert_eq!(teams[0].users, vec![3, 4]);
    assert!(teams[1].color.is_none());
    assert!(teams[1].users.is_empty());
}
