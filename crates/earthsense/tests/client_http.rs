//! EarthsenseClient against a local stand-in for the vendor API.

use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde_json::Value;
use test_utils::fixtures;
use zephyr_common::{ErrorKind, FetchWindow, Granularity};

use earthsense::{EarthsenseClient, EarthsenseConfig, VendorApi};

#[derive(Clone, Default)]
struct Recorded {
    paths: Arc<Mutex<Vec<String>>>,
}

async fn roster(
    State(recorded): State<Recorded>,
    Path((user, key)): Path<(String, String)>,
) -> Result<Json<Value>, StatusCode> {
    recorded.paths.lock().unwrap().push(format!("roster/{}/{}", user, key));
    if key == "secret" {
        Ok(Json(fixtures::roster_response()))
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

async fn data(State(recorded): State<Recorded>, Path(rest): Path<String>) -> Json<Value> {
    recorded.paths.lock().unwrap().push(rest.clone());
    if rest.contains("/15min/") {
        Json(fixtures::fifteen_minute_response())
    } else {
        Json(fixtures::raw_data_response())
    }
}

async fn serve() -> (String, Recorded) {
    let recorded = Recorded::default();
    let app = Router::new()
        .route("/zephyrsForUser/:user/:key", get(roster))
        .route("/dataForViewBySlots/*rest", get(data))
        .with_state(recorded.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), recorded)
}

fn client(base_url: &str, key: &str) -> EarthsenseClient {
    let mut config = EarthsenseConfig::new("user", key);
    config.base_url = base_url.to_string();
    EarthsenseClient::new(config).unwrap()
}

fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

#[tokio::test]
async fn test_list_sensors() {
    let (base_url, recorded) = serve().await;

    let entries = client(&base_url, "secret").list_sensors().await.unwrap();

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].id, 469);
    assert_eq!(recorded.paths.lock().unwrap().as_slice(), ["roster/user/secret"]);
}

#[tokio::test]
async fn test_list_sensors_error_status_is_roster_failure() {
    let (base_url, _) = serve().await;

    let err = client(&base_url, "wrong").list_sensors().await.unwrap_err();

    assert!(err.is(ErrorKind::RosterFailure));
    assert!(err.message.contains("401"));
    assert!(!err.message.contains("wrong"));
}

#[tokio::test]
async fn test_fetch_requests_window_and_averaging() {
    let (base_url, recorded) = serve().await;
    let window = FetchWindow::new(ts("2020-08-27T10:00:00Z"), ts("2020-08-27T13:05:00Z"));

    let body = client(&base_url, "secret")
        .fetch(469, &window, Granularity::FifteenMinute)
        .await
        .unwrap();

    assert!(body.get("15 min average on the quarter hours").is_some());
    assert_eq!(
        recorded.paths.lock().unwrap().as_slice(),
        ["user/secret/469/20200827100000/20200827130500/AB/15min/JSON/api"]
    );
}

#[tokio::test]
async fn test_fetch_unreachable_is_vendor_failure() {
    let window = FetchWindow::new(ts("2020-08-27T10:00:00Z"), ts("2020-08-27T11:00:00Z"));

    let err = client("http://127.0.0.1:9", "secret")
        .fetch(469, &window, Granularity::Raw)
        .await
        .unwrap_err();

    assert!(err.is(ErrorKind::VendorFetchFailure));
    assert!(!err.message.contains("secret"));
}
