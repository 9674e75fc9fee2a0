//! HttpFetcher against a local one-shot HTTP server.
//!
//! Each test binds 127.0.0.1:0, answers a single request with a canned
//! response, and checks how the fetcher classifies it.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use brownclaw_ingest::ingest::fetch::{FetchConfig, FetchOutcome, Fetcher, HttpFetcher, TransportCause};
use brownclaw_ingest::ingest::normalize::ShapeTag;
use brownclaw_ingest::inventory::{InventoryError, InventorySource, load_inventory};
use brownclaw_ingest::sources::SourceDescriptor;

const FEATURES: &str = r#"{"type":"FeatureCollection","features":[{"properties":{"STATION_NUMBER":"05BH004","DISCHARGE":67.7}}]}"#;

fn response(status_line: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_line,
        content_type,
        body.len(),
        body
    )
}

/// Serves one request, returning the base URL and a receiver for the raw request text.
fn serve_once(reply: String, delay: Duration) -> (String, mpsc::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let Ok((mut stream, _)) = listener.accept() else {
            return;
        };
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }
        let _ = tx.send(String::from_utf8_lossy(&request).into_owned());
        thread::sleep(delay);
        let _ = stream.write_all(reply.as_bytes());
    });

    (base, rx)
}

fn descriptor(base: &str, shape: ShapeTag) -> SourceDescriptor {
    SourceDescriptor {
        name: "local".to_string(),
        url_template: format!("{}/items?STATION_NUMBER={{station_id}}&f=json", base),
        shape,
        priority: 1,
    }
}

fn fetcher(timeout: Duration) -> HttpFetcher {
    HttpFetcher::new(FetchConfig {
        timeout,
        user_agent: "brownclaw-ingest-test".to_string(),
    })
    .unwrap()
}

#[test]
fn test_ok_feature_collection_is_success() {
    let (base, requests) = serve_once(
        response("200 OK", "application/geo+json", FEATURES),
        Duration::ZERO,
    );

    let outcome = fetcher(Duration::from_secs(5))
        .fetch(&descriptor(&base, ShapeTag::JsonFeatureCollection), "05BH004");

    match outcome {
        FetchOutcome::Success { body, content_type } => {
            assert_eq!(body, FEATURES.as_bytes());
            assert_eq!(content_type.as_deref(), Some("application/geo+json"));
        }
        other => panic!("expected success, got {:?}", other),
    }

    let request = requests.recv_timeout(Duration::from_secs(5)).unwrap().to_ascii_lowercase();
    assert!(request.starts_with("get /items?station_number=05bh004&f=json "));
    assert!(request.contains("accept: application/geo+json"));
    assert!(request.contains("user-agent: brownclaw-ingest-test"));
}

#[test]
fn test_unprocessable_entity_is_rejected() {
    let (base, _requests) = serve_once(
        response("422 Unprocessable Entity", "text/plain", "Unprocessable Entity"),
        Duration::ZERO,
    );
    let outcome = fetcher(Duration::from_secs(5)).fetch(&descriptor(&base, ShapeTag::CsvLegacy), "05BH004");
    assert_eq!(outcome, FetchOutcome::Rejected(422));
}

#[test]
fn test_404_is_not_found() {
    let (base, _requests) = serve_once(
        response("404 Not Found", "text/plain", "no such station"),
        Duration::ZERO,
    );
    let outcome = fetcher(Duration::from_secs(5))
        .fetch(&descriptor(&base, ShapeTag::JsonFeatureCollection), "99ZZ999");
    assert_eq!(outcome, FetchOutcome::NotFound);
}

#[test]
fn test_empty_feature_list_is_not_found() {
    let (base, _requests) = serve_once(
        response("200 OK", "application/json", r#"{"type":"FeatureCollection","features":[]}"#),
        Duration::ZERO,
    );
    let outcome = fetcher(Duration::from_secs(5))
        .fetch(&descriptor(&base, ShapeTag::JsonFeatureCollection), "99ZZ999");
    assert_eq!(outcome, FetchOutcome::NotFound);
}

#[test]
fn test_slow_server_times_out() {
    let (base, _requests) = serve_once(
        response("200 OK", "application/json", FEATURES),
        Duration::from_secs(3),
    );
    let outcome = fetcher(Duration::from_millis(300))
        .fetch(&descriptor(&base, ShapeTag::JsonFeatureCollection), "05BH004");
    assert_eq!(outcome, FetchOutcome::TransportError(TransportCause::Timeout));
}

#[test]
fn test_refused_connection_is_a_transport_error() {
    let base = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        format!("http://{}", listener.local_addr().unwrap())
    };
    let outcome = fetcher(Duration::from_secs(5))
        .fetch(&descriptor(&base, ShapeTag::JsonFeatureCollection), "05BH004");
    assert!(
        matches!(outcome, FetchOutcome::TransportError(TransportCause::Connect(_))),
        "expected connect error, got {:?}",
        outcome
    );
}

fn inventory_source(base: &str) -> InventorySource {
    InventorySource {
        name: "local-list".to_string(),
        url: format!("{}/hydrometric/doc/hydrometric_StationList.csv", base),
    }
}

#[test]
fn test_station_inventory_is_downloaded_and_parsed() {
    let list = "ID,Name / Nom,Latitude,Longitude,Prov/Terr,Timezone / Fuseau horaire\n\
                05BH004,\"BOW RIVER AT CALGARY\",51.05,-114.05,AB,UTC-07:00\n\
                05BH004,\"BOW RIVER AT CALGARY\",51.05,-114.05,AB,UTC-07:00\n\
                05BJ004,\"ELBOW RIVER AT CALGARY\",51.04,-114.07,AB,UTC-07:00\n";
    let (base, requests) = serve_once(response("200 OK", "text/csv", list), Duration::ZERO);

    let entries = load_inventory(&fetcher(Duration::from_secs(5)), &inventory_source(&base)).unwrap();
    let ids: Vec<&str> = entries.iter().map(|e| e.station_id.as_str()).collect();
    assert_eq!(ids, vec!["05BH004", "05BJ004"]);

    let request = requests.recv_timeout(Duration::from_secs(5)).unwrap().to_ascii_lowercase();
    assert!(request.starts_with("get /hydrometric/doc/hydrometric_stationlist.csv "));
    assert!(request.contains("accept: text/csv"));
}

#[test]
fn test_station_inventory_error_status() {
    let (base, _requests) = serve_once(
        response("503 Service Unavailable", "text/plain", "down"),
        Duration::ZERO,
    );
    let result = load_inventory(&fetcher(Duration::from_secs(5)), &inventory_source(&base));
    assert!(matches!(result, Err(InventoryError::Status(503))), "got {:?}", result);
}
