//! Integration tests for the review pipeline: parse, search, redact, visualize, donate

use consentview::components::TableContainer;
use consentview::config::Config;
use consentview::core::{RowId, Table, TableSource, Translatable, VisualizationData};
use consentview::services::{
    ConsentService, Payload, VisualizationService, VisualizationStatus, VisualizationWorker,
};
use pretty_assertions::assert_eq;
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;
use std::time::Instant;

fn facebook_source() -> TableSource {
    serde_json::from_value(json!({
        "id": "facebook_all_data",
        "title": {"en": "Facebook Activity Data", "nl": "Facebook Gegevens"},
        "data_frame": {
            "data_type": {"0": "facebook_comment", "1": "facebook_search", "2": "facebook_comment", "3": "facebook_search"},
            "Date": {"0": "2023-01-05 10:00:00", "1": "2023-01-06 11:30:00", "2": "not a date", "3": "2023-01-06 20:00:00"},
            "Text": {"0": "Leuke foto!", "1": "weer amsterdam", "2": "Gefeliciteerd", "3": "pizza amsterdam"}
        },
        "visualizations": [
            {"type": "bar", "group": {"column": "Date", "dateFormat": "day"}, "values": [{"column": "Date", "label": "Aantal"}]},
            {"type": "wordcloud", "text_column": "Text", "tokenize": true}
        ]
    }))
    .unwrap()
}

fn container() -> TableContainer {
    let table = Table::from_source(facebook_source()).unwrap();
    TableContainer::new(table, &Config::default())
}

#[test]
fn test_round_trip_without_redactions() {
    let frame = json!({
        "a": {"0": "x", "1": "y"},
        "b": {"0": "1", "1": "2"}
    });
    let table = Table::from_data_frame("t", Translatable::new(), &frame).unwrap();
    let payload = ConsentService::serialize(&[table]).unwrap();

    assert_eq!(
        payload[0],
        json!({"t": [{"a": "x", "b": "1"}, {"a": "y", "b": "2"}]})
    );
    assert_eq!(payload[1]["user_omissions"]["summary"], "Deleted 0 of 2 rows");
}

#[test]
fn test_search_then_delete_then_donate() {
    let mut container = container();
    let now = Instant::now();

    container.set_query("amsterdam", now);
    assert!(container.tick(now + Config::default().debounce()));
    let ids: Vec<&str> = container.visible_rows().iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "3"]);

    container.delete(vec![RowId::from("1")]);
    container.set_type_filter(Some("facebook_comment".into()));
    assert_eq!(container.visible_rows().len(), 0);

    let mut resolved = None;
    ConsentService::donate(&[container.table().clone()], |p| resolved = Some(p)).unwrap();
    let Some(Payload::PayloadJson { value }) = resolved else {
        panic!("expected a JSON payload");
    };
    let decoded: JsonValue = serde_json::from_str(&value).unwrap();
    let rows = decoded[0]["facebook_all_data"].as_array().unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|row| row["Text"] != "weer amsterdam"));
    assert_eq!(decoded[1]["user_omissions"]["summary"], "Deleted 1 of 4 rows");
}

#[test]
fn test_end_to_end_delete_and_undo() {
    let mut container = container();
    container.delete(vec![RowId::from("0")]);
    assert_eq!(container.table().body().len(), 3);
    assert_eq!(container.table().deleted_row_count(), 1);

    container.undo();
    assert_eq!(container.table().body(), container.table().original_body());
    assert_eq!(container.table().deleted_row_count(), 0);
}

#[tokio::test]
async fn test_worker_prepares_every_visualization() {
    let mut container = container();
    let (worker, mut responses) =
        VisualizationWorker::spawn(Arc::new(VisualizationService::default()));

    let requests = container.visualization_requests();
    assert_eq!(requests.len(), 2);
    for request in requests {
        assert!(worker.submit(request));
    }
    for _ in 0..2 {
        let response = responses.recv().await.unwrap();
        assert!(container.accept(response));
    }
    worker.shutdown().await;

    let Some(VisualizationStatus::Success(Some(VisualizationData::Chart(chart)))) = container.status(0) else {
        panic!("expected chart data, got {:?}", container.status(0));
    };
    let points: Vec<(&str, f64)> = chart
        .points
        .iter()
        .map(|p| (p.x.as_str(), p.values["Aantal"]))
        .collect();
    // The malformed date of row 2 is dropped
    assert_eq!(points, vec![("2023-01-05", 1.0), ("2023-01-06", 2.0)]);

    let Some(VisualizationStatus::Success(Some(VisualizationData::Text(text)))) = container.status(1) else {
        panic!("expected word cloud data, got {:?}", container.status(1));
    };
    assert_eq!(text.frequencies.get("amsterdam"), Some(&2.0));
}

#[tokio::test]
async fn test_all_malformed_dates_render_empty_chart() {
    let source: TableSource = serde_json::from_value(json!({
        "id": "t",
        "data_frame": {"Date": {"0": "gisteren"}},
        "visualizations": [
            {"type": "line", "group": {"column": "Date", "dateFormat": "auto"}, "values": [{"column": "Date"}]}
        ]
    }))
    .unwrap();
    let mut container = TableContainer::new(Table::from_source(source).unwrap(), &Config::default());
    let (worker, mut responses) =
        VisualizationWorker::spawn(Arc::new(VisualizationService::default()));

    for request in container.visualization_requests() {
        worker.submit(request);
    }
    let response = responses.recv().await.unwrap();
    assert!(container.accept(response));
    assert_eq!(container.status(0), Some(&VisualizationStatus::Success(None)));
    worker.shutdown().await;
}

#[tokio::test]
async fn test_superseded_request_result_is_ignored() {
    let mut container = container();
    let (worker, mut responses) =
        VisualizationWorker::spawn(Arc::new(VisualizationService::default()));

    let first = container.visualization_requests();
    container.set_type_filter(Some("facebook_search".into()));
    let second = container.visualization_requests();

    // The first batch was cancelled before submission and never answers
    for request in first.into_iter().chain(second) {
        worker.submit(request);
    }
    let mut accepted = 0;
    for _ in 0..2 {
        if container.accept(responses.recv().await.unwrap()) {
            accepted += 1;
        }
    }
    assert_eq!(accepted, 2);
    assert!(container.statuses().iter().all(|s| !s.is_loading()));
    worker.shutdown().await;
}
