use cellflow::core::{CompilationEvent, EventOutcome, WorkerStatus};
use cellflow::{build_graph, App, CompiledCell, Config, Notebook, RunStatus};
use mockito::{Matcher, Server};
use std::collections::BTreeSet;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn test_config(dir: &TempDir) -> Config {
    Config {
        recent_workers_path: Some(dir.path().join("workers.json")),
        ..Config::default()
    }
}

fn compiled(id: &str, inputs: &[&str], outputs: &[&str]) -> CompiledCell {
    CompiledCell {
        cell_id: id.to_string(),
        func_id: format!("f_{}", id),
        inputs: inputs.iter().map(|s| s.to_string()).collect(),
        outputs: outputs.iter().map(|s| s.to_string()).collect(),
        variables: Vec::new(),
    }
}

#[tokio::test]
async fn test_worker_connects_and_becomes_default() {
    let mut server = Server::new_async().await;
    let _metadata = server
        .mock("GET", "/metadata")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"name": "alpha"}"#)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let mut app = App::new(test_config(&dir));
    app.add_worker(&server.url());

    let url = format!("{}/", server.url());
    assert_eq!(app.registry.connecting_urls(), vec![url.clone()]);

    app.connect_workers(&CancellationToken::new()).await;

    let state = app.registry.snapshot();
    assert!(state.workers.connecting.is_empty());
    assert_eq!(state.workers.connected[&url].name, "alpha");
    assert_eq!(state.default_worker, Some(url));
}

#[tokio::test]
async fn test_failed_worker_is_not_retried() {
    let mut server = Server::new_async().await;
    let metadata = server
        .mock("GET", "/metadata")
        .with_status(500)
        .expect(1)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let mut app = App::new(test_config(&dir));
    app.add_worker(&server.url());
    app.connect_workers(&CancellationToken::new()).await;
    app.add_worker(&server.url());
    app.connect_workers(&CancellationToken::new()).await;

    assert_eq!(app.registry.status(&server.url()), Some(WorkerStatus::Failed));
    assert!(app.registry.default_worker().is_none());
    metadata.assert_async().await;
}

#[test]
fn test_two_cell_dataflow() {
    let cells = vec![compiled("c1", &[], &["y"]), compiled("c2", &["y"], &[])];
    let (graph, variables) = build_graph(&cells);

    assert_eq!(
        graph.edges,
        BTreeSet::from([("c1".to_string(), "c2".to_string())])
    );
    assert_eq!(variables.len(), 1);
    assert_eq!(
        variables["y"].declared_by,
        BTreeSet::from(["c1".to_string()])
    );
    assert_eq!(variables["y"].used_by, BTreeSet::from(["c2".to_string()]));
}

#[tokio::test]
async fn test_unreachable_worker_run() {
    let dir = TempDir::new().unwrap();
    let mut app = App::new(test_config(&dir));
    let sources = std::collections::HashMap::from([("c1".to_string(), "y = 1".to_string())]);

    let job = app
        .run_cells(&["c1".to_string()], &sources, Some("http://127.0.0.1:1"))
        .await;

    assert!(job.is_none());
    assert!(!app.is_running());
    assert_eq!(app.dispatcher.session.last_run().unwrap().status, RunStatus::Failed);
    assert!(app.compiled.is_empty());
}

#[tokio::test]
async fn test_result_for_unknown_job_is_ignored() {
    let dir = TempDir::new().unwrap();
    let mut app = App::new(test_config(&dir));

    let outcome = app.dispatcher.process_event(CompilationEvent::Result {
        job_id: "no-such-job".into(),
        cells: vec![compiled("c1", &[], &["y"])],
    });

    assert_eq!(outcome, EventOutcome::Ignored);
    assert!(app.compiled.is_empty());
    assert_eq!(app.compiled.dataflow().graph.edge_count(), 0);
}

#[tokio::test]
async fn test_notebook_run_end_to_end() {
    let mut server = Server::new_async().await;
    let _metadata = server
        .mock("GET", "/metadata")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"name": "alpha"}"#)
        .create_async()
        .await;
    let _submit = server
        .mock("POST", "/compile/submit")
        .match_body(Matcher::Json(serde_json::json!({
            "cellIds": ["load", "plot"],
            "codes": ["df = read()", "show(df)"],
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"jobId": "j1"}"#)
        .create_async()
        .await;
    let body = "event: result\n\
        data: [{\"cellId\":\"load\",\"funcId\":\"f1\",\"inputs\":[],\"outputs\":[\"df\"],\"variables\":[{\"name\":\"df\",\"varType\":\"DataFrame\"}]},\
        {\"cellId\":\"plot\",\"funcId\":\"f2\",\"inputs\":[\"df\"],\"outputs\":[],\"variables\":[]}]\n\n";
    let _status = server
        .mock("GET", Matcher::Regex("^/compile/status".into()))
        .match_query(Matcher::UrlEncoded("jobId".into(), "j1".into()))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nb.yml");
    std::fs::write(
        &path,
        "cells:\n  - id: load\n    code: \"df = read()\"\n  - id: plot\n    code: \"show(df)\"\n",
    )
    .unwrap();
    let notebook = Notebook::from_file(&path).unwrap();

    let mut app = App::new(test_config(&dir));
    app.add_worker(&server.url());
    app.connect_workers(&CancellationToken::new()).await;

    let job = app.run_cells(&notebook.cell_ids(), &notebook, None).await;
    assert_eq!(job.as_deref(), Some("j1"));
    assert!(app.is_running());

    let outcomes = app.wait_for_runs().await;
    assert_eq!(outcomes.len(), 1);
    assert!(!app.is_running());

    let dataflow = app.compiled.dataflow();
    assert!(dataflow.graph.has_edge("load", "plot"));
    assert_eq!(dataflow.graph.node("load").unwrap().variables[0].var_type, "DataFrame");
    let expected = format!("{}/", server.url());
    assert_eq!(app.dispatcher.assignments.worker_for("plot"), Some(expected.as_str()));
}
