//! Integration tests for execution queues via CLI.
//!
//! Covers queue creation on first add, dependency validation, the DAG view
//! with file-conflict batching, declared plans and queue lifecycle commands.

mod common;

use common::TestEnv;
use predicates::prelude::*;

#[test]
fn test_queue_show_without_queue() {
    let env = TestEnv::new();

    env.ccw()
        .arg("queue")
        .assert()
        .success()
        .stdout(predicate::str::contains("No active queue"));
}

#[test]
fn test_first_add_creates_active_queue() {
    let env = TestEnv::new();
    env.planned_issue("ISSUE-1", &["src/a.rs"]);

    let added = env.json(&["queue", "add", "ISSUE-1", "--executor", "gemini"]);
    assert_eq!(added["created_queue"], true);
    assert_eq!(added["item"]["item_id"], "S-1");
    assert_eq!(added["item"]["assigned_executor"], "gemini");
    assert_eq!(added["item"]["files_touched"], serde_json::json!(["src/a.rs"]));

    let queue_id = added["queue_id"].as_str().unwrap();
    let listed = env.json(&["queue", "list"]);
    assert_eq!(listed["active_queue_id"], queue_id);
    assert_eq!(listed["queues"][0]["total_items"], 1);

    let status = env.json(&["status", "ISSUE-1"]);
    assert_eq!(status["issue"]["status"], "queued");
    assert_eq!(status["queue_items"][0]["item_id"], "S-1");
}

#[test]
fn test_add_requires_bound_solution() {
    let env = TestEnv::new();
    env.ccw().args(["init", "ISSUE-1"]).assert().success();

    env.ccw()
        .args(["queue", "add", "ISSUE-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no bound solution"));

    // Nothing was created by the failed add
    env.ccw()
        .arg("queue")
        .assert()
        .success()
        .stdout(predicate::str::contains("No active queue"));
}

#[test]
fn test_add_rejects_duplicates_and_unknown_dependencies() {
    let env = TestEnv::new();
    env.planned_issue("ISSUE-1", &["src/a.rs"]);
    env.planned_issue("ISSUE-2", &["src/b.rs"]);
    env.enqueue("ISSUE-1", &[]);

    env.ccw()
        .args(["queue", "add", "ISSUE-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already in queue"));

    env.ccw()
        .args(["queue", "add", "ISSUE-2", "--depends-on", "S-9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("S-9"));

    env.ccw()
        .args(["queue", "add", "ISSUE-2", "--semantic-priority", "1.5"])
        .assert()
        .failure();
}

#[test]
fn test_dag_batches_split_file_conflicts() {
    let env = TestEnv::new();
    env.planned_issue("ISSUE-1", &["src/shared.rs"]);
    env.planned_issue("ISSUE-2", &["src/shared.rs"]);
    env.planned_issue("ISSUE-3", &["src/other.rs"]);
    let first = env.enqueue("ISSUE-1", &[]);
    let second = env.enqueue("ISSUE-2", &[]);
    let third = env.enqueue("ISSUE-3", &[]);

    let dag = env.json(&["queue", "dag"]);
    assert_eq!(dag["_summary"]["total"], 3);
    assert_eq!(dag["_summary"]["ready"], 3);
    assert_eq!(dag["_summary"]["batches_needed"], 2);
    assert_eq!(
        dag["parallel_batches"],
        serde_json::json!([[first, third], [second]])
    );
}

#[test]
fn test_dag_reports_blocked_items() {
    let env = TestEnv::new();
    env.planned_issue("ISSUE-1", &["src/a.rs"]);
    env.planned_issue("ISSUE-2", &["src/b.rs"]);
    let first = env.enqueue("ISSUE-1", &[]);
    let second = env.enqueue("ISSUE-2", &["--depends-on", &first]);

    let dag = env.json(&["queue", "dag"]);
    let nodes = dag["nodes"].as_array().unwrap();
    let blocked = nodes.iter().find(|n| n["id"] == second.as_str()).unwrap();
    assert_eq!(blocked["ready"], false);
    assert_eq!(blocked["blocked_by"], serde_json::json!([first]));
    assert_eq!(
        dag["edges"],
        serde_json::json!([{ "from": first, "to": second }])
    );
    assert_eq!(dag["parallel_batches"], serde_json::json!([[first]]));
}

#[test]
fn test_plan_declares_groups() {
    let env = TestEnv::new();
    env.planned_issue("ISSUE-1", &["src/a.rs"]);
    env.planned_issue("ISSUE-2", &["src/b.rs"]);
    let first = env.enqueue("ISSUE-1", &[]);
    let second = env.enqueue("ISSUE-2", &[]);

    let plan = env.write_json(
        "plan.json",
        &serde_json::json!({
            "execution_groups": [
                { "id": "G1", "type": "sequential", "solutions": [second, first] }
            ]
        }),
    );
    let planned = env.json(&["queue", "plan", "--file", plan.to_str().unwrap()]);
    assert_eq!(planned["execution_groups"][0]["id"], "G1");

    let dag = env.json(&["queue", "dag"]);
    assert_eq!(
        dag["parallel_batches"],
        serde_json::json!([[second], [first]])
    );

    let unknown = env.write_json(
        "bad-plan.json",
        &serde_json::json!({
            "execution_groups": [{ "id": "G2", "type": "parallel", "solutions": ["S-42"] }]
        }),
    );
    env.ccw()
        .args(["queue", "plan", "--file", unknown.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("S-42"));
}

#[test]
fn test_archive_switch_and_delete() {
    let env = TestEnv::new();
    env.planned_issue("ISSUE-1", &["src/a.rs"]);
    let first = env.json(&["queue", "add", "ISSUE-1"]);
    let first_queue = first["queue_id"].as_str().unwrap().to_string();

    let archived = env.json(&["queue", "archive"]);
    assert_eq!(archived["queue_id"], first_queue.as_str());
    assert_eq!(archived["was_active"], true);
    assert!(env.json(&["queue"])["queue"].is_null());

    // Adding again starts a new queue
    env.planned_issue("ISSUE-2", &["src/b.rs"]);
    let second = env.json(&["queue", "add", "ISSUE-2"]);
    assert_eq!(second["created_queue"], true);
    let second_queue = second["queue_id"].as_str().unwrap().to_string();
    assert_ne!(first_queue, second_queue);

    let history = env.json(&["queue", "history"]);
    assert_eq!(history["queues"].as_array().unwrap().len(), 2);

    let switched = env.json(&["queue", "switch", &first_queue]);
    assert_eq!(switched["active_queue_id"], first_queue.as_str());
    assert_eq!(switched["previous_queue_id"], second_queue.as_str());

    let deleted = env.json(&["queue", "delete", &second_queue]);
    assert_eq!(deleted["was_active"], false);
    assert_eq!(env.json(&["queue", "list"])["queues"].as_array().unwrap().len(), 1);

    env.ccw()
        .args(["queue", "switch", "QUE-missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not found"));
}
