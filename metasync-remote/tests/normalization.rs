//! One-or-many normalization of remote list fields.

use rstest::rstest;
use serde_json::{json, Value};

use metasync_remote::{AsyncRequestStatus, DeployResult};

fn deploy_with_failures(failures: Option<Value>) -> Value {
    let mut details = serde_json::Map::new();
    if let Some(f) = failures {
        details.insert("componentFailures".into(), f);
    }
    json!({
        "id": "0Af000000000001",
        "deployResult": {
            "done": true,
            "success": false,
            "status": "Failed",
            "details": Value::Object(details),
        }
    })
}

fn failure(name: &str) -> Value {
    json!({"componentType": "ApexClass", "fullName": name, "problem": "boom", "success": false})
}

#[rstest]
#[case::missing(None, 0)]
#[case::null(Some(Value::Null), 0)]
#[case::single_object(Some(failure("Foo")), 1)]
#[case::empty_list(Some(json!([])), 0)]
#[case::list(Some(json!([failure("Foo"), failure("Bar")])), 2)]
fn component_failures_are_always_a_list(#[case] failures: Option<Value>, #[case] expected: usize) {
    let result = DeployResult::from_json(&deploy_with_failures(failures)).unwrap();
    assert_eq!(result.component_failures.len(), expected);
    assert_eq!(result.id.0, "0Af000000000001");
}

#[test]
fn single_failure_keeps_its_fields() {
    let result = DeployResult::from_json(&deploy_with_failures(Some(failure("Foo")))).unwrap();
    let only = &result.component_failures[0];
    assert_eq!(only.full_name, "Foo");
    assert_eq!(only.component_type.as_deref(), Some("ApexClass"));
    assert_eq!(only.problem.as_deref(), Some("boom"));
}

#[rstest]
#[case::queued("Queued", false)]
#[case::completed("Completed", true)]
#[case::failed("Failed", true)]
#[case::error("Error", true)]
#[case::aborted("Aborted", true)]
#[case::invalidated("Invalidated", true)]
fn async_request_terminal_states(#[case] state: &str, #[case] terminal: bool) {
    let status = AsyncRequestStatus::from_json(&json!({"Id": "1dr1", "State": state})).unwrap();
    assert_eq!(status.state.is_terminal(), terminal);
    assert!(status.component_failures.is_empty());
}

#[test]
fn unknown_async_state_is_an_error() {
    assert!(AsyncRequestStatus::from_json(&json!({"Id": "1dr1", "State": "Exploded"})).is_err());
}
