//! Behavioural tests for a single inspector connection.

use std::cell::RefCell;
use std::collections::BTreeMap;

use inspector_state::{Path, StateNode};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use serde_json::{Value, json};

use super::support::{self, ConnectionWorld};

#[fixture]
fn world() -> RefCell<ConnectionWorld> {
    support::world()
}

fn json(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|error| panic!("invalid JSON '{text}': {error}"))
}

fn path(text: &str) -> Path {
    Path::parse(text).unwrap_or_else(|error| panic!("invalid path '{text}': {error}"))
}

#[given("the state {document}")]
fn given_state(world: &RefCell<ConnectionWorld>, document: String) {
    world.borrow_mut().seed(json(&document));
}

#[given("a reset command at \"{target}\"")]
fn given_reset_command(world: &RefCell<ConnectionWorld>, target: String) {
    world.borrow().add_reset(&path(&target));
}

#[given("an increment command at \"{target}\"")]
fn given_increment_command(world: &RefCell<ConnectionWorld>, target: String) {
    world.borrow().add_increment(&path(&target));
}

#[given("auto-unsubscribe notices are enabled")]
fn given_announcements(world: &RefCell<ConnectionWorld>) {
    world.borrow_mut().announce_auto_unsubscribe();
}

#[when("the client sends {frame}")]
fn when_client_sends(world: &RefCell<ConnectionWorld>, frame: String) {
    world.borrow_mut().send(&frame);
}

#[when("the value at \"{target}\" becomes {value}")]
fn when_value_changes(world: &RefCell<ConnectionWorld>, target: String, value: String) {
    let node = StateNode::from_json(json(&value));
    let world = world.borrow();
    world
        .store
        .set(&path(&target), node)
        .unwrap_or_else(|error| panic!("failed to set '{target}': {error}"));
}

#[when("{count} increments of {amount} are sent to \"{target}\"")]
fn when_increments_sent(
    world: &RefCell<ConnectionWorld>,
    count: i64,
    amount: i64,
    target: String,
) {
    let mut world = world.borrow_mut();
    for id in 1..=count {
        let frame = json!({
            "command": "increment",
            "id": id,
            "path": target,
            "args": [amount],
        });
        world.send(&frame.to_string());
    }
}

#[when("the connection closes")]
fn when_connection_closes(world: &RefCell<ConnectionWorld>) {
    world.borrow_mut().close();
}

#[then("the next frame is {frame}")]
fn then_next_frame(world: &RefCell<ConnectionWorld>, frame: String) {
    let received = world.borrow_mut().next_frame();
    assert_eq!(received, json(&frame));
}

#[then("frame {index} is {frame}")]
fn then_frame_at(world: &RefCell<ConnectionWorld>, index: usize, frame: String) {
    let frames = world.borrow().frames_at_least(index);
    assert_eq!(frames.get(index - 1), Some(&json(&frame)), "frames: {frames:?}");
}

#[then("the client has received {count} frames")]
fn then_frame_count(world: &RefCell<ConnectionWorld>, count: usize) {
    let frames = world.borrow().settled_frames();
    assert_eq!(frames.len(), count, "frames: {frames:?}");
}

#[then("the store has {count} subscribers")]
fn then_subscriber_count(world: &RefCell<ConnectionWorld>, count: usize) {
    assert_eq!(world.borrow().store.subscriber_count(), count);
}

#[then("the value at \"{target}\" is {value}")]
fn then_value_is(world: &RefCell<ConnectionWorld>, target: String, value: String) {
    let stored = world
        .borrow()
        .store
        .get(&path(&target))
        .map(|node| node.to_json());
    assert_eq!(stored, Some(json(&value)));
}

#[then("every request id from {first} to {last} was answered once")]
fn then_every_id_answered(world: &RefCell<ConnectionWorld>, first: i64, last: i64) {
    let expected = usize::try_from(last - first + 1).expect("non-empty id range");
    let frames = world.borrow().frames_at_least(expected);
    let mut answers: BTreeMap<i64, usize> = BTreeMap::new();
    for frame in &frames {
        assert!(frame.get("result").is_some(), "unexpected frame {frame}");
        let id = frame["id"].as_i64().expect("integer id");
        *answers.entry(id).or_default() += 1;
    }
    let ids: Vec<i64> = answers.keys().copied().collect();
    assert_eq!(ids, (first..=last).collect::<Vec<_>>());
    assert!(answers.values().all(|count| *count == 1), "answers: {answers:?}");
}

#[then("the connection failed with a protocol error")]
fn then_protocol_error(world: &RefCell<ConnectionWorld>) {
    let world = world.borrow();
    let error = world.error().expect("connection should have failed");
    assert!(error.is_protocol(), "unexpected error: {error}");
    assert!(world.is_closed());
}

#[scenario(
    path = "tests/features/connection.feature",
    name = "Subscribing to a mapping sends its summary"
)]
fn mapping_summary(world: RefCell<ConnectionWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/connection.feature",
    name = "Changes that leave the summary untouched are not resent"
)]
fn unchanged_summaries_suppressed(world: RefCell<ConnectionWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/connection.feature",
    name = "Subscribing twice registers once"
)]
fn duplicate_subscribe(world: RefCell<ConnectionWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/connection.feature",
    name = "A node that becomes a scalar ends the subscription silently"
)]
fn scalar_auto_unsubscribe(world: RefCell<ConnectionWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/connection.feature",
    name = "Automatic unsubscribes can be announced"
)]
fn announced_auto_unsubscribe(world: RefCell<ConnectionWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/connection.feature",
    name = "A command returns its result with the request id"
)]
fn command_result(world: RefCell<ConnectionWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/connection.feature",
    name = "An unknown command is reported with the request id"
)]
fn unknown_command(world: RefCell<ConnectionWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/connection.feature",
    name = "Arguments that do not fit are rejected before running"
)]
fn argument_binding(world: RefCell<ConnectionWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/connection.feature",
    name = "Concurrent commands each get exactly one response"
)]
fn concurrent_commands(world: RefCell<ConnectionWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/connection.feature",
    name = "A malformed frame closes the connection"
)]
fn malformed_frame(world: RefCell<ConnectionWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/connection.feature",
    name = "Closing the connection releases every subscription"
)]
fn close_releases(world: RefCell<ConnectionWorld>) {
    drop(world);
}
