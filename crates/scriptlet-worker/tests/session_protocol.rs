//! Protocol scenarios against a real loopback socket.

mod common;

use common::{
    read_json, start_worker, write_channel_file, FINALIZE_FAILED, SCRIPT_FAILED, SHUTDOWN,
    SUCCESS, TOKEN,
};
use scriptlet_worker::StopReason;

#[test]
fn doubles_input_and_stops_on_order() {
    let dir = tempfile::tempdir().unwrap();
    write_channel_file(dir.path(), "pythonInput.rced", r#"{"x": 2.0}"#);
    write_channel_file(dir.path(), "outputs.rceo", r#"["y"]"#);

    let (mut host, worker) = start_worker(dir.path());
    assert_eq!(host.authenticate(true), TOKEN);
    let status = host.execute(r#"channel.write_output("y", 2 * channel.read_input("x"))"#);
    assert_eq!(status, SUCCESS);

    host.send("stopInstance");
    assert_eq!(host.recv().as_deref(), Some(SHUTDOWN));
    assert_eq!(host.recv(), None);
    assert_eq!(worker.join().unwrap(), StopReason::StopOrder);

    assert_eq!(
        read_json(dir.path(), "pythonOutput.rced"),
        serde_json::json!({"y": [4.0]})
    );
}

#[test]
fn failing_script_keeps_worker_serving() {
    let dir = tempfile::tempdir().unwrap();
    write_channel_file(dir.path(), "outputs.rceo", r#"["y"]"#);

    let (mut host, worker) = start_worker(dir.path());
    host.authenticate(true);
    assert_eq!(host.execute(r#"channel.fail("bad data")"#), SCRIPT_FAILED);
    assert_eq!(host.execute("this is not lua"), SCRIPT_FAILED);
    assert_eq!(host.execute(r#"channel.write_output("y", 1)"#), SUCCESS);

    host.send("stopInstanceRun");
    assert_eq!(host.recv().as_deref(), Some(SHUTDOWN));
    assert_eq!(worker.join().unwrap(), StopReason::StopOrder);
}

#[test]
fn invalid_token_never_reaches_orders() {
    let dir = tempfile::tempdir().unwrap();
    let (mut host, worker) = start_worker(dir.path());
    host.authenticate(false);

    assert_eq!(host.recv().as_deref(), Some(SHUTDOWN));
    assert_eq!(host.recv(), None);
    assert_eq!(worker.join().unwrap(), StopReason::AuthenticationRejected);
}

#[test]
fn unknown_order_stops_worker() {
    let dir = tempfile::tempdir().unwrap();
    let (mut host, worker) = start_worker(dir.path());
    host.authenticate(true);
    host.send("reticulateSplines");

    assert_eq!(host.recv().as_deref(), Some(SHUTDOWN));
    assert_eq!(
        worker.join().unwrap(),
        StopReason::UnknownOrder("reticulateSplines".into())
    );
}

#[test]
fn host_disconnect_stops_worker_quietly() {
    let dir = tempfile::tempdir().unwrap();
    let (mut host, worker) = start_worker(dir.path());
    host.authenticate(true);
    drop(host);
    assert_eq!(worker.join().unwrap(), StopReason::PeerClosed);
}

#[test]
fn legacy_line_shape_is_served() {
    let dir = tempfile::tempdir().unwrap();
    write_channel_file(dir.path(), "outputs.rceo", r#"["y"]"#);
    let (mut host, worker) = start_worker(dir.path());
    host.authenticate(true);

    host.send("executeUserscript");
    assert_eq!(host.recv().as_deref(), Some("ReadyToExecuteScript"));
    host.send("2");
    assert_eq!(host.recv().as_deref(), Some("ReceivedScriptLength"));
    host.send("local v = 21");
    host.send(r#"channel.write_output("y", v * 2)"#);
    assert_eq!(host.recv().as_deref(), Some(SUCCESS));

    host.send("stopInstance");
    assert_eq!(host.recv().as_deref(), Some(SHUTDOWN));
    worker.join().unwrap();
    assert_eq!(
        read_json(dir.path(), "pythonOutput.rced"),
        serde_json::json!({"y": [42]})
    );
}

#[test]
fn malformed_request_reports_failure() {
    let dir = tempfile::tempdir().unwrap();
    let (mut host, worker) = start_worker(dir.path());
    host.authenticate(true);

    host.send("executeUserscript");
    assert_eq!(host.recv().as_deref(), Some("ReadyToExecuteScript"));
    host.send(r#"{"command":"execute"}"#);
    assert_eq!(host.recv().as_deref(), Some(SCRIPT_FAILED));

    host.send("stopInstance");
    assert_eq!(host.recv().as_deref(), Some(SHUTDOWN));
    assert_eq!(worker.join().unwrap(), StopReason::StopOrder);
}

#[test]
fn finalize_failure_has_its_own_status() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("pythonOutput.rced")).unwrap();
    let (mut host, worker) = start_worker(dir.path());
    host.authenticate(true);

    assert_eq!(host.execute("local ok = true"), FINALIZE_FAILED);

    host.send("stopInstance");
    assert_eq!(host.recv().as_deref(), Some(SHUTDOWN));
    worker.join().unwrap();
}

#[test]
fn state_carries_across_runs_through_files() {
    let dir = tempfile::tempdir().unwrap();
    let (mut host, worker) = start_worker(dir.path());
    host.authenticate(true);

    let script = r#"
        local n = channel.read_state_variable("n", 0)
        channel.write_state_variable("n", n + 1)
    "#;
    assert_eq!(host.execute(script), SUCCESS);
    assert_eq!(
        read_json(dir.path(), "pythonStateOutput.rces"),
        serde_json::json!({"n": 1})
    );

    // host promotes the state output to the next run's input
    std::fs::copy(
        dir.path().join("pythonStateOutput.rces"),
        dir.path().join("pythonStateVariables.rces"),
    )
    .unwrap();
    assert_eq!(host.execute(script), SUCCESS);
    assert_eq!(
        read_json(dir.path(), "pythonStateOutput.rces"),
        serde_json::json!({"n": 2})
    );

    host.send("stopInstance");
    assert_eq!(host.recv().as_deref(), Some(SHUTDOWN));
    worker.join().unwrap();
}

#[test]
fn oversized_line_count_keeps_worker_alive() {
    let dir = tempfile::tempdir().unwrap();
    let (mut host, worker) = start_worker(dir.path());
    host.authenticate(true);

    host.send("executeUserscript");
    assert_eq!(host.recv().as_deref(), Some("ReadyToExecuteScript"));
    host.send("18446744073709551615");
    assert_eq!(host.recv().as_deref(), Some(SCRIPT_FAILED));

    assert_eq!(host.execute("local ok = true"), SUCCESS);
    host.send("stopInstance");
    assert_eq!(host.recv().as_deref(), Some(SHUTDOWN));
    assert_eq!(worker.join().unwrap(), StopReason::StopOrder);
}
