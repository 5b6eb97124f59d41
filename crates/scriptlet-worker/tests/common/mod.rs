//! Shared helpers: a scripted host on a loopback socket.

#![allow(dead_code)]

use assert_cmd::cargo::cargo_bin_cmd;
use scriptlet_channel::ChannelLayout;
use scriptlet_lua::ScriptSandbox;
use scriptlet_worker::{ProtocolVocabulary, RunExecutor, StopReason, WorkerSession};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::thread::JoinHandle;
use std::time::Duration;

/// Upper bound on any single host read.
pub const TIMEOUT: Duration = Duration::from_secs(10);

pub const TOKEN: &str = "s3cret";
pub const SUCCESS: &str = "Finished script execution successfully. Waiting for next task.";
pub const SCRIPT_FAILED: &str = "Error when executing the script. Waiting for next task.";
pub const FINALIZE_FAILED: &str = "Error when writing output to temporary folder.";
pub const SHUTDOWN: &str = "Stopping instance.";

/// Host end of one worker connection, speaking raw NUL frames.
pub struct FakeHost {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl FakeHost {
    pub fn send(&mut self, text: &str) {
        self.writer.write_all(text.as_bytes()).unwrap();
        self.writer.write_all(&[0]).unwrap();
        self.writer.flush().unwrap();
    }

    /// Next frame, or `None` once the worker closed the socket.
    pub fn recv(&mut self) -> Option<String> {
        let mut buf = Vec::new();
        let n = self.reader.read_until(0, &mut buf).unwrap();
        if n == 0 || buf.last() != Some(&0) {
            return None;
        }
        buf.pop();
        Some(String::from_utf8(buf).unwrap())
    }

    /// Handshake and token check; returns the token the worker sent.
    pub fn authenticate(&mut self, accept: bool) -> String {
        self.send("Token request");
        let token = self.recv().expect("worker sends token");
        self.send(if accept { "Token accepted." } else { "Token declined." });
        token
    }

    /// Runs one execute sub-protocol with a JSON envelope, returning the status.
    pub fn execute(&mut self, script: &str) -> String {
        self.send("executeUserscript");
        assert_eq!(self.recv().as_deref(), Some("ReadyToExecuteScript"));
        let envelope = serde_json::json!({ "command": "execute", "script": script });
        self.send(&envelope.to_string());
        self.recv().expect("status message")
    }
}

/// Listens on an ephemeral port and runs an in-process worker against it.
pub fn start_worker(channel_dir: &Path) -> (FakeHost, JoinHandle<StopReason>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let layout = ChannelLayout::new(channel_dir);

    let worker = std::thread::spawn(move || {
        let executor = RunExecutor::new(layout, ScriptSandbox::new());
        WorkerSession::connect(
            "127.0.0.1",
            port,
            TOKEN,
            ProtocolVocabulary::default(),
            executor,
        )
        .unwrap()
        .run()
    });

    (accept(&listener), worker)
}

pub fn accept(listener: &TcpListener) -> FakeHost {
    let (stream, _) = listener.accept().unwrap();
    stream.set_read_timeout(Some(TIMEOUT)).unwrap();
    FakeHost {
        reader: BufReader::new(stream.try_clone().unwrap()),
        writer: stream,
    }
}

/// Command for the worker binary with a clean environment.
pub fn worker_cmd(channel_dir: &Path) -> assert_cmd::Command {
    let mut cmd: assert_cmd::Command = cargo_bin_cmd!("scriptlet-worker");
    cmd.timeout(TIMEOUT);
    cmd.env_remove("SCRIPTLET_CONFIG")
        .env_remove("SCRIPTLET_HOST")
        .env_remove("SCRIPTLET_INSTRUCTION_LIMIT")
        .env_remove("RUST_LOG")
        .env("SCRIPTLET_CHANNEL_DIR", channel_dir);
    cmd
}

pub fn write_channel_file(dir: &Path, name: &str, json: &str) {
    std::fs::write(dir.join(name), json).unwrap();
}

pub fn read_json(dir: &Path, name: &str) -> serde_json::Value {
    let text = std::fs::read_to_string(dir.join(name)).unwrap();
    serde_json::from_str(&text).unwrap()
}
