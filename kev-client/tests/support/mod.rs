#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use kev_client::Endpoint;

pub const PATTERN: &str = "__keyevent@*:*";

pub const CONFIRMATION: &[u8] = b"*3\r\n$10\r\npsubscribe\r\n$14\r\n__keyevent@*:*\r\n:1\r\n";

pub const SET_FOO: &[u8] =
    b"*4\r\n$8\r\npmessage\r\n$14\r\n__keyevent@*:*\r\n$18\r\n__keyevent@0__:set\r\n$3\r\nfoo\r\n";

pub const DEL_BAZ: &[u8] =
    b"*4\r\n$8\r\npmessage\r\n$14\r\n__keyevent@*:*\r\n$18\r\n__keyevent@0__:del\r\n$3\r\nbaz\r\n";

/// Script played to a subscription connection after `PSUBSCRIBE`.
#[derive(Clone, Default)]
pub struct PushScript {
    /// Frames written right after the confirmation.
    pub before_gate: Vec<Vec<u8>>,
    /// Frames written once the gate receiver yields (or is dropped).
    pub after_gate: Vec<Vec<u8>>,
    /// Close the socket after the last frame instead of holding it open.
    pub close_after: bool,
}

pub struct FakeStore {
    pub endpoint: Endpoint,
    pub commands: Arc<Mutex<Vec<String>>>,
}

/// Starts a store answering `GET` from `values` and playing `script` to
/// subscribers. Every accepted connection gets its own thread.
pub fn spawn_store(
    values: HashMap<String, Option<String>>,
    script: PushScript,
    gate: Option<Receiver<()>>,
) -> FakeStore {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let endpoint = Endpoint::Tcp(listener.local_addr().expect("addr").to_string());
    let commands = Arc::new(Mutex::new(Vec::new()));
    let values = Arc::new(values);
    let gate = Arc::new(Mutex::new(gate));

    let seen = commands.clone();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { break };
            let values = values.clone();
            let script = script.clone();
            let seen = seen.clone();
            let gate = gate.clone();
            thread::spawn(move || serve(stream, &values, &script, &seen, &gate));
        }
    });

    FakeStore { endpoint, commands }
}

fn serve(
    mut stream: TcpStream,
    values: &HashMap<String, Option<String>>,
    script: &PushScript,
    seen: &Mutex<Vec<String>>,
    gate: &Mutex<Option<Receiver<()>>>,
) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let mut reader = BufReader::new(stream.try_clone().expect("clone"));
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let command = line.trim_end_matches(['\r', '\n']).to_string();
        seen.lock().unwrap().push(command.clone());
        let mut parts = command.split(' ');
        match (parts.next(), parts.next()) {
            (Some("GET"), Some(key)) => match values.get(key) {
                Some(Some(value)) => write_bulk(&mut stream, value.as_bytes()),
                Some(None) | None => write_raw(&mut stream, b"$-1\r\n"),
            },
            (Some("PSUBSCRIBE"), Some(_)) => {
                write_raw(&mut stream, CONFIRMATION);
                for frame in &script.before_gate {
                    write_raw(&mut stream, frame);
                }
                if let Some(rx) = gate.lock().unwrap().take() {
                    let _ = rx.recv();
                }
                for frame in &script.after_gate {
                    write_raw(&mut stream, frame);
                }
                if script.close_after {
                    return;
                }
                // Hold the subscription open until the client hangs up.
                let mut rest = String::new();
                let _ = reader.read_line(&mut rest);
                return;
            }
            _ => write_raw(&mut stream, b"-ERR unknown command\r\n"),
        }
    }
}

pub fn write_raw(stream: &mut TcpStream, data: &[u8]) {
    let _ = stream.write_all(data);
    let _ = stream.flush();
}

pub fn write_bulk(stream: &mut TcpStream, data: &[u8]) {
    let _ = stream.write_all(b"$");
    let _ = stream.write_all(data.len().to_string().as_bytes());
    let _ = stream.write_all(b"\r\n");
    let _ = stream.write_all(data);
    let _ = stream.write_all(b"\r\n");
    let _ = stream.flush();
}

pub fn values(pairs: &[(&str, Option<&str>)]) -> HashMap<String, Option<String>> {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.map(str::to_string)))
        .collect()
}
