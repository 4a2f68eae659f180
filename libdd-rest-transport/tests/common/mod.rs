// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Small blocking servers for exercising the transport over real sockets.

#![allow(dead_code)]

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{Ipv4Addr, Ipv6Addr, Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

pub const OK_RESPONSE: &str = "HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\nok";

/// A port nothing listens on.
pub fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Serves a canned response to every request and records the raw requests.
/// The first `drop_first` connections are closed without an answer.
pub struct FakeServer {
    pub port: u16,
    requests: Arc<Mutex<Vec<String>>>,
    connections: Arc<AtomicUsize>,
}

impl FakeServer {
    pub fn canned(response: &'static str) -> Self {
        Self::start(0, response)
    }

    pub fn dropping_first(drop_first: usize, response: &'static str) -> Self {
        Self::start(drop_first, response)
    }

    fn start(drop_first: usize, response: &'static str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let (recorded, accepted) = (requests.clone(), connections.clone());
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                let seen = accepted.fetch_add(1, Ordering::SeqCst) + 1;
                if seen <= drop_first {
                    let _ = stream.shutdown(Shutdown::Both);
                    continue;
                }
                let recorded = recorded.clone();
                thread::spawn(move || serve(stream, recorded, response));
            }
        });
        Self {
            port,
            requests,
            connections,
        }
    }

    pub fn addr(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

fn serve(stream: TcpStream, recorded: Arc<Mutex<Vec<String>>>, response: &'static str) {
    let Ok(read_half) = stream.try_clone() else {
        return;
    };
    let mut reader = BufReader::new(read_half);
    let mut writer = stream;
    while let Some(request) = read_request(&mut reader) {
        recorded.lock().unwrap().push(request);
        if writer.write_all(response.as_bytes()).is_err() {
            return;
        }
    }
}

/// Head and body of one request, or `None` at end of stream.
fn read_request(reader: &mut impl BufRead) -> Option<String> {
    let mut raw = String::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).ok()? == 0 {
            return None;
        }
        let end_of_head = line == "\r\n";
        raw.push_str(&line);
        if end_of_head {
            break;
        }
    }
    let content_length = raw
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).ok()?;
    raw.push_str(&String::from_utf8_lossy(&body));
    Some(raw)
}

/// A SOCKS5 proxy that records the targets it was asked to connect to.
pub struct SocksServer {
    pub port: u16,
    targets: Arc<Mutex<Vec<String>>>,
}

impl SocksServer {
    pub fn open() -> Self {
        Self::start(None)
    }

    pub fn with_credentials(user: &str, pass: &str) -> Self {
        Self::start(Some((user.to_owned(), pass.to_owned())))
    }

    fn start(credentials: Option<(String, String)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let targets = Arc::new(Mutex::new(Vec::new()));

        let recorded = targets.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                let (recorded, credentials) = (recorded.clone(), credentials.clone());
                thread::spawn(move || {
                    let _ = tunnel(stream, &recorded, credentials.as_ref());
                });
            }
        });
        Self { port, targets }
    }

    pub fn targets(&self) -> Vec<String> {
        self.targets.lock().unwrap().clone()
    }
}

fn tunnel(
    mut client: TcpStream,
    recorded: &Mutex<Vec<String>>,
    credentials: Option<&(String, String)>,
) -> io::Result<()> {
    let mut greeting = [0u8; 2];
    client.read_exact(&mut greeting)?;
    let mut methods = vec![0u8; usize::from(greeting[1])];
    client.read_exact(&mut methods)?;

    match credentials {
        None => client.write_all(&[5, 0])?,
        Some((user, pass)) => {
            if !methods.contains(&2) {
                return client.write_all(&[5, 0xff]);
            }
            client.write_all(&[5, 2])?;
            let given_user = read_field(&mut client, 1)?;
            let given_pass = read_field(&mut client, 0)?;
            if given_user != *user || given_pass != *pass {
                return client.write_all(&[1, 1]);
            }
            client.write_all(&[1, 0])?;
        }
    }

    let mut request = [0u8; 4];
    client.read_exact(&mut request)?;
    let host = match request[3] {
        1 => {
            let mut ip = [0u8; 4];
            client.read_exact(&mut ip)?;
            Ipv4Addr::from(ip).to_string()
        }
        4 => {
            let mut ip = [0u8; 16];
            client.read_exact(&mut ip)?;
            Ipv6Addr::from(ip).to_string()
        }
        _ => read_field(&mut client, 0)?,
    };
    let mut port = [0u8; 2];
    client.read_exact(&mut port)?;
    let port = u16::from_be_bytes(port);
    recorded.lock().unwrap().push(format!("{host}:{port}"));

    let upstream = match TcpStream::connect((host.as_str(), port)) {
        Ok(upstream) => upstream,
        Err(_) => return client.write_all(&[5, 5, 0, 1, 0, 0, 0, 0, 0, 0]),
    };
    client.write_all(&[5, 0, 0, 1, 127, 0, 0, 1, 0, 0])?;

    let (mut client_read, mut upstream_write) = (client.try_clone()?, upstream.try_clone()?);
    thread::spawn(move || {
        let _ = io::copy(&mut client_read, &mut upstream_write);
        let _ = upstream_write.shutdown(Shutdown::Write);
    });
    let (mut upstream_read, mut client_write) = (upstream, client);
    io::copy(&mut upstream_read, &mut client_write)?;
    client_write.shutdown(Shutdown::Write)
}

/// A length-prefixed field, after skipping `skip` leading bytes.
fn read_field(stream: &mut TcpStream, skip: usize) -> io::Result<String> {
    let mut header = vec![0u8; skip + 1];
    stream.read_exact(&mut header)?;
    let mut field = vec![0u8; usize::from(header[skip])];
    stream.read_exact(&mut field)?;
    Ok(String::from_utf8_lossy(&field).into_owned())
}
