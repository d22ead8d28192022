//! Tiny MeshMS submission server:
//! `GET /submitmessage?location=...&message=...` composes a MeshMS body and
//! posts it to every configured recipient SID via the Rhizome API.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};

use crate::client::RhizomeClient;

pub struct SubmissionServer {
    listener: TcpListener,
    recipients: Vec<String>,
}

impl SubmissionServer {
    pub fn bind(addr: &str, recipients: Vec<String>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        Ok(Self { listener, recipients })
    }

    pub fn recipients_from_file(path: &str) -> std::io::Result<Vec<String>> {
        let text = std::fs::read_to_string(path)?;
        Ok(text.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_owned).collect())
    }

    /// Non-blocking accept: services at most one pending connection per
    /// call, matching the main loop's "maybe accept a submission socket"
    /// step.
    pub fn service_once(&self, client: &RhizomeClient) {
        match self.listener.accept() {
            Ok((stream, _)) => handle_connection(stream, &self.recipients, client),
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(err) => log::warn!("submission socket accept failed: {err}"),
        }
    }
}

fn handle_connection(mut stream: TcpStream, recipients: &[String], client: &RhizomeClient) {
    let mut reader = BufReader::new(&stream);
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }

    let response_body = match parse_request_line(&request_line) {
        Some((location, message)) => submit_to_recipients(client, recipients, &location, &message),
        None => "<html><body>bad request</body></html>".to_owned(),
    };

    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\n\r\n{}",
        response_body.len(),
        response_body
    );
    let _ = stream.write_all(response.as_bytes());
}

fn parse_request_line(line: &str) -> Option<(String, String)> {
    let mut parts = line.split_whitespace();
    let method = parts.next()?;
    let path = parts.next()?;
    if method != "GET" {
        return None;
    }
    let query = path.strip_prefix("/submitmessage?")?;
    let mut location = None;
    let mut message = None;
    for pair in query.split('&') {
        let (key, value) = pair.split_once('=')?;
        match key {
            "location" => location = Some(percent_decode(value)),
            "message" => message = Some(percent_decode(value)),
            _ => {}
        }
    }
    Some((location?, message?))
}

fn submit_to_recipients(client: &RhizomeClient, recipients: &[String], location: &str, message: &str) -> String {
    if recipients.is_empty() {
        return "<html><body>no recipients configured</body></html>".to_owned();
    }
    let body = compose_meshms_body(location, message);
    let mut failures = Vec::new();
    for recipient in recipients {
        let manifest = format!("service=MeshMS2\nrecipient={recipient}\n");
        if let Err(err) = client.import(manifest.as_bytes(), &body) {
            failures.push(format!("{recipient}: {err}"));
        }
    }
    if failures.is_empty() {
        "<html><body>message submitted</body></html>".to_owned()
    } else {
        format!("<html><body>submission failed: {}</body></html>", failures.join("; "))
    }
}

fn compose_meshms_body(location: &str, message: &str) -> Vec<u8> {
    format!("{location}: {message}").into_bytes()
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                if let Ok(value) = u8::from_str_radix(&input[i + 1..i + 3], 16) {
                    out.push(value);
                    i += 3;
                } else {
                    out.push(bytes[i]);
                    i += 1;
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}
