//! Minimal STOMP 1.2 frame codec
//!
//! The broker mounts STOMP behind a SockJS endpoint; a non-browser client
//! talks to its raw WebSocket sub-endpoint and only needs the handful of
//! frames below. Header values are passed through verbatim - none of the
//! headers this client sends contain characters that require escaping.

/// A single STOMP frame: command line, headers, optional body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value for a header name, if present.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn connect(host: &str, token: &str) -> Self {
        Frame::new("CONNECT")
            .header("accept-version", "1.2")
            .header("host", host)
            .header("heart-beat", "0,0")
            .header("Authorization", format!("Bearer {}", token))
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new("SUBSCRIBE")
            .header("id", id)
            .header("destination", destination)
    }

    pub fn send(destination: &str, body: &str) -> Self {
        Frame::new("SEND")
            .header("destination", destination)
            .header("content-type", "application/json")
            .body(body)
    }

    pub fn disconnect() -> Self {
        Frame::new("DISCONNECT")
    }

    /// Wire form: command, header lines, blank line, body, NUL terminator.
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.body.len() + 64);
        out.push_str(&self.command);
        out.push('\n');
        for (name, value) in &self.headers {
            out.push_str(name);
            out.push(':');
            out.push_str(value);
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Parse one frame from broker text. Returns `None` for heart-beats
    /// (bare EOLs) and malformed input.
    pub fn parse(raw: &str) -> Option<Frame> {
        let raw = raw.trim_start_matches(&['\r', '\n'][..]);
        if raw.is_empty() {
            return None;
        }
        let raw = raw.strip_suffix('\0').unwrap_or(raw);

        let (head, body) = match raw.split_once("\r\n\r\n").or_else(|| raw.split_once("\n\n")) {
            Some((head, body)) => (head, body),
            None => (raw, ""),
        };

        let mut lines = head.lines();
        let command = lines.next()?.trim_end_matches('\r').to_string();
        if command.is_empty() {
            return None;
        }

        let mut headers = Vec::new();
        for line in lines {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let (name, value) = line.split_once(':')?;
            headers.push((name.to_string(), value.to_string()));
        }

        Some(Frame {
            command,
            headers,
            body: body.to_string(),
        })
    }
}
