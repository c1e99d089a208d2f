//! Relay of free-text prompts to the remote planning assistant.
//!
//! The assistant is a plain JSON endpoint: it receives `{"prompt": ...}` and
//! answers with `{"ok": ..., "answer": ...}`. Some answers announce that the
//! assistant rebuilt the task list; those are flagged so the caller can
//! render the schedule again.
//!
//! Only one request per [`Assistant`] may be in flight at a time. A second
//! call made while the first is still waiting fails with
//! [`AssistantError::Busy`] instead of queueing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Text the assistant includes when it has rebuilt the schedule.
pub const DEFAULT_REFRESH_MARKER: &str = "Расписание составлено";

/// Shown when the assistant answers without a usable reply.
pub const NO_ANSWER: &str = "Could not get an answer from the assistant.";

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("Nothing to ask: the prompt is empty.")]
    EmptyPrompt,

    #[error("A request to the assistant is already in progress.")]
    Busy,

    #[error("Assistant answered with HTTP status {0}.")]
    Status(reqwest::StatusCode),

    #[error("Failed to reach the assistant: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Serialize)]
pub struct AskRequest<'a> {
    pub prompt: &'a str,
}

#[derive(Debug, Default, Deserialize)]
pub struct AskResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub answer: Option<String>,
}

/// What to show the user after a relayed prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    /// The schedule changed on the other side and should be rendered again.
    pub refresh: bool,
}

impl Reply {
    /// Turn a raw response into a reply, flagging a refresh when the answer
    /// carries `marker`.
    pub fn from_response(response: AskResponse, marker: &str) -> Reply {
        match response.answer {
            Some(text) if response.ok && !text.is_empty() => {
                let refresh = !marker.is_empty() && text.contains(marker);
                Reply { text, refresh }
            }
            _ => Reply {
                text: NO_ANSWER.to_string(),
                refresh: false,
            },
        }
    }
}

/// Single-flight flag. At most one [`InFlight`] exists per guard.
#[derive(Debug, Default)]
pub struct SingleFlight {
    busy: AtomicBool,
}

/// Held while a request runs; clears the flag when dropped.
#[derive(Debug)]
pub struct InFlight<'a> {
    flag: &'a AtomicBool,
}

impl SingleFlight {
    pub fn try_acquire(&self) -> Option<InFlight<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight { flag: &self.busy })
    }

    #[cfg(test)]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Client for the assistant endpoint.
#[derive(Debug)]
pub struct Assistant {
    client: reqwest::blocking::Client,
    endpoint: String,
    refresh_marker: String,
    guard: SingleFlight,
}

impl Assistant {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, AssistantError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Assistant {
            client,
            endpoint: endpoint.into(),
            refresh_marker: DEFAULT_REFRESH_MARKER.to_string(),
            guard: SingleFlight::default(),
        })
    }

    pub fn with_refresh_marker(mut self, marker: impl Into<String>) -> Self {
        self.refresh_marker = marker.into();
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[cfg(test)]
    pub fn is_busy(&self) -> bool {
        self.guard.is_busy()
    }

    /// Send `prompt` to the assistant and wait for its reply.
    pub fn ask(&self, prompt: &str) -> Result<Reply, AssistantError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(AssistantError::EmptyPrompt);
        }

        let _in_flight = match self.guard.try_acquire() {
            Some(in_flight) => in_flight,
            None => {
                warn!("assistant request already in progress");
                return Err(AssistantError::Busy);
            }
        };

        debug!(endpoint = %self.endpoint, "asking assistant");
        let response = self
            .client
            .post(&self.endpoint)
            .json(&AskRequest { prompt })
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(AssistantError::Status(status));
        }

        let body: AskResponse = response.json()?;
        debug!(ok = body.ok, "assistant answered");
        Ok(Reply::from_response(body, &self.refresh_marker))
    }
}

/// One-shot HTTP endpoint for tests: answers `count` requests with a fixed
/// status line and JSON body after `delay`.
#[cfg(test)]
pub(crate) mod stub {
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread;
    use std::time::Duration;

    /// Start serving and return the endpoint URL.
    pub fn serve(status: &str, body: impl Into<String>, delay: Duration, count: usize) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let reply = {
            let body = body.into();
            format!(
                "HTTP/1.1 {}\r\n\
                 Content-Type: application/json\r\n\
                 Content-Length: {}\r\n\
                 Connection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            )
        };

        thread::spawn(move || {
            for stream in listener.incoming().take(count) {
                let mut stream = match stream {
                    Ok(stream) => stream,
                    Err(_) => continue,
                };
                read_request(&mut stream);
                thread::sleep(delay);
                let _ = stream.write_all(reply.as_bytes());
                let _ = stream.flush();
            }
        });

        format!("http://{}/ask", addr)
    }

    /// Consume the request headers and its body.
    fn read_request(stream: &mut TcpStream) {
        let mut received = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let read = match stream.read(&mut chunk) {
                Ok(0) | Err(_) => return,
                Ok(read) => read,
            };
            received.extend_from_slice(&chunk[..read]);

            let head_end = match received.windows(4).position(|w| w == b"\r\n\r\n") {
                Some(at) => at + 4,
                None => continue,
            };
            let head = String::from_utf8_lossy(&received[..head_end]).to_lowercase();
            let body_len = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if received.len() >= head_end + body_len {
                return;
            }
        }
    }
}
