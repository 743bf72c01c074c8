//! Byte-stream HTTP/1.1 request assembler
//!
//! One [`RequestFramer`] per connection. Chunks are appended as they arrive
//! from the socket; once the header block and `Content-Length` bytes of body
//! are present the request is returned exactly once.

use std::collections::BTreeMap;
use std::fmt;

/// Header blocks larger than this are refused
pub const MAX_HEADER_BYTES: usize = 64 * 1024;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// A fully assembled request
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Request {
	pub method: String,
	pub path: String,
	pub query: BTreeMap<String, String>,
	/// Header names are lowercased
	pub headers: BTreeMap<String, String>,
	pub body: Vec<u8>,
}

impl Request {
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(&name.to_ascii_lowercase()).map(|s| s.as_str())
	}
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum FrameError {
	/// Request line without a method and a target
	MalformedRequestLine { line: String },
	/// Headers or body exceed the configured limits
	TooLarge { limit: usize },
	/// More bytes were pushed after the request completed
	AlreadyComplete,
}

impl fmt::Display for FrameError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			FrameError::MalformedRequestLine { line } => {
				write!(f, "Malformed request line: {:?}", line)
			}
			FrameError::TooLarge { limit } => write!(f, "Request exceeds {} bytes", limit),
			FrameError::AlreadyComplete => write!(f, "Request already complete"),
		}
	}
}

impl std::error::Error for FrameError {}

/// Parsed header block waiting for its body
#[derive(Debug)]
struct Head {
	method: String,
	target: String,
	headers: BTreeMap<String, String>,
	body_start: usize,
	content_length: usize,
}

/// Per-connection accumulation state
#[derive(Debug)]
pub struct RequestFramer {
	buf: Vec<u8>,
	/// Offset up to which the terminator has already been searched for
	scanned: usize,
	head: Option<Head>,
	max_request_bytes: usize,
	complete: bool,
}

impl RequestFramer {
	pub fn new(max_request_bytes: usize) -> Self {
		RequestFramer { buf: Vec::new(), scanned: 0, head: None, max_request_bytes, complete: false }
	}

	/// Append a chunk; returns the request once it is complete
	pub fn push(&mut self, chunk: &[u8]) -> Result<Option<Request>, FrameError> {
		if self.complete {
			return Err(FrameError::AlreadyComplete);
		}
		self.buf.extend_from_slice(chunk);
		if self.buf.len() > self.max_request_bytes {
			return Err(FrameError::TooLarge { limit: self.max_request_bytes });
		}

		if self.head.is_none() {
			let from = self.scanned.saturating_sub(HEADER_TERMINATOR.len() - 1);
			match find(&self.buf[from..], HEADER_TERMINATOR) {
				Some(pos) => {
					let header_end = from + pos;
					self.head = Some(parse_head(&self.buf[..header_end], header_end)?);
				}
				None => {
					self.scanned = self.buf.len();
					if self.buf.len() > MAX_HEADER_BYTES {
						return Err(FrameError::TooLarge { limit: MAX_HEADER_BYTES });
					}
					return Ok(None);
				}
			}
		}

		let Some(head) = self.head.as_ref() else {
			return Ok(None);
		};
		if head.body_start.saturating_add(head.content_length) > self.max_request_bytes {
			return Err(FrameError::TooLarge { limit: self.max_request_bytes });
		}
		if self.buf.len() - head.body_start < head.content_length {
			return Ok(None);
		}

		let Some(head) = self.head.take() else {
			return Ok(None);
		};
		let buf = std::mem::take(&mut self.buf);
		self.complete = true;

		let body = buf[head.body_start..head.body_start + head.content_length].to_vec();
		let (path, query) = match head.target.split_once('?') {
			Some((path, query)) => (path.to_string(), parse_query(query)),
			None => (head.target, BTreeMap::new()),
		};
		Ok(Some(Request { method: head.method, path, query, headers: head.headers, body }))
	}

	pub fn is_complete(&self) -> bool {
		self.complete
	}

	/// Bytes buffered so far
	pub fn buffered(&self) -> usize {
		self.buf.len()
	}
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
	haystack.windows(needle.len()).position(|w| w == needle)
}

fn parse_head(block: &[u8], header_end: usize) -> Result<Head, FrameError> {
	let text = String::from_utf8_lossy(block);
	let mut lines = text.split("\r\n");
	let request_line = lines.next().unwrap_or_default();

	let mut parts = request_line.split_whitespace();
	let (method, target) = match (parts.next(), parts.next()) {
		(Some(method), Some(target)) => (method.to_string(), target.to_string()),
		_ => {
			return Err(FrameError::MalformedRequestLine { line: request_line.to_string() });
		}
	};

	let mut headers = BTreeMap::new();
	for line in lines {
		if let Some((name, value)) = line.split_once(':') {
			headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
		}
	}

	let content_length =
		headers.get("content-length").and_then(|v| v.parse::<usize>().ok()).unwrap_or(0);

	Ok(Head { method, target, headers, body_start: header_end + HEADER_TERMINATOR.len(), content_length })
}

/// `a=1&b=x%20y` into a map, URL-decoded, `+` as space
pub fn parse_query(query: &str) -> BTreeMap<String, String> {
	query
		.split('&')
		.filter(|pair| !pair.is_empty())
		.map(|pair| {
			let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
			(decode_component(key), decode_component(value))
		})
		.collect()
}

fn decode_component(raw: &str) -> String {
	let spaced = raw.replace('+', " ");
	match urlencoding::decode(&spaced) {
		Ok(decoded) => decoded.into_owned(),
		Err(_) => spaced,
	}
}


// vim: ts=4
