use bytes::Bytes;
use connectors::store::StageBody;
use futures::{Stream, StreamExt, stream::BoxStream};
use serde_json::Value;
use std::{fmt, io};

/// Data handed to a loader for staging.
pub enum Payload {
    Bytes(Bytes),
    Text(String),
    Stream(BoxStream<'static, io::Result<Bytes>>),
    /// Structured rows, staged as newline-delimited JSON.
    Records(BoxStream<'static, Value>),
}

impl Payload {
    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Payload::Stream(stream.boxed())
    }

    pub fn records<S>(records: S) -> Self
    where
        S: Stream<Item = Value> + Send + 'static,
    {
        Payload::Records(records.boxed())
    }

    pub fn into_stage_body(self) -> StageBody {
        match self {
            Payload::Bytes(bytes) => StageBody::Bytes(bytes),
            Payload::Text(text) => StageBody::Text(text),
            Payload::Stream(stream) => StageBody::Stream(stream),
            Payload::Records(records) => StageBody::Stream(records.map(encode_line).boxed()),
        }
    }
}

fn encode_line(record: Value) -> io::Result<Bytes> {
    let mut line = serde_json::to_vec(&record).map_err(io::Error::other)?;
    line.push(b'\n');
    Ok(Bytes::from(line))
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            Payload::Text(s) => write!(f, "Text({} bytes)", s.len()),
            Payload::Stream(_) => f.write_str("Stream"),
            Payload::Records(_) => f.write_str("Records"),
        }
    }
}

impl From<Bytes> for Payload {
    fn from(value: Bytes) -> Self {
        Payload::Bytes(value)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Payload::Bytes(Bytes::from(value))
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::Text(value)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::Text(value.to_string())
    }
}

impl From<Vec<Value>> for Payload {
    fn from(rows: Vec<Value>) -> Self {
        Payload::records(futures::stream::iter(rows))
    }
}
