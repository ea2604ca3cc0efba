//! Message envelope and multipart framing.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::content::Content;
use crate::error::{WireError, WireResult};
use crate::header::{Header, MsgKind, RequestId};
use crate::signer::Signer;

/// Frame separating routing identities from the signed message body.
pub const DELIMITER: &[u8] = b"<IDS|MSG>";

/// A decoded kernel message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Routing prefix (ROUTER peers and iopub topics).
    pub identities: Vec<Bytes>,
    pub header: Header,
    /// Header of the request this message answers; `None` when untagged.
    pub parent_header: Option<Header>,
    pub metadata: Map<String, Value>,
    pub content: Value,
    pub buffers: Vec<Bytes>,
}

impl Message {
    /// Builds an outgoing message from typed content.
    pub fn new<C: Content>(header: Header, content: &C) -> WireResult<Self> {
        let content = serde_json::to_value(content).map_err(|source| WireError::Json {
            frame: "content",
            source,
        })?;
        Ok(Self {
            identities: Vec::new(),
            header,
            parent_header: None,
            metadata: Map::new(),
            content,
            buffers: Vec::new(),
        })
    }

    /// Builds a reply or broadcast answering `parent`.
    pub fn reply<C: Content>(header: Header, parent: &Message, content: &C) -> WireResult<Self> {
        let mut msg = Self::new(header, content)?;
        msg.parent_header = Some(parent.header.clone());
        msg.identities.clone_from(&parent.identities);
        Ok(msg)
    }

    pub fn kind(&self) -> MsgKind {
        self.header.kind()
    }

    /// The correlation identifier of the originating request, if tagged.
    pub fn parent_id(&self) -> Option<RequestId> {
        self.parent_header.as_ref().map(Header::request_id)
    }

    /// Deserializes the content into a typed view.
    pub fn content_as<T: DeserializeOwned>(&self) -> WireResult<T> {
        serde_json::from_value(self.content.clone()).map_err(|source| WireError::Content {
            msg_type: self.header.msg_type.clone(),
            source,
        })
    }

    /// Encodes the message into signed multipart frames.
    pub fn to_frames(&self, signer: &Signer) -> WireResult<Vec<Bytes>> {
        let header = encode_json("header", &self.header)?;
        let parent = match &self.parent_header {
            Some(parent) => encode_json("parent_header", parent)?,
            None => b"{}".to_vec(),
        };
        let metadata = encode_json("metadata", &self.metadata)?;
        let content = encode_json("content", &self.content)?;

        let signature = signer.sign(&[&header, &parent, &metadata, &content])?;

        let mut frames = Vec::with_capacity(self.identities.len() + 6 + self.buffers.len());
        frames.extend(self.identities.iter().cloned());
        frames.push(Bytes::from_static(DELIMITER));
        frames.push(Bytes::from(signature));
        frames.push(Bytes::from(header));
        frames.push(Bytes::from(parent));
        frames.push(Bytes::from(metadata));
        frames.push(Bytes::from(content));
        frames.extend(self.buffers.iter().cloned());
        Ok(frames)
    }

    /// Decodes and verifies multipart frames.
    pub fn from_frames(mut frames: Vec<Bytes>, signer: &Signer) -> WireResult<Self> {
        let total = frames.len();
        let split = frames
            .iter()
            .position(|f| f.as_ref() == DELIMITER)
            .ok_or(WireError::MissingDelimiter(total))?;

        let mut body = frames.split_off(split + 1);
        frames.pop();
        let identities = frames;

        if body.len() < 5 {
            return Err(WireError::Truncated(body.len()));
        }
        let buffers = body.split_off(5);
        let [signature, header, parent, metadata, content]: [Bytes; 5] = body
            .try_into()
            .map_err(|rest: Vec<Bytes>| WireError::Truncated(rest.len()))?;

        signer.verify(&signature, &[&header, &parent, &metadata, &content])?;

        let header: Header = decode_json("header", &header)?;
        let parent_header = decode_parent(&parent)?;
        let metadata: Map<String, Value> = decode_json("metadata", &metadata)?;
        let content: Value = decode_json("content", &content)?;

        Ok(Self {
            identities,
            header,
            parent_header,
            metadata,
            content,
            buffers,
        })
    }
}

fn encode_json<T: serde::Serialize>(frame: &'static str, value: &T) -> WireResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|source| WireError::Json { frame, source })
}

fn decode_json<T: DeserializeOwned>(frame: &'static str, raw: &[u8]) -> WireResult<T> {
    serde_json::from_slice(raw).map_err(|source| WireError::Json { frame, source })
}

/// An empty object means "no parent".
fn decode_parent(raw: &[u8]) -> WireResult<Option<Header>> {
    let value: Value = decode_json("parent_header", raw)?;
    match &value {
        Value::Object(map) if map.is_empty() => Ok(None),
        Value::Null => Ok(None),
        _ => serde_json::from_value(value)
            .map(Some)
            .map_err(|source| WireError::Json {
                frame: "parent_header",
                source,
            }),
    }
}
