use std::sync::Arc;

use reqwest::RequestBuilder;
use reqwest::header::{CONTENT_ENCODING, HeaderMap, HeaderValue};

use crate::compression::{Compression, CompressionError};

/// Bytes ready to be sent together with the headers that describe them.
#[derive(Debug, Clone)]
pub struct CompressedPayload {
    body: Vec<u8>,
    headers: HeaderMap,
}

impl CompressedPayload {
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn content_encoding(&self) -> Option<&HeaderValue> {
        self.headers.get(CONTENT_ENCODING)
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Attaches the encoding headers and the body to a request being built by the transport.
    pub fn apply(self, builder: RequestBuilder) -> RequestBuilder {
        builder.headers(self.headers).body(self.body)
    }
}

#[derive(Debug, Clone)]
pub struct PayloadEncoder {
    compression: Arc<dyn Compression>,
}

impl PayloadEncoder {
    pub fn new(compression: Arc<dyn Compression>) -> Self {
        PayloadEncoder { compression }
    }

    pub fn encode(&self, payload: &[u8]) -> Result<CompressedPayload, CompressionError> {
        let body = match self.compression.compress(payload) {
            Ok(body) => body.into_owned(),
            Err(error) => {
                tracing::error!(%error, payload_len = payload.len(), "failed to compress payload");
                return Err(error);
            }
        };

        let mut headers = HeaderMap::new();
        self.compression.set_header(&mut headers);

        Ok(CompressedPayload { body, headers })
    }
}
