use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::compression::{Compression, GzipCompression, NoCompression};
use crate::payload::PayloadEncoder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionSettings {
    #[serde(default = "default_use_compression")]
    pub use_compression: bool,
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,
}

fn default_use_compression() -> bool {
    true
}

fn default_compression_level() -> i32 {
    GzipCompression::DEFAULT_LEVEL
}

impl Default for CompressionSettings {
    fn default() -> Self {
        CompressionSettings {
            use_compression: default_use_compression(),
            compression_level: default_compression_level(),
        }
    }
}

impl CompressionSettings {
    pub fn build(&self) -> Arc<dyn Compression> {
        if !self.use_compression {
            tracing::info!("payload compression disabled");
            return Arc::new(NoCompression);
        }

        let gzip = GzipCompression::new(self.compression_level);
        tracing::info!(level = gzip.level(), "using gzip payload compression");
        Arc::new(gzip)
    }

    pub fn encoder(&self) -> PayloadEncoder {
        PayloadEncoder::new(self.build())
    }
}
