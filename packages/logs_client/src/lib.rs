pub mod compression;
pub mod payload;
pub mod settings;

pub use compression::{Compression, CompressionError, GzipCompression, NoCompression};
pub use payload::{CompressedPayload, PayloadEncoder};
pub use settings::CompressionSettings;
