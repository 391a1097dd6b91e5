pub mod chunker;
pub mod decode;
pub mod features;
pub mod spectrum;
