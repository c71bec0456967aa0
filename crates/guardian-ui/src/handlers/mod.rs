pub mod assets;
pub mod pending;
pub mod sse;
