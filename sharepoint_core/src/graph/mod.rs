pub mod client;
pub mod request;
pub mod types;

pub use client::GraphClient;
pub use request::{is_text_mime, GraphRequest};
