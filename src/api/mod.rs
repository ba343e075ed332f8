pub mod envelope;
pub mod html;

pub use envelope::{normalize, ResponseEnvelope, Status};
pub use html::strip_html;
