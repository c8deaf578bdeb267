pub mod icons;
pub mod progress;

pub use progress::{TaskProgressView, connection_line, format_eta, summary_line};
