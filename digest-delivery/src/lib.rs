pub mod email_sender;
pub mod file_sink;
pub mod render;

pub use email_sender::{build_message, EmailConfig, SmtpSink};
pub use file_sink::MarkdownFileSink;
pub use render::{render_html, render_markdown};
