/// Delivery adapters
///
/// Implementations of the shared `Notifier`, `SheetMirror` and `FileStorage`
/// seams used by the dispatcher (and, for resume uploads, by the API).
///
/// # Adapter Types
///
/// - **SmtpNotifier**: Plain-text email through an SMTP relay
/// - **LogNotifier**: Writes rendered emails to the log
/// - **HttpMirror**: Spreadsheet rows and resume uploads over HTTP
/// - **DisabledMirror**: Refuses every mirror call
/// - **RecordingNotifier / RecordingMirror**: In-memory doubles for tests and demos

pub mod disabled;
pub mod http_mirror;
pub mod logging;
pub mod mock;
pub mod smtp;
pub mod templates;

pub use disabled::DisabledMirror;
pub use http_mirror::HttpMirror;
pub use logging::LogNotifier;
pub use mock::{RecordingMirror, RecordingNotifier};
pub use smtp::{SmtpNotifier, SmtpSetupError};
pub use templates::{RenderedEmail, TemplateRenderer};
