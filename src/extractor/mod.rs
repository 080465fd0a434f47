pub mod output;
pub mod request;
pub mod traits;
pub mod url;
pub mod ytdlp;

pub use output::{parse_output, ParsedOutput};
pub use request::{ExtractionRequest, ExtractionResponse};
pub use traits::{ExtractionBackend, ProgressCallback};
pub use url::{infer_platform, is_valid_url, Platform, UrlError};
pub use ytdlp::YtDlpBackend;
