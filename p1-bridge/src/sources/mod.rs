pub mod http_telegram;
pub mod ndjson;
pub mod spill_file;
pub mod telegram;

pub use http_telegram::HttpTelegramSource;
pub use ndjson::NdjsonSource;
pub use spill_file::SpillFileSource;
