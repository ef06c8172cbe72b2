mod client;

pub use client::{ARCHIVE_BASE_URL, ArchiveClient, DEFAULT_CACHE_DIR};
