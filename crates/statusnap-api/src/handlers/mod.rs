pub mod diagnostics;
pub mod download;
pub mod health;
pub mod index;
pub mod process_video;
