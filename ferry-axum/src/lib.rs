//! ferry-axum: HTTP surface for one-time file bundles.
//!
//! Every route lives under `/api/files`:
//!
//! | Method | Path | Purpose |
//! |--------|------|---------|
//! | POST | `/create_bundle` | new bundle, returns its `otp` |
//! | POST | `/upload_single_file/{otp}` | attach the multipart `file` field |
//! | POST | `/chunked_upload/{otp}` | one chunk plus `fileName`, `chunkIndex`, `totalChunks`, `uploadId` |
//! | DELETE | `/chunked_upload/{otp}/{uploadId}` | drop an unfinished upload |
//! | POST | `/finalize_upload/{otp}` | `{"uploadId": ...}`, stitch the chunks |
//! | GET | `/bundle/{otp}` | list attached files without consuming |
//! | GET | `/download/{otp}` | zip of everything, once |

mod app;
mod config;
mod error;
mod routes;
mod state;
mod upload;

pub use app::{build, FerryApp};
pub use config::ServerConfig;
pub use error::FerryAxumError;
pub use routes::{file_router, FileView};
pub use state::FerryState;
