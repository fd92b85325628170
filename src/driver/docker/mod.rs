// ============================================================================
// File: packages/adles/src/driver/docker/mod.rs
// ----------------------------------------------------------------------------
// Docker Engine platform driver.
//
// Talks HTTP/1.1 to the engine over its unix socket:
// - api_client: connection, request and status mapping
// - driver: PlatformDriver operations mapped onto containers and networks
// ============================================================================

mod api_client;
mod driver;

pub use api_client::{ApiResponse, ApiStats, DockerApiClient};
pub use driver::{DockerDriver, FOLDER_LABEL, INSTANCE_LABEL, MANAGED_LABEL, container_name};
