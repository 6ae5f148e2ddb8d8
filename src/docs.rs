// docs.rs
use utoipa::OpenApi;

use crate::{discovery, error, handlers, models};

#[derive(OpenApi)]
#[openapi(
    info(title = "castctl", description = "Local control surface for Cast devices"),
    paths(
        handlers::trigger_scan,
        handlers::scan_status,
        handlers::list_devices,
        handlers::current_selection,
        handlers::select_device,
        handlers::clear_selection,
        handlers::cast_media,
        handlers::media_controls,
        handlers::device_status,
    ),
    components(schemas(
        models::Device,
        models::DeviceStatus,
        models::SelectDeviceRequest,
        models::CastRequest,
        models::ControlRequest,
        models::SelectionResponse,
        models::CommandResponse,
        models::StatusReport,
        discovery::ScanTrigger,
        discovery::ScanState,
        discovery::ScanRejection,
        error::ErrorBody,
    )),
    tags(
        (name = "discovery", description = "Network scans and the device list"),
        (name = "selection", description = "Which device commands go to"),
        (name = "control", description = "Casting and playback control"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_every_api_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/scan",
            "/api/devices",
            "/api/selection",
            "/api/cast",
            "/api/controls",
            "/api/status",
        ] {
            assert!(doc.paths.paths.contains_key(path), "{path} missing");
        }
    }
}
