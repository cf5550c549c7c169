//! Timestamp overlay on every camera channel

use axis_core::Result;
use axis_vapix::{NewTextOverlay, VapixClient};
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::config::OverlayConfig;

/// Add the configured text overlay to each channel in `1..=channels` that lacks it.
///
/// Channels are handled one request at a time.
pub async fn ensure_overlays(client: &VapixClient, settings: &OverlayConfig) -> Result<()> {
    let existing = client.text_overlays().await?;
    let covered: BTreeSet<u32> = existing
        .iter()
        .filter(|o| o.text == settings.text)
        .map(|o| o.camera)
        .collect();

    for camera in 1..=settings.channels {
        if covered.contains(&camera) {
            debug!(device = %client.name(), camera, "Overlay already present");
            continue;
        }
        info!(device = %client.name(), camera, text = %settings.text, "Adding timestamp overlay");
        client
            .add_text_overlay(&NewTextOverlay {
                camera,
                text: settings.text.clone(),
                position: settings.position.clone(),
                text_color: settings.text_color.clone(),
            })
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{DeviceModel, FakeDevice};
    use axis_core::{Credentials, DeviceIdentity};
    use axis_vapix::Endpoint;
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    fn client(device: &Arc<FakeDevice>) -> VapixClient {
        VapixClient::new(
            DeviceIdentity::new(
                "camera-01",
                Ipv4Addr::new(10, 0, 1, 50),
                Credentials::new("root", "admin"),
            ),
            device.clone(),
        )
    }

    #[tokio::test]
    async fn test_only_missing_channels_get_overlays() {
        let mut model = DeviceModel::bootstrapped();
        model.overlays = vec![
            (1, "%D %X".to_string()),
            (3, "%D %X".to_string()),
            (2, "Other text".to_string()),
        ];
        let device = Arc::new(FakeDevice::new(model));

        ensure_overlays(&client(&device), &OverlayConfig::default())
            .await
            .unwrap();

        let added: Vec<u32> = device
            .requests_to(Endpoint::DynamicOverlay)
            .iter()
            .filter(|r| r.rpc_method().as_deref() == Some("addText"))
            .filter_map(|r| r.json_body()?["params"]["camera"].as_u64())
            .map(|c| c as u32)
            .collect();
        assert_eq!(added, vec![2, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
    }

    #[tokio::test]
    async fn test_all_channels_covered_adds_nothing() {
        let mut model = DeviceModel::bootstrapped();
        model.overlays = (1..=12).map(|c| (c, "%D %X".to_string())).collect();
        let device = Arc::new(FakeDevice::new(model));

        ensure_overlays(&client(&device), &OverlayConfig::default())
            .await
            .unwrap();
        assert!(device.mutating_requests().is_empty());
    }
}
