//! Moderation - user decisions about devices and alerts
//!
//! Goes through the same per-identity locks as ingest so a decision can
//! never interleave with a half-applied sighting. Alerts are updated in
//! place, never deleted.

use super::pipeline::IngestPipeline;
use crate::logic::device::DetectedDevice;
use crate::logic::events::{ChangeSet, Collection};
use crate::logic::store::{Store, StoreError};
use crate::logic::threat::{AlertAction, AlertId, ThreatAlert};

impl<S: Store> IngestPipeline<S> {
    /// Whitelisted devices keep being scored but never alert, and survive retention
    pub fn set_whitelisted(&self, device_id: &str, whitelisted: bool) -> Result<DetectedDevice, StoreError> {
        self.update_device_flags(device_id, |d| d.is_whitelisted = whitelisted)
    }

    /// Flagged devices survive retention
    pub fn set_flagged(&self, device_id: &str, flagged: bool) -> Result<DetectedDevice, StoreError> {
        self.update_device_flags(device_id, |d| d.is_flagged = flagged)
    }

    pub fn acknowledge_alert(&self, alert_id: AlertId) -> Result<ThreatAlert, StoreError> {
        let alert = self.store().transaction(|tx| {
            let mut alert = tx
                .get_alert(alert_id)?
                .ok_or_else(|| StoreError::not_found("alert", alert_id))?;
            alert.acknowledged = true;
            tx.update_alert(&alert)?;
            Ok(alert)
        })?;

        self.publish(
            ChangeSet::new()
                .with(Collection::Alerts)
                .with(Collection::UnacknowledgedAlerts),
        );
        Ok(alert)
    }

    /// Record what the user did about an alert (acknowledges it).
    ///
    /// `Whitelisted` and `Flagged` also set the device flag when the device
    /// still exists.
    pub fn set_alert_action(&self, alert_id: AlertId, action: AlertAction) -> Result<ThreatAlert, StoreError> {
        let device_id = self
            .store()
            .transaction(|tx| tx.get_alert(alert_id))?
            .ok_or_else(|| StoreError::not_found("alert", alert_id))?
            .device_id;

        let _guard = self.lock_device(&device_id);

        let (alert, device_touched) = self.store().transaction(|tx| {
            let mut alert = tx
                .get_alert(alert_id)?
                .ok_or_else(|| StoreError::not_found("alert", alert_id))?;
            alert.user_action = action;
            if action != AlertAction::None {
                alert.acknowledged = true;
            }
            tx.update_alert(&alert)?;

            let mut touched = false;
            if let Some(mut device) = tx.get_device(&alert.device_id)? {
                match action {
                    AlertAction::Whitelisted => {
                        device.is_whitelisted = true;
                        touched = true;
                    }
                    AlertAction::Flagged => {
                        device.is_flagged = true;
                        touched = true;
                    }
                    _ => {}
                }
                if touched {
                    tx.put_device(&device)?;
                }
            }
            Ok((alert, touched))
        })?;

        log::info!("Alert #{} for {} marked {}", alert.id, alert.device_id, action);

        let mut changes = ChangeSet::new()
            .with(Collection::Alerts)
            .with(Collection::UnacknowledgedAlerts);
        if device_touched {
            changes.insert(Collection::Devices);
            changes.insert(Collection::SuspiciousDevices);
        }
        self.publish(changes);
        Ok(alert)
    }

    fn update_device_flags(
        &self,
        device_id: &str,
        update: impl FnOnce(&mut DetectedDevice),
    ) -> Result<DetectedDevice, StoreError> {
        let _guard = self.lock_device(device_id);

        let device = self.store().transaction(|tx| {
            let mut device = tx
                .get_device(device_id)?
                .ok_or_else(|| StoreError::not_found("device", device_id))?;
            update(&mut device);
            device.revision = tx.put_device(&device)?;
            Ok(device)
        })?;

        log::info!(
            "Device {} whitelisted={} flagged={}",
            device.id,
            device.is_whitelisted,
            device.is_flagged
        );
        self.publish(
            ChangeSet::new()
                .with(Collection::Devices)
                .with(Collection::SuspiciousDevices),
        );
        Ok(device)
    }
}
