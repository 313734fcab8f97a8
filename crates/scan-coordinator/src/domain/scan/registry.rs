//! Image scan registry: one scan record per distinct image digest.

use std::collections::HashMap;

use api_types::Image;
use tracing::debug;
use tracing::error;

use super::types::ImageScanInfo;
use super::types::ScanStatus;
use crate::domain::error::status_list;
use crate::domain::error::ModelError;
use crate::domain::error::Result;

/// Owns every [`ImageScanInfo`], keyed by image sha.
///
/// Records are created on first reference and never removed, so completed
/// results stay reusable after the last referencing pod is gone.
#[derive(Debug, Default)]
pub struct ImageScanRegistry {
    images: HashMap<String, ImageScanInfo>,
}

impl ImageScanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an `Unscanned` record for `image` unless its sha is already known.
    ///
    /// Returns true if a record was created.
    pub(crate) fn insert_unscanned(&mut self, image: &Image) -> bool {
        if self.images.contains_key(&image.sha) {
            debug!(image = %image, "Image already registered, keeping existing record");
            return false;
        }
        self.images
            .insert(image.sha.clone(), ImageScanInfo::new(image.clone()));
        debug!(image = %image, "Image registered");
        true
    }

    pub fn get(&self, sha: &str) -> Option<&ImageScanInfo> {
        self.images.get(sha)
    }

    pub fn contains(&self, sha: &str) -> bool {
        self.images.contains_key(sha)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageScanInfo> {
        self.images.values()
    }

    /// Look up a record and verify it is in one of the `expected` states.
    ///
    /// # Errors
    ///
    /// - [`ModelError::ImageNotFound`] if the sha was never registered
    /// - [`ModelError::InvalidTransition`] if the record is in any other state
    pub(crate) fn expect_status(
        &self,
        sha: &str,
        operation: &'static str,
        expected: &[ScanStatus],
    ) -> Result<&ImageScanInfo> {
        let Some(info) = self.images.get(sha) else {
            error!(sha = sha, operation = operation, "Image not registered");
            return Err(ModelError::ImageNotFound {
                sha: sha.to_string(),
            });
        };
        if !expected.contains(&info.status) {
            error!(
                image = %info.image,
                operation = operation,
                expected = %status_list(expected),
                actual = %info.status,
                "Rejected scan status transition"
            );
            return Err(ModelError::InvalidTransition {
                sha: sha.to_string(),
                operation,
                expected: expected.to_vec(),
                actual: info.status,
            });
        }
        Ok(info)
    }

    /// Move a record from one of the `expected` states to `to`.
    ///
    /// The record is left untouched when the precondition does not hold.
    pub(crate) fn transition(
        &mut self,
        sha: &str,
        operation: &'static str,
        expected: &[ScanStatus],
        to: ScanStatus,
    ) -> Result<&mut ImageScanInfo> {
        self.expect_status(sha, operation, expected)?;
        let info = self
            .images
            .get_mut(sha)
            .ok_or_else(|| ModelError::ImageNotFound {
                sha: sha.to_string(),
            })?;
        debug!(image = %info.image, from = %info.status, to = %to, operation = operation, "Scan status transition");
        info.status = to;
        if !to.is_in_flight() {
            info.in_flight_since = None;
        }
        Ok(info)
    }

    /// Number of records in any of the given states
    pub fn count_in(&self, statuses: &[ScanStatus]) -> usize {
        self.images
            .values()
            .filter(|info| statuses.contains(&info.status))
            .count()
    }

    /// Images currently in `status`, in no particular order
    pub fn images_in(&self, status: ScanStatus) -> Vec<Image> {
        self.images
            .values()
            .filter(|info| info.status == status)
            .map(|info| info.image.clone())
            .collect()
    }
}
