use async_trait::async_trait;

/// Why a location check did not pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationStatus {
    Denied,
    Undefined,
}

/// Platform location/permission check performed before each engine start.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn check(&self) -> Result<(), LocationStatus>;
}

/// Provider for hosts that need no location permission.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAvailable;

#[async_trait]
impl LocationProvider for AlwaysAvailable {
    async fn check(&self) -> Result<(), LocationStatus> {
        Ok(())
    }
}
