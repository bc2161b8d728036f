use crate::api::{ClientError, ProfileApi};
use crate::link::HubLink;
use std::sync::Arc;
use tracing::info;
use wdims_core::events::{ClientEvent, ProfileRef};
use wdims_core::{validate_profile_name, ErrorKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameOutcome {
    /// Old and new names were the same after trimming.
    Unchanged,
    Renamed { new_name: String },
    /// The window's own profile was renamed and the global pointer now names
    /// it; the caller must switch the window to `new_name`.
    RenamedCurrent { new_name: String },
}

/// Profile list management on behalf of one window. Every change that alters
/// the profile list is announced to all windows.
pub struct ProfileManager {
    api: Arc<dyn ProfileApi>,
    hub: Arc<dyn HubLink>,
}

impl ProfileManager {
    pub fn new(api: Arc<dyn ProfileApi>, hub: Arc<dyn HubLink>) -> Self {
        Self { api, hub }
    }

    pub async fn list(&self) -> Result<Vec<String>, ClientError> {
        self.api.list_profiles().await
    }

    /// Creates `name`, optionally as a copy of `copy_from`. Returns the
    /// trimmed name that was created.
    pub async fn create(&self, name: &str, copy_from: Option<&str>) -> Result<String, ClientError> {
        let name = checked_name(name)?;
        self.ensure_free(&name).await?;
        let copy_from = copy_from.map(str::trim).filter(|source| !source.is_empty());
        self.api.create_profile(&name, copy_from).await?;
        info!(event = "profile_created", profile = %name, copy_from = ?copy_from);
        self.hub.send(ClientEvent::ProfilesChanged);
        Ok(name)
    }

    /// Clones `source`; without a name the copy is called `<source>-copy`.
    pub async fn clone_profile(&self, source: &str, new_name: Option<&str>) -> Result<String, ClientError> {
        let new_name = match new_name.map(str::trim).filter(|name| !name.is_empty()) {
            Some(name) => name.to_string(),
            None => format!("{source}-copy"),
        };
        let new_name = checked_name(&new_name)?;
        self.ensure_free(&new_name).await?;
        self.api.clone_profile(source, &new_name).await?;
        info!(event = "profile_cloned", source, profile = %new_name);
        self.hub.send(ClientEvent::ProfilesChanged);
        Ok(new_name)
    }

    pub async fn delete(&self, name: &str, current: &str) -> Result<(), ClientError> {
        if name == current {
            return Err(ClientError::rejected(
                ErrorKind::Forbidden,
                "cannot delete the profile this window is using",
            ));
        }
        let names = self.api.list_profiles().await?;
        if names.len() <= 1 {
            return Err(ClientError::rejected(
                ErrorKind::Forbidden,
                "cannot delete the last profile",
            ));
        }
        self.api.delete_profile(name).await?;
        info!(event = "profile_deleted", profile = name);
        self.hub.send(ClientEvent::ProfilesChanged);
        Ok(())
    }

    pub async fn rename(
        &self,
        old_name: &str,
        new_name: &str,
        current: &str,
    ) -> Result<RenameOutcome, ClientError> {
        let new_name = checked_name(new_name)?;
        if new_name == old_name {
            return Ok(RenameOutcome::Unchanged);
        }
        self.ensure_free(&new_name).await?;
        self.api.rename_profile(old_name, &new_name).await?;
        info!(event = "profile_renamed", from = old_name, to = %new_name);

        let outcome = if old_name == current {
            self.api.set_active_profile(&new_name).await?;
            RenameOutcome::RenamedCurrent { new_name }
        } else {
            RenameOutcome::Renamed { new_name }
        };
        self.hub.send(ClientEvent::ProfilesChanged);
        Ok(outcome)
    }

    /// Moves the global pointer and tells every window. Windows keep their
    /// own bindings; this only changes what newly opened windows start on.
    pub async fn switch(&self, name: &str) -> Result<(), ClientError> {
        self.api.set_active_profile(name).await?;
        info!(event = "active_profile_set", profile = name);
        self.hub.send(ClientEvent::ProfileSwitch(ProfileRef {
            profile_name: name.to_string(),
        }));
        Ok(())
    }

    async fn ensure_free(&self, name: &str) -> Result<(), ClientError> {
        let names = self.api.list_profiles().await?;
        if names.iter().any(|existing| existing == name) {
            return Err(ClientError::rejected(
                ErrorKind::AlreadyExists,
                format!("profile {name:?} already exists"),
            ));
        }
        Ok(())
    }
}

fn checked_name(raw: &str) -> Result<String, ClientError> {
    let name = raw.trim();
    validate_profile_name(name)
        .map_err(|err| ClientError::rejected(ErrorKind::InvalidName, err.to_string()))?;
    Ok(name.to_string())
}
