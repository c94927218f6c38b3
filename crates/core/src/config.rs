//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into core services, so
//! nothing reads process-wide environment variables during request handling.

use crate::authz::AccessPolicy;
use crate::constants::EPISODES_DIR_NAME;
use crate::error::{EpisodeError, EpisodeResult};
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
    care_location: String,
    access_policy: AccessPolicy,
}

impl CoreConfig {
    pub fn new(
        data_dir: PathBuf,
        care_location: String,
        access_policy: AccessPolicy,
    ) -> EpisodeResult<Self> {
        let care_location = care_location.trim().to_string();
        if care_location.is_empty() {
            return Err(EpisodeError::InvalidInput(
                "care_location cannot be empty".into(),
            ));
        }

        Ok(Self {
            data_dir,
            care_location,
            access_policy,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn episodes_dir(&self) -> PathBuf {
        self.data_dir.join(EPISODES_DIR_NAME)
    }

    /// Written into the `Care-Location` trailer of every commit.
    pub fn care_location(&self) -> &str {
        &self.care_location
    }

    pub fn access_policy(&self) -> &AccessPolicy {
        &self.access_policy
    }
}

/// Load the access policy from an optional YAML file.
///
/// `None` (or an empty path) gives the built-in defaults.
pub fn load_access_policy(path: Option<PathBuf>) -> EpisodeResult<AccessPolicy> {
    let Some(path) = path.filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(AccessPolicy::default());
    };

    let text = std::fs::read_to_string(&path).map_err(EpisodeError::FileRead)?;
    let policy = AccessPolicy::from_yaml_str(&text)?;
    tracing::info!(path = %path.display(), "loaded access policy");
    Ok(policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Role;
    use crate::authz::Requirement;
    use tempfile::TempDir;

    #[test]
    fn rejects_blank_care_location() {
        let err = CoreConfig::new(PathBuf::from("/tmp"), "  ".into(), AccessPolicy::default())
            .unwrap_err();
        assert!(matches!(err, EpisodeError::InvalidInput(_)));
    }

    #[test]
    fn episodes_dir_is_under_data_dir() {
        let cfg = CoreConfig::new(
            PathBuf::from("/srv/ipd"),
            "Ward Block".into(),
            AccessPolicy::default(),
        )
        .unwrap();
        assert_eq!(cfg.episodes_dir(), PathBuf::from("/srv/ipd/episodes"));
        assert_eq!(cfg.care_location(), "Ward Block");
    }

    #[test]
    fn missing_policy_path_gives_defaults() {
        assert_eq!(load_access_policy(None).unwrap(), AccessPolicy::default());
        assert_eq!(
            load_access_policy(Some(PathBuf::new())).unwrap(),
            AccessPolicy::default()
        );
    }

    #[test]
    fn policy_file_overrides_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("policy.yaml");
        std::fs::write(&path, "vitals:\n  check: any_role\n  values: [nurse]\n").unwrap();

        let policy = load_access_policy(Some(path)).unwrap();
        assert_eq!(policy.vitals, Requirement::AnyRole(vec![Role::Nurse]));
        assert_eq!(policy.medication, AccessPolicy::default().medication);
    }

    #[test]
    fn unreadable_policy_path_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = load_access_policy(Some(dir.path().join("absent.yaml"))).unwrap_err();
        assert!(matches!(err, EpisodeError::FileRead(_)));
    }
}
