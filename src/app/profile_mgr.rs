// LogStitch - app/profile_mgr.rs
//
// Merges the built-in parsing profiles (embedded in the binary) with
// user-defined TOML files from the user profile directory.
// User profiles override built-in profiles with the same ID.

use crate::core::pattern::CompiledProfile;
use crate::core::profile;
use crate::util::constants;
use crate::util::error::ProfileError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Load all available profiles: built-in first, then user-defined overrides.
///
/// User profiles with the same ID as a built-in profile replace the built-in
/// in place. Invalid profiles are logged and skipped (non-fatal).
///
/// Returns the merged list and any non-fatal errors encountered.
pub fn load_all_profiles(
    user_profile_dir: Option<&Path>,
) -> (Vec<Arc<CompiledProfile>>, Vec<ProfileError>) {
    let mut profiles: Vec<Arc<CompiledProfile>> = profile::builtin_profiles().to_vec();
    let mut errors = Vec::new();

    tracing::debug!(builtin_count = profiles.len(), "Loaded built-in profiles");

    if let Some(dir) = user_profile_dir {
        if dir.is_dir() {
            let (user_profiles, user_errors) = load_user_profiles(dir);
            for e in &user_errors {
                tracing::warn!(error = %e, "Skipping user profile");
            }
            errors.extend(user_errors);

            for user_profile in user_profiles {
                if let Some(pos) = profiles.iter().position(|p| p.id() == user_profile.id()) {
                    tracing::info!(
                        profile_id = %user_profile.id(),
                        "User profile overrides built-in"
                    );
                    profiles[pos] = user_profile;
                } else {
                    tracing::info!(
                        profile_id = %user_profile.id(),
                        "Loaded user-defined profile"
                    );
                    profiles.push(user_profile);
                }
            }
        } else {
            tracing::debug!(
                dir = %dir.display(),
                "User profile directory does not exist (skipping)"
            );
        }
    }

    if profiles.len() > constants::MAX_PROFILES {
        tracing::warn!(
            count = profiles.len(),
            max = constants::MAX_PROFILES,
            "Too many profiles loaded, truncating"
        );
        errors.push(ProfileError::TooManyProfiles {
            count: profiles.len(),
            max: constants::MAX_PROFILES,
        });
        profiles.truncate(constants::MAX_PROFILES);
    }

    tracing::debug!(total = profiles.len(), "Profile loading complete");

    (profiles, errors)
}

/// Find a profile by ID.
pub fn find(profiles: &[Arc<CompiledProfile>], id: &str) -> Option<Arc<CompiledProfile>> {
    profiles.iter().find(|p| p.id() == id).cloned()
}

/// Load user-defined profiles from a directory, in file name order.
fn load_user_profiles(dir: &Path) -> (Vec<Arc<CompiledProfile>>, Vec<ProfileError>) {
    let mut profiles: Vec<Arc<CompiledProfile>> = Vec::new();
    let mut errors = Vec::new();
    let mut origin: HashMap<String, PathBuf> = HashMap::new();

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            errors.push(ProfileError::Io {
                path: dir.to_path_buf(),
                source: e,
            });
            return (profiles, errors);
        }
    };

    let mut paths = Vec::new();
    for entry_result in entries {
        match entry_result {
            Ok(entry) => paths.push(entry.path()),
            Err(e) => errors.push(ProfileError::Io {
                path: dir.to_path_buf(),
                source: e,
            }),
        }
    }
    paths.sort();

    for path in paths {
        // Only process .toml files
        if path.extension().and_then(|e| e.to_str()) != Some("toml") {
            continue;
        }

        match load_profile_file(&path) {
            Ok(compiled) => {
                let id = compiled.id().to_string();
                if let Some(first) = origin.get(&id) {
                    errors.push(ProfileError::DuplicateId {
                        id,
                        path1: first.clone(),
                        path2: path,
                    });
                    continue;
                }
                origin.insert(id, path);
                profiles.push(Arc::new(compiled));
            }
            Err(e) => errors.push(e),
        }
    }

    (profiles, errors)
}

/// Read, size-check, validate and compile one profile file.
pub fn load_profile_file(path: &Path) -> Result<CompiledProfile, ProfileError> {
    let metadata = std::fs::metadata(path).map_err(|e| ProfileError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    if metadata.len() > constants::MAX_PROFILE_FILE_SIZE {
        return Err(ProfileError::FileTooLarge {
            path: path.to_path_buf(),
            size: metadata.len(),
            max_size: constants::MAX_PROFILE_FILE_SIZE,
        });
    }

    let content = std::fs::read_to_string(path).map_err(|e| ProfileError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    profile::parse_profile_toml(&content, path)
        .and_then(|def| profile::validate_and_compile(def, path, false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn profile_toml(id: &str, template: &str) -> String {
        format!(
            r#"
[profile]
id = "{id}"
name = "{id} profile"

[parsing]
line_template = '{template}'

[[groups]]
name = "MSG"
pattern = '.*'
"#
        )
    }

    #[test]
    fn test_builtins_only() {
        let (profiles, errors) = load_all_profiles(None);
        assert!(errors.is_empty());
        assert!(find(&profiles, "iso").is_some());
        assert!(find(&profiles, "jvm-gc").is_some());
    }

    #[test]
    fn test_missing_directory_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (profiles, errors) = load_all_profiles(Some(&dir.path().join("missing")));
        assert!(errors.is_empty());
        assert_eq!(profiles.len(), profile::builtin_profiles().len());
    }

    #[test]
    fn test_user_profile_added_and_override() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.toml"), profile_toml("mine", "^>> $MSG")).unwrap();
        fs::write(dir.path().join("b.toml"), profile_toml("iso", "^ISO $MSG")).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let (profiles, errors) = load_all_profiles(Some(dir.path()));
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(profiles.len(), profile::builtin_profiles().len() + 1);

        let iso = find(&profiles, "iso").unwrap();
        assert!(!iso.profile().is_builtin);
        assert!(iso.is_match("ISO hello"));
        // override keeps the built-in's position
        assert_eq!(profiles[0].id(), "iso");

        assert!(find(&profiles, "mine").unwrap().is_match(">> hi"));
    }

    #[test]
    fn test_invalid_and_duplicate_profiles_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("1.toml"), profile_toml("dup", "$MSG")).unwrap();
        fs::write(dir.path().join("2.toml"), profile_toml("dup", "x$MSG")).unwrap();
        fs::write(dir.path().join("3.toml"), profile_toml("bad", "$NOPE")).unwrap();
        fs::write(dir.path().join("4.toml"), "not = [valid").unwrap();

        let (profiles, errors) = load_all_profiles(Some(dir.path()));
        assert_eq!(errors.len(), 3, "{errors:?}");
        assert!(errors
            .iter()
            .any(|e| matches!(e, ProfileError::DuplicateId { id, .. } if id == "dup")));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ProfileError::UnknownGroup { .. })));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ProfileError::TomlParse { .. })));
        // the first "dup" is kept
        assert_eq!(find(&profiles, "dup").unwrap().profile().line_template, "$MSG");
    }

    #[test]
    fn test_oversized_profile_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.toml");
        let padding = "#".repeat(constants::MAX_PROFILE_FILE_SIZE as usize + 1);
        fs::write(&path, format!("{}\n{padding}\n", profile_toml("big", "$MSG"))).unwrap();
        assert!(matches!(
            load_profile_file(&path),
            Err(ProfileError::FileTooLarge { .. })
        ));
    }
}
