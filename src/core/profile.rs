// LogStitch - core/profile.rs
//
// Parsing profile definitions, validation, built-ins and auto-detection.
// Core layer: accepts TOML strings and sample lines, never touches the
// filesystem. I/O is handled by app::profile_mgr which feeds content here.

use crate::core::capture::{sanitize_name, NamedCaptureGroup, TemporalGroup};
use crate::core::pattern::CompiledProfile;
use crate::util::constants;
use crate::util::error::ProfileError;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

// =============================================================================
// Runtime representation
// =============================================================================

/// A named line template and the sub-patterns of the groups it references.
#[derive(Debug, Clone)]
pub struct ParsingProfile {
    /// Unique identifier (e.g. "iso", "jvm-gc").
    pub id: String,

    /// Human-readable name.
    pub name: String,

    pub description: String,

    /// Regex with `$NAME` placeholders for the capture groups.
    pub line_template: String,

    /// Capture groups and their sub-patterns, in declaration order.
    /// Temporal groups are applied to the timestamp in this order.
    pub groups: Vec<(NamedCaptureGroup, String)>,

    /// Whether this is a built-in profile (embedded in the binary).
    pub is_builtin: bool,
}

impl ParsingProfile {
    /// Build a custom profile in code. Group names are resolved the same way
    /// stored names are, so `YEAR` is temporal and `LEVEL` is plain.
    pub fn from_parts(id: &str, line_template: &str, groups: &[(&str, &str)]) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            line_template: line_template.to_string(),
            groups: groups
                .iter()
                .map(|(name, pattern)| {
                    (NamedCaptureGroup::from_stored_name(name), pattern.to_string())
                })
                .collect(),
            is_builtin: false,
        }
    }

    /// Sub-pattern declared for `group`, if any.
    pub fn pattern_for(&self, group: &NamedCaptureGroup) -> Option<&str> {
        self.groups
            .iter()
            .find(|(g, _)| g == group)
            .map(|(_, p)| p.as_str())
    }
}

// =============================================================================
// TOML deserialization structures (raw input)
// =============================================================================

/// Raw TOML profile definition as deserialized from a .toml file.
/// This is validated and compiled into a `CompiledProfile` for runtime use.
#[derive(Debug, Deserialize)]
pub struct ProfileDefinition {
    pub profile: ProfileMeta,
    pub parsing: ParsingDef,
    #[serde(default)]
    pub groups: Vec<GroupDef>,
}

#[derive(Debug, Deserialize)]
pub struct ProfileMeta {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct ParsingDef {
    pub line_template: String,
}

#[derive(Debug, Deserialize)]
pub struct GroupDef {
    pub name: String,
    #[serde(default)]
    pub kind: GroupKind,
    pub pattern: String,
}

/// How a declared group name is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GroupKind {
    /// Temporal if the name is a temporal identifier, plain otherwise.
    #[default]
    Auto,
    /// Always plain, even when the name is a temporal identifier.
    Plain,
    /// Must be a temporal identifier.
    Temporal,
}

// =============================================================================
// Profile validation and compilation
// =============================================================================

/// Parse a TOML string into a `ProfileDefinition`.
///
/// `source_path` is used for error messages only (not for I/O).
pub fn parse_profile_toml(
    toml_content: &str,
    source_path: &Path,
) -> Result<ProfileDefinition, ProfileError> {
    toml::from_str(toml_content).map_err(|e| ProfileError::TomlParse {
        path: source_path.to_path_buf(),
        source: e,
    })
}

/// Validate a `ProfileDefinition` into a `ParsingProfile`.
///
/// Validates:
/// - Required fields are present and non-empty
/// - Group names keep at least one character after sanitising
/// - Group names are unique
/// - Groups declared `temporal` name a temporal field
pub fn validate(
    def: ProfileDefinition,
    source_path: &Path,
    is_builtin: bool,
) -> Result<ParsingProfile, ProfileError> {
    let id = def.profile.id.trim().to_string();

    if id.is_empty() {
        return Err(ProfileError::MissingField {
            profile_id: "(empty)".to_string(),
            field: "profile.id",
        });
    }
    if def.profile.name.trim().is_empty() {
        return Err(ProfileError::MissingField {
            profile_id: id,
            field: "profile.name",
        });
    }
    if def.parsing.line_template.is_empty() {
        return Err(ProfileError::MissingField {
            profile_id: id,
            field: "parsing.line_template",
        });
    }

    let mut seen = HashSet::new();
    let mut groups = Vec::with_capacity(def.groups.len());

    for group_def in def.groups {
        let name = sanitize_name(&group_def.name);
        if name.is_empty() {
            return Err(ProfileError::InvalidGroupName {
                profile_id: id,
                raw: group_def.name,
            });
        }
        if name != group_def.name {
            tracing::debug!(
                profile_id = %id,
                raw = %group_def.name,
                name = %name,
                "Capture group name sanitised"
            );
        }
        if group_def.pattern.is_empty() {
            return Err(ProfileError::MissingField {
                profile_id: id,
                field: "groups.pattern",
            });
        }

        let group = match group_def.kind {
            GroupKind::Auto => NamedCaptureGroup::from_stored_name(&name),
            GroupKind::Plain => NamedCaptureGroup::Plain(name.clone()),
            GroupKind::Temporal => match name.parse::<TemporalGroup>() {
                Ok(temporal) => NamedCaptureGroup::Temporal(temporal),
                Err(()) => {
                    return Err(ProfileError::UnknownTemporalGroup {
                        profile_id: id,
                        name,
                    })
                }
            },
        };

        if !seen.insert(name.clone()) {
            return Err(ProfileError::DuplicateGroup {
                profile_id: id,
                name,
            });
        }
        groups.push((group, group_def.pattern));
    }

    tracing::trace!(
        profile_id = %id,
        source = %source_path.display(),
        groups = groups.len(),
        "Profile definition validated"
    );

    Ok(ParsingProfile {
        id,
        name: def.profile.name,
        description: def.profile.description,
        line_template: def.parsing.line_template,
        groups,
        is_builtin,
    })
}

/// Validate a `ProfileDefinition` and compile its line template.
pub fn validate_and_compile(
    def: ProfileDefinition,
    source_path: &Path,
    is_builtin: bool,
) -> Result<CompiledProfile, ProfileError> {
    CompiledProfile::compile(validate(def, source_path, is_builtin)?)
}

// =============================================================================
// Auto-detection
// =============================================================================

/// Result of attempting to auto-detect an input's profile.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    /// Profile ID of the best match.
    pub profile_id: String,
    /// Confidence score (0.0 - 1.0). Ratio of non-blank lines matched.
    pub confidence: f64,
}

/// Pick the profile whose line pattern matches the largest share of the
/// non-blank sample lines.
///
/// Returns None if no profile reaches `AUTO_DETECT_MIN_CONFIDENCE`. On a tie
/// the profile listed first wins.
pub fn auto_detect(
    sample_lines: &[String],
    profiles: &[Arc<CompiledProfile>],
) -> Option<DetectionResult> {
    let lines: Vec<&str> = sample_lines
        .iter()
        .map(String::as_str)
        .filter(|line| !line.trim().is_empty())
        .collect();
    if lines.is_empty() || profiles.is_empty() {
        return None;
    }

    let mut best: Option<DetectionResult> = None;

    for profile in profiles {
        let matches = lines.iter().filter(|line| profile.is_match(line)).count();
        let confidence = matches as f64 / lines.len() as f64;

        if confidence >= constants::AUTO_DETECT_MIN_CONFIDENCE
            && best.as_ref().map_or(true, |b| confidence > b.confidence)
        {
            best = Some(DetectionResult {
                profile_id: profile.id().to_string(),
                confidence,
            });
        }
    }

    tracing::debug!(
        sample = lines.len(),
        result = ?best,
        "Auto-detection complete"
    );

    best
}

// =============================================================================
// Built-in profiles (embedded at compile time)
// =============================================================================

/// Embedded TOML content for built-in profiles.
/// Each tuple is (filename, TOML content).
pub fn builtin_profile_sources() -> [(&'static str, &'static str); 5] {
    [
        ("iso.toml", include_str!("../../profiles/iso.toml")),
        (
            "iso_strict.toml",
            include_str!("../../profiles/iso_strict.toml"),
        ),
        ("jvm_gc.toml", include_str!("../../profiles/jvm_gc.toml")),
        ("epoch.toml", include_str!("../../profiles/epoch.toml")),
        (
            "apache_clf.toml",
            include_str!("../../profiles/apache_clf.toml"),
        ),
    ]
}

/// Load, validate and compile all built-in profiles.
///
/// Invalid profiles are logged as errors and skipped (non-fatal).
pub fn load_builtin_profiles() -> Vec<Arc<CompiledProfile>> {
    let mut profiles = Vec::new();
    let mut failures = 0usize;

    for (filename, content) in builtin_profile_sources() {
        let path = PathBuf::from(format!("<builtin>/{filename}"));
        match parse_profile_toml(content, &path)
            .and_then(|def| validate_and_compile(def, &path, true))
        {
            Ok(profile) => {
                tracing::debug!(profile_id = %profile.id(), "Loaded built-in profile");
                profiles.push(Arc::new(profile));
            }
            Err(e) => {
                // Built-in profile failures are bugs, but we still degrade gracefully
                tracing::error!(file = filename, error = %e, "Failed to load built-in profile");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        tracing::warn!(count = failures, "Some built-in profiles failed to load");
    }

    profiles
}

static BUILTIN_PROFILES: OnceLock<Vec<Arc<CompiledProfile>>> = OnceLock::new();

/// The built-in profiles, compiled once per process.
pub fn builtin_profiles() -> &'static [Arc<CompiledProfile>] {
    BUILTIN_PROFILES.get_or_init(load_builtin_profiles)
}

/// Look up a built-in profile by ID.
pub fn builtin(id: &str) -> Option<Arc<CompiledProfile>> {
    builtin_profiles().iter().find(|p| p.id() == id).cloned()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_PROFILE_TOML: &str = r#"
[profile]
id = "test-profile"
name = "Test Profile"
description = "A test profile"

[parsing]
line_template = '^$YEAR-$MONTH-$DAY $LEVEL: $MESSAGE'

[[groups]]
name = "YEAR"
pattern = '\d{4}'

[[groups]]
name = "MONTH"
kind = "temporal"
pattern = '\d{2}'

[[groups]]
name = "DAY"
kind = "plain"
pattern = '\d{2}'

[[groups]]
name = "LEVEL"
pattern = '\w+'

[[groups]]
name = "MESSAGE"
pattern = '.*'
"#;

    fn path() -> PathBuf {
        PathBuf::from("test.toml")
    }

    fn compile_str(toml: &str) -> Result<CompiledProfile, ProfileError> {
        parse_profile_toml(toml, &path()).and_then(|def| validate_and_compile(def, &path(), false))
    }

    fn profile_with_groups(groups: &str) -> String {
        format!(
            r#"
[profile]
id = "p"
name = "P"

[parsing]
line_template = '$A'

{groups}
"#
        )
    }

    #[test]
    fn test_parse_valid_profile() {
        let def = parse_profile_toml(VALID_PROFILE_TOML, &path()).unwrap();
        assert_eq!(def.profile.id, "test-profile");
        assert_eq!(def.groups.len(), 5);
        assert_eq!(def.groups[0].kind, GroupKind::Auto);
        assert_eq!(def.groups[2].kind, GroupKind::Plain);
    }

    #[test]
    fn test_compile_valid_profile() {
        let compiled = compile_str(VALID_PROFILE_TOML).unwrap();
        let profile = compiled.profile();
        assert_eq!(profile.id, "test-profile");
        assert!(!profile.is_builtin);
        assert!(profile.groups[0].0.is_temporal());
        assert!(profile.groups[1].0.is_temporal());
        // kind = "plain" wins over the temporal name
        assert!(!profile.groups[2].0.is_temporal());
        assert!(!profile.groups[3].0.is_temporal());
        assert_eq!(
            profile.pattern_for(&NamedCaptureGroup::of("LEVEL")),
            Some(r"\w+")
        );
        assert!(compiled.is_match("2024-01-02 WARN: low disk"));
    }

    #[test]
    fn test_missing_required_field() {
        let toml = r#"
[profile]
id = ""
name = "Empty ID"

[parsing]
line_template = ".*"
"#;
        match compile_str(toml).unwrap_err() {
            ProfileError::MissingField { field, .. } => assert_eq!(field, "profile.id"),
            other => panic!("Expected MissingField, got: {other:?}"),
        }
    }

    #[test]
    fn test_missing_section_is_toml_error() {
        let toml = r#"
[profile]
id = "x"
name = "X"
"#;
        assert!(matches!(
            compile_str(toml).unwrap_err(),
            ProfileError::TomlParse { .. }
        ));
    }

    #[test]
    fn test_group_names_are_sanitised() {
        let toml = profile_with_groups("[[groups]]\nname = \"A-\"\npattern = 'a'");
        let compiled = compile_str(&toml).unwrap();
        assert_eq!(compiled.profile().groups[0].0.name(), "A");
    }

    #[test]
    fn test_empty_group_name_rejected() {
        let toml = profile_with_groups("[[groups]]\nname = \"--\"\npattern = 'a'");
        assert!(matches!(
            compile_str(&toml).unwrap_err(),
            ProfileError::InvalidGroupName { .. }
        ));
    }

    #[test]
    fn test_duplicate_group_rejected() {
        let toml = profile_with_groups(
            "[[groups]]\nname = \"A\"\npattern = 'a'\n\n[[groups]]\nname = \"A_\"\npattern = 'b'",
        );
        match compile_str(&toml).unwrap_err() {
            ProfileError::DuplicateGroup { profile_id, name } => {
                assert_eq!(profile_id, "p");
                assert_eq!(name, "A");
            }
            other => panic!("Expected DuplicateGroup, got: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_temporal_group_rejected() {
        let toml = profile_with_groups(
            "[[groups]]\nname = \"A\"\nkind = \"temporal\"\npattern = 'a'",
        );
        assert!(matches!(
            compile_str(&toml).unwrap_err(),
            ProfileError::UnknownTemporalGroup { .. }
        ));
    }

    #[test]
    fn test_undeclared_token_rejected() {
        let toml = profile_with_groups("");
        match compile_str(&toml).unwrap_err() {
            ProfileError::UnknownGroup { profile_id, token } => {
                assert_eq!(profile_id, "p");
                assert_eq!(token, "A");
            }
            other => panic!("Expected UnknownGroup, got: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_regex() {
        let toml = profile_with_groups("[[groups]]\nname = \"A\"\npattern = '[invalid'");
        assert!(matches!(
            compile_str(&toml).unwrap_err(),
            ProfileError::InvalidRegex { .. }
        ));
    }

    #[test]
    fn test_all_builtin_profiles_load() {
        let profiles = load_builtin_profiles();
        assert_eq!(profiles.len(), builtin_profile_sources().len());
        for p in &profiles {
            assert!(p.profile().is_builtin, "{} should be built-in", p.id());
        }
        let ids: Vec<&str> = profiles.iter().map(|p| p.id()).collect();
        assert_eq!(ids, vec!["iso", "iso-strict", "jvm-gc", "epoch", "apache-clf"]);
    }

    #[test]
    fn test_builtin_lookup_is_shared() {
        let a = builtin("iso").unwrap();
        let b = builtin("iso").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(builtin("nope").is_none());
    }

    #[test]
    fn test_iso_accepts_loose_variants() {
        let iso = builtin("iso").unwrap();
        for line in [
            "[2020/07/21-02:56:42.460] [info] Hello World!",
            "[2020-11-13 19:59:22.627] [INFO ] Hello world!",
            "[2020/07/21-02:56:42] [info] Hello World!",
            "[2020-11-13 19:59:22] [INFO ] Hello world!",
            "[2020-11-13 19:59:22.627] [FOO  ] Hello world!",
            "[2020-11-13 19:59:22.627] Hello world!",
        ] {
            assert!(iso.is_match(line), "iso should match: {line}");
        }
    }

    #[test]
    fn test_iso_strict_rejects_loose_variants() {
        let strict = builtin("iso-strict").unwrap();
        assert!(strict.is_match("[2020-11-13 19:59:22.627] [INFO ] Hello world!"));
        for line in [
            "[2020/07/21-02:56:42.460] [info] Hello World!",
            "[2020/07/21-02:56:42] [info] Hello World!",
            "[2020-11-13 19:59:22] [INFO ] Hello world!",
            "[2020-11-13 19:59:22.627] [FOO  ] Hello world!",
            "[2020-11-13 19:59:22.627] Hello world!",
        ] {
            assert!(!strict.is_match(line), "iso-strict should reject: {line}");
        }
    }

    #[test]
    fn test_jvm_gc_accepts_both_decorations() {
        let gc = builtin("jvm-gc").unwrap();
        for line in [
            "[54.144s][info][gc,phases      ] GC(59) Phase 4: Compact heap 11.810ms",
            "[54.151s][info][gc,metaspace   ] GC(59) Metaspace: 48468K(49200K)->48468K(49200K)",
            "[65.250s][info][gc,heap,exit   ]  garbage-first heap   total 488448K, used 163531K [0x0000000080000000, 0x0000000100000000)",
            "[2023-02-22T06:46:55.093+0200][info ][safepoint     ] Application time: 0.4142997 seconds",
            "[2023-02-22T06:46:55.292+0200][debug][gc,jni        ] Setting _needs_gc. Thread `\"VM Thread\" 62 locked.",
        ] {
            assert!(gc.is_match(line), "jvm-gc should match: {line}");
        }
    }

    #[test]
    fn test_auto_detect_picks_best_ratio() {
        let lines: Vec<String> = [
            "[54.144s][info][gc,phases      ] GC(59) Phase 4: Compact heap 11.810ms",
            "[54.151s][info][gc,heap        ] GC(59) Eden regions: 9->0(130)",
            "",
            "   continuation",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let result = auto_detect(&lines, builtin_profiles()).unwrap();
        assert_eq!(result.profile_id, "jvm-gc");
        // the blank line does not count
        assert!((result.confidence - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_auto_detect_none_below_threshold() {
        let lines = vec!["plain text".to_string(); 5];
        assert!(auto_detect(&lines, builtin_profiles()).is_none());
        assert!(auto_detect(&[], builtin_profiles()).is_none());
    }
}
