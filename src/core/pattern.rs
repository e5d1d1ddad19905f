// LogStitch - core/pattern.rs
//
// Line template compilation: `$NAME` tokens become `(?P<NAME>sub-pattern)`
// and the result is compiled once into a regex shared by every line parsed
// with the profile.

use crate::core::capture::NamedCaptureGroup;
use crate::core::profile::ParsingProfile;
use crate::util::constants;
use crate::util::error::ProfileError;
use regex::{Captures, Regex};
use std::fmt::Write as _;

/// Expand every `$NAME` token of `template` into a named capture group.
///
/// - `$` preceded by an odd number of backslashes is a literal `$`.
/// - `$` not followed by an ASCII letter or digit is a regex anchor.
/// - Otherwise the longest declared group name that prefixes the following
///   alphanumeric run is substituted and the rest of the run stays literal,
///   so `$FRACTIONs` is FRACTION followed by `s`.
///
/// Returns the expanded pattern and the indices (into `groups`) of every
/// group the template referenced, in first-reference order.
pub fn expand_template(
    profile_id: &str,
    template: &str,
    groups: &[(NamedCaptureGroup, String)],
) -> Result<(String, Vec<usize>), ProfileError> {
    let bytes = template.as_bytes();
    let mut pattern = String::with_capacity(template.len() * 2);
    let mut referenced = Vec::new();
    let mut copied_up_to = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }
        let backslashes = bytes[..i].iter().rev().take_while(|&&b| b == b'\\').count();
        if backslashes % 2 == 1 {
            i += 1;
            continue;
        }
        let run_len = bytes[i + 1..]
            .iter()
            .take_while(|b| b.is_ascii_alphanumeric())
            .count();
        if run_len == 0 {
            i += 1;
            continue;
        }

        let run = &template[i + 1..i + 1 + run_len];
        let (index, (group, sub_pattern)) = groups
            .iter()
            .enumerate()
            .filter(|(_, (group, _))| !group.name().is_empty() && run.starts_with(group.name()))
            .max_by_key(|(_, (group, _))| group.name().len())
            .ok_or_else(|| ProfileError::UnknownGroup {
                profile_id: profile_id.to_string(),
                token: run.to_string(),
            })?;

        pattern.push_str(&template[copied_up_to..i]);
        let _ = write!(pattern, "(?P<{}>{})", group.name(), sub_pattern);
        if !referenced.contains(&index) {
            referenced.push(index);
        }
        i += 1 + group.name().len();
        copied_up_to = i;
    }
    pattern.push_str(&template[copied_up_to..]);

    Ok((pattern, referenced))
}

/// A profile together with its compiled line pattern.
///
/// Cheap to share behind an `Arc`; matching never mutates it.
#[derive(Debug, Clone)]
pub struct CompiledProfile {
    profile: ParsingProfile,
    regex: Regex,
    /// Indices into `profile.groups` of the groups the pattern captures,
    /// in profile order.
    referenced: Vec<usize>,
}

impl CompiledProfile {
    pub fn compile(profile: ParsingProfile) -> Result<Self, ProfileError> {
        let (pattern, mut referenced) =
            expand_template(&profile.id, &profile.line_template, &profile.groups)?;

        if pattern.len() > constants::MAX_REGEX_PATTERN_LENGTH {
            return Err(ProfileError::RegexTooLong {
                profile_id: profile.id.clone(),
                length: pattern.len(),
                max_length: constants::MAX_REGEX_PATTERN_LENGTH,
            });
        }

        let regex = Regex::new(&pattern).map_err(|e| ProfileError::InvalidRegex {
            profile_id: profile.id.clone(),
            pattern: pattern.clone(),
            source: e,
        })?;

        for (index, (group, _)) in profile.groups.iter().enumerate() {
            if !referenced.contains(&index) {
                tracing::warn!(
                    profile_id = %profile.id,
                    group = %group,
                    "Capture group is declared but never used in the line template"
                );
            }
        }
        referenced.sort_unstable();

        tracing::debug!(
            profile_id = %profile.id,
            pattern = %pattern,
            groups = referenced.len(),
            "Compiled line template"
        );

        Ok(Self {
            profile,
            regex,
            referenced,
        })
    }

    pub fn profile(&self) -> &ParsingProfile {
        &self.profile
    }

    pub fn id(&self) -> &str {
        &self.profile.id
    }

    pub fn is_match(&self, line: &str) -> bool {
        self.regex.is_match(line)
    }

    pub fn captures<'t>(&self, line: &'t str) -> Option<Captures<'t>> {
        self.regex.captures(line)
    }

    /// The groups the pattern captures, in profile order.
    pub fn captured_groups(&self) -> impl Iterator<Item = &NamedCaptureGroup> + '_ {
        self.referenced
            .iter()
            .map(move |&index| &self.profile.groups[index].0)
    }
}
