//! Post-hoc firmware metadata extraction

use regex::Regex;
use std::fs;
use std::path::Path;

use crate::models::FirmwareMetadata;

/// Header files searched for version and author defines
const HEADER_PATTERNS: [&str; 2] = ["**/Version.h", "**/Configuration.h"];

/// Pull `SHORT_BUILD_VERSION` and `STRING_CONFIG_H_AUTHOR` out of the source tree.
/// Returns `None` when neither is present.
pub fn parse_metadata(root: &Path) -> Option<FirmwareMetadata> {
    let version_re = Regex::new(r#"^\s*#define\s+SHORT_BUILD_VERSION\s+"([^"]*)""#).ok()?;
    let author_re = Regex::new(r#"^\s*#define\s+STRING_CONFIG_H_AUTHOR\s+"([^"]*)""#).ok()?;

    let mut metadata = FirmwareMetadata::default();
    for pattern in HEADER_PATTERNS {
        let full = root.join(pattern);
        let Ok(paths) = glob::glob(&full.to_string_lossy()) else {
            continue;
        };
        for path in paths.flatten() {
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            for line in content.lines() {
                if metadata.version.is_none() {
                    if let Some(c) = version_re.captures(line) {
                        metadata.version = Some(c[1].to_string());
                    }
                }
                if metadata.author.is_none() {
                    if let Some(c) = author_re.captures(line) {
                        metadata.author = Some(c[1].to_string());
                    }
                }
            }
        }
    }

    if metadata.version.is_none() && metadata.author.is_none() {
        None
    } else {
        Some(metadata)
    }
}
