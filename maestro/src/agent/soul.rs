//! SOUL.md parsing: per-agent description document hosted on the gateway.
//!
//! Grammar:
//! - description: the first non-empty, non-heading line after the first H1,
//!   up to the next heading;
//! - capabilities: bullet lines under the H2 `## What You're Good At`
//!   (case-insensitive), normalized to kebab-ish tags;
//! - role prompt: the entire file, delivered verbatim as a task prefix.

use regex::Regex;

/// Parsed SOUL.md document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SoulDoc {
    pub description: Option<String>,
    pub capabilities: Vec<String>,
    pub role_prompt: String,
}

impl SoulDoc {
    /// Deterministic parse of one SOUL.md file.
    pub fn parse(content: &str) -> Self {
        Self {
            description: parse_description(content),
            capabilities: parse_capabilities(content),
            role_prompt: content.to_string(),
        }
    }
}

fn is_heading(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

/// First non-empty, non-heading line after the first H1, up to the next heading.
fn parse_description(content: &str) -> Option<String> {
    let mut seen_h1 = false;
    for line in content.lines() {
        let trimmed = line.trim();
        if !seen_h1 {
            if trimmed.starts_with("# ") || trimmed == "#" {
                seen_h1 = true;
            }
            continue;
        }
        if is_heading(trimmed) {
            return None;
        }
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }
    None
}

/// Bullets under `## What You're Good At`, normalized: lowercase, stripped of
/// everything but alphanumerics/spaces/hyphens, spaces collapsed to hyphens.
fn parse_capabilities(content: &str) -> Vec<String> {
    let heading = Regex::new(r"(?i)^##\s+What You're Good At\s*$").expect("static regex");
    let mut in_section = false;
    let mut capabilities = Vec::new();
    for line in content.lines() {
        let trimmed = line.trim();
        if in_section {
            if is_heading(trimmed) {
                break;
            }
            if let Some(bullet) = trimmed
                .strip_prefix("- ")
                .or_else(|| trimmed.strip_prefix("* "))
            {
                let tag = normalize_capability(bullet);
                if !tag.is_empty() {
                    capabilities.push(tag);
                }
            }
        } else if heading.is_match(trimmed) {
            in_section = true;
        }
    }
    capabilities
}

fn normalize_capability(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let stripped: String = lowered
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ' || *c == '-')
        .collect();
    stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}
