//! Section-scoped `key = value` substitution on TOML-like text
//!
//! Only the targeted value token changes; indentation, trailing comments,
//! line endings and every other line pass through verbatim.

/// One physical line, split from its terminator (`""`, `"\n"` or `"\r\n"`)
#[derive(Debug, Clone)]
struct Line {
    text: String,
    ending: &'static str,
}

/// A `key = value` line split into its parts
#[derive(Debug, Clone, PartialEq, Eq)]
struct KeyLine<'a> {
    indent: &'a str,
    key: &'a str,
    value: &'a str,
    rest: &'a str,
}

fn split_lines(content: &str) -> Vec<Line> {
    content
        .split_inclusive('\n')
        .map(|raw| {
            if let Some(text) = raw.strip_suffix("\r\n") {
                Line {
                    text: text.to_string(),
                    ending: "\r\n",
                }
            } else if let Some(text) = raw.strip_suffix('\n') {
                Line {
                    text: text.to_string(),
                    ending: "\n",
                }
            } else {
                Line {
                    text: raw.to_string(),
                    ending: "",
                }
            }
        })
        .collect()
}

fn join_lines(lines: &[Line]) -> String {
    lines.iter().flat_map(|line| [line.text.as_str(), line.ending]).collect()
}

/// Terminator of the first terminated line, `\n` when there is none
fn dominant_ending(lines: &[Line]) -> &'static str {
    lines
        .iter()
        .map(|line| line.ending)
        .find(|ending| !ending.is_empty())
        .unwrap_or("\n")
}

/// Section name of a `[name]` or `[[name]]` header line
///
/// Headers start in column 0; an indented bracket line belongs to a
/// multi-line value, not a new table.
fn section_header(line: &str) -> Option<String> {
    if !line.starts_with('[') {
        return None;
    }
    let trimmed = line.trim_end();
    let end = trimmed.find(']')?;
    let name = trimmed[..end].trim_start_matches('[').trim();
    Some(name.to_string())
}

fn parse_key_line(line: &str) -> Option<KeyLine<'_>> {
    let trimmed = line.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('[') {
        return None;
    }
    let indent = &line[..line.len() - trimmed.len()];
    let (key_part, after_eq) = trimmed.split_once('=')?;
    let key = key_part.trim();
    if key.is_empty() {
        return None;
    }

    let value_start = after_eq.trim_start();
    let value_len = if let Some(stripped) = value_start.strip_prefix('"') {
        stripped.find('"').map(|i| i + 2).unwrap_or(value_start.len())
    } else {
        value_start
            .find(|c: char| c.is_whitespace() || c == '#')
            .unwrap_or(value_start.len())
    };
    let (value, rest) = value_start.split_at(value_len);

    Some(KeyLine { indent, key, value, rest })
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// Current value of `key` inside `section` (`None` is the root table), unquoted
pub fn read_value(content: &str, section: Option<&str>, key: &str) -> Option<String> {
    let mut in_target = section.is_none();
    for line in content.lines() {
        if let Some(name) = section_header(line) {
            in_target = section == Some(name.as_str());
            continue;
        }
        if !in_target {
            continue;
        }
        if let Some(kl) = parse_key_line(line)
            && kl.key == key
        {
            return Some(unquote(kl.value).to_string());
        }
    }
    None
}

/// Set `key` inside `section` to the literal token `value`
///
/// Matches never leak into other sections, including dotted sub-tables such as
/// `[db.pooler]` versus `[db]`. A key missing from an existing section is
/// inserted after that section's last key line; a missing section is left
/// alone.
pub fn apply_in_section(content: &str, section: Option<&str>, key: &str, value: &str) -> String {
    let mut lines = split_lines(content);
    let mut in_target = section.is_none();
    let mut section_seen = section.is_none();
    let mut found = false;
    let mut anchor: Option<usize> = None;
    let mut first_header: Option<usize> = None;

    for (idx, line) in lines.iter_mut().enumerate() {
        if let Some(name) = section_header(&line.text) {
            first_header.get_or_insert(idx);
            in_target = section == Some(name.as_str());
            if in_target {
                section_seen = true;
                anchor = Some(idx);
            }
            continue;
        }
        if !in_target {
            continue;
        }
        let replacement = match parse_key_line(&line.text) {
            Some(kl) => {
                anchor = Some(idx);
                (kl.key == key).then(|| format!("{}{} = {}{}", kl.indent, key, value, kl.rest))
            }
            None => None,
        };
        if let Some(text) = replacement {
            line.text = text;
            found = true;
        }
    }

    if !found && section_seen {
        let ending = dominant_ending(&lines);
        let at = match anchor {
            Some(idx) => idx + 1,
            None => first_header.unwrap_or(lines.len()),
        };
        if at > 0 && lines[at - 1].ending.is_empty() {
            lines[at - 1].ending = ending;
        }
        lines.insert(
            at,
            Line {
                text: format!("{} = {}", key, value),
                ending,
            },
        );
    }

    join_lines(&lines)
}
