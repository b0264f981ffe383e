//! Braced environment variable expansion for config scalars.
//!
//! Only the `${VAR}` form expands; a bare `$VAR` stays literal so shell
//! snippets survive config files untouched. Expansion runs on scalar reads
//! during load, never on writes.

use anyhow::Result;

use crate::errors::ConfigError;

/// Expand `${VAR}` references in `input` using the process environment.
/// `dotted` qualifies error messages with the config key being read.
pub fn expand(input: &str, dotted: &str) -> Result<String> {
    expand_with(input, dotted, |name| std::env::var(name).ok())
}

/// Expansion against an arbitrary lookup, for tests.
pub fn expand_with<F>(input: &str, dotted: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(idx) = rest.find('$') {
        out.push_str(&rest[..idx]);
        let after = &rest[idx + 1..];

        if let Some(brace_rest) = after.strip_prefix('{') {
            let Some(end) = brace_rest.find('}') else {
                return Err(ConfigError::new(
                    dotted,
                    format!("unclosed ${{ in value {input:?}"),
                )
                .into());
            };
            let name = &brace_rest[..end];
            let value = lookup(name).ok_or_else(|| {
                ConfigError::new(dotted, format!("variable {name:?} not set"))
            })?;
            out.push_str(&value);
            rest = &brace_rest[end + 1..];
        } else {
            // Bare $VAR is literal.
            out.push('$');
            rest = after;
        }
    }

    out.push_str(rest);
    Ok(out)
}

/// Expand `${VAR}` in every scalar of a YAML tree, in place. Errors are
/// qualified with the dotted path of the offending scalar.
pub fn expand_tree(value: &mut serde_yaml::Value, path: &str) -> Result<()> {
    use serde_yaml::Value;

    fn join(prefix: &str, segment: &str) -> String {
        if prefix.is_empty() {
            segment.to_string()
        } else {
            format!("{prefix}.{segment}")
        }
    }

    match value {
        Value::String(s) => {
            *s = expand(s, path)?;
        }
        Value::Mapping(map) => {
            for (k, v) in map.iter_mut() {
                let key = k.as_str().unwrap_or_default().to_string();
                expand_tree(v, &join(path, &key))?;
            }
        }
        Value::Sequence(seq) => {
            for (i, v) in seq.iter_mut().enumerate() {
                expand_tree(v, &format!("{path}[{i}]"))?;
            }
        }
        _ => {}
    }
    Ok(())
}
