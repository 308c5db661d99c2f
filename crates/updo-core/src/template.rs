//! Text substitution for URLs, asset filters, commands and step environments.
//!
//! Templates reference values with `{{ key }}`; whitespace inside the braces
//! is optional. Everything outside a placeholder is copied verbatim, so shell
//! variables such as `$HOME` pass through untouched.
//!
//! # Example
//!
//! ```
//! use updo_core::template::{render, TemplateContext};
//!
//! let ctx = TemplateContext::new("rg").with("tag", "v14.1.0");
//! let url = render("https://example.com/{{ name }}-{{tag}}.tar.gz", &ctx).unwrap();
//! assert_eq!(url, "https://example.com/rg-v14.1.0.tar.gz");
//! ```

use std::collections::BTreeMap;

use thiserror::Error;
use updo_schema::{Arch, Os};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unclosed placeholder at position {pos} in '{template}'")]
    Unclosed { template: String, pos: usize },

    #[error("unknown template variable '{key}' in '{template}'")]
    Unknown { template: String, key: String },
}

/// Values available to templates.
///
/// Always carries `name`, `os`, `arch`, `goos` and `goarch`; strategies and the
/// pipeline layer add more as they become known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateContext {
    vars: BTreeMap<String, String>,
}

impl TemplateContext {
    pub fn new(name: &str) -> Self {
        let os = Os::current();
        let arch = Arch::current();
        let mut vars = BTreeMap::new();
        vars.insert("name".to_string(), name.to_string());
        vars.insert("os".to_string(), os.as_str().to_string());
        vars.insert("goos".to_string(), os.go_name().to_string());
        vars.insert("arch".to_string(), arch.as_str().to_string());
        vars.insert("goarch".to_string(), arch.go_name().to_string());
        Self { vars }
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.vars.insert(key.to_string(), value.into());
    }

    /// Bind `tag`, plus `version` (the tag without a leading `v`).
    pub fn set_tag(&mut self, tag: &str) {
        self.set("tag", tag);
        self.set("version", tag.strip_prefix('v').unwrap_or(tag));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn name(&self) -> &str {
        self.get("name").unwrap_or_default()
    }
}

/// Substitute every `{{ key }}` in `template` from `ctx`.
pub fn render(template: &str, ctx: &TemplateContext) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut offset = 0;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            return Err(TemplateError::Unclosed {
                template: template.to_string(),
                pos: offset + start,
            });
        };
        let key = after[..end].trim();
        let value = ctx.get(key).ok_or_else(|| TemplateError::Unknown {
            template: template.to_string(),
            key: key.to_string(),
        })?;
        out.push_str(value);

        let consumed = start + 2 + end + 2;
        offset += consumed;
        rest = &rest[consumed..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Placeholder keys referenced by `template`, in order of appearance.
///
/// An unclosed placeholder ends the scan.
pub fn keys(template: &str) -> Vec<&str> {
    let mut found = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            break;
        };
        found.push(after[..end].trim());
        rest = &after[end + 2..];
    }
    found
}

/// Render every element of an argv list.
pub fn render_all(templates: &[String], ctx: &TemplateContext) -> Result<Vec<String>, TemplateError> {
    templates.iter().map(|t| render(t, ctx)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_literal() {
        let ctx = TemplateContext::new("jq");
        assert_eq!(render("plain text $HOME", &ctx).unwrap(), "plain text $HOME");
    }

    #[test]
    fn test_render_builtin_vars() {
        let ctx = TemplateContext::new("jq");
        let out = render("{{name}}-{{ os }}-{{ arch }}", &ctx).unwrap();
        assert_eq!(
            out,
            format!("jq-{}-{}", std::env::consts::OS, std::env::consts::ARCH)
        );
    }

    #[test]
    fn test_tag_and_version() {
        let mut ctx = TemplateContext::new("jq");
        ctx.set_tag("v1.7.1");
        assert_eq!(render("{{ tag }}/{{ version }}", &ctx).unwrap(), "v1.7.1/1.7.1");

        ctx.set_tag("1.8");
        assert_eq!(render("{{ version }}", &ctx).unwrap(), "1.8");
    }

    #[test]
    fn test_unknown_key() {
        let ctx = TemplateContext::new("jq");
        let err = render("{{ nope }}", &ctx).unwrap_err();
        assert!(matches!(err, TemplateError::Unknown { ref key, .. } if key == "nope"));
    }

    #[test]
    fn test_unclosed() {
        let ctx = TemplateContext::new("jq");
        let err = render("abc {{ name", &ctx).unwrap_err();
        assert!(matches!(err, TemplateError::Unclosed { pos: 4, .. }));
    }

    #[test]
    fn test_keys() {
        assert_eq!(keys("tar -xf {{ input }} -C {{output}}"), vec!["input", "output"]);
        assert!(keys("no placeholders {{ broken").is_empty());
    }

    #[test]
    fn test_render_all() {
        let ctx = TemplateContext::new("jq").with("input", "/tmp/a.zip");
        let argv = render_all(&["unzip".to_string(), "{{ input }}".to_string()], &ctx).unwrap();
        assert_eq!(argv, vec!["unzip", "/tmp/a.zip"]);
    }
}
