//! Filter/sort engine shared by every "list of things, pick one" strategy.
//!
//! Raw line-oriented text (command stdout, a scraped page, `git ls-remote`
//! output) is reduced to candidate tags by the configured regexes, ordered
//! according to [`SortMode`], and the first candidate wins. The winning tag is
//! then rendered into the download URL template.

use std::borrow::Cow;

use regex::Regex;
use thiserror::Error;
use tracing::debug;
use updo_schema::{FilterSpec, SortMode};

use crate::paths::filename_from_url;
use crate::template::{self, TemplateContext, TemplateError};

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("invalid filter regex '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("no matches found")]
    NoMatchesFound,

    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Tag, URL and file name selected by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub tag: String,
    pub url: String,
    pub file: String,
}

/// Resolve `raw` with no line reshaping.
pub fn resolve(raw: &str, spec: &FilterSpec, ctx: &TemplateContext) -> Result<Selection, FilterError> {
    resolve_with(raw, spec, ctx, |line| Some(Cow::Borrowed(line)))
}

/// Resolve `raw`, passing every non-blank line through `adapt` first.
///
/// Returning `None` from `adapt` drops the line.
pub fn resolve_with<F>(
    raw: &str,
    spec: &FilterSpec,
    ctx: &TemplateContext,
    adapt: F,
) -> Result<Selection, FilterError>
where
    F: Fn(&str) -> Option<Cow<'_, str>>,
{
    let regexes = compile(&spec.filters, ctx)?;
    let found = candidates(raw, &regexes, adapt);
    let tag = select(found, spec.sort)?;

    let mut ctx = ctx.clone();
    ctx.set_tag(&tag);
    let url = if spec.download_url.is_empty() {
        tag.clone()
    } else {
        template::render(&spec.download_url, &ctx)?
    };
    let file = filename_from_url(&url).to_string();

    debug!(app = ctx.name(), %tag, %url, "filter selected candidate");
    Ok(Selection { tag, url, file })
}

/// Render and compile filter patterns.
pub fn compile(patterns: &[String], ctx: &TemplateContext) -> Result<Vec<Regex>, FilterError> {
    patterns
        .iter()
        .map(|p| {
            let pattern = template::render(p, ctx)?;
            Regex::new(&pattern).map_err(|source| FilterError::InvalidRegex { pattern, source })
        })
        .collect()
}

/// Collect candidates from every retained line, in discovery order.
///
/// Each regex contributes capture group 1 for every match (or the whole match
/// when the regex has no groups). Without regexes each line is a candidate.
pub fn candidates<F>(raw: &str, regexes: &[Regex], adapt: F) -> Vec<String>
where
    F: Fn(&str) -> Option<Cow<'_, str>>,
{
    let mut found = Vec::new();
    for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Some(line) = adapt(line) else {
            continue;
        };
        if regexes.is_empty() {
            found.push(line.into_owned());
            continue;
        }
        for re in regexes {
            for caps in re.captures_iter(&line) {
                let m = if re.captures_len() > 1 { caps.get(1) } else { caps.get(0) };
                if let Some(m) = m {
                    found.push(m.as_str().to_string());
                }
            }
        }
    }
    found
}

/// Order candidates per `sort` and return the winner.
///
/// NOTE: the `r` prefix does not mean "reverse the result". Ascending order is
/// computed for both families and only `sort`/`semver` then reverse it, so the
/// plain modes yield the greatest candidate and `rsort`/`rsemver` the smallest.
/// Existing configurations rely on this.
pub fn select(candidates: Vec<String>, sort: SortMode) -> Result<String, FilterError> {
    let ordered = match sort {
        SortMode::None => candidates,
        SortMode::Sort | SortMode::Rsort => {
            let mut sorted = candidates;
            sorted.sort();
            if sort == SortMode::Sort {
                sorted.reverse();
            }
            sorted
        }
        SortMode::Semver | SortMode::Rsemver => {
            let mut sorted = semver_sorted(candidates);
            if sort == SortMode::Semver {
                sorted.reverse();
            }
            sorted
        }
    };
    ordered.into_iter().next().ok_or(FilterError::NoMatchesFound)
}

/// Normalize to a leading `v`, drop invalid versions, and sort ascending.
fn semver_sorted(candidates: Vec<String>) -> Vec<String> {
    let mut valid: Vec<(semver::Version, String)> = candidates
        .into_iter()
        .filter_map(|c| {
            let tag = if c.starts_with('v') { c } else { format!("v{c}") };
            match parse_semver(&tag) {
                Some(v) => Some((v, tag)),
                None => {
                    debug!(candidate = %tag, "dropping candidate: not a semantic version");
                    None
                }
            }
        })
        .collect();
    valid.sort_by(|a, b| a.0.cmp(&b.0));
    valid.into_iter().map(|(_, tag)| tag).collect()
}

/// Parse a `v`-prefixed version, accepting `vMAJOR` and `vMAJOR.MINOR` shorthands.
pub fn parse_semver(tag: &str) -> Option<semver::Version> {
    let bare = tag.strip_prefix('v')?;
    let (core, suffix) = match bare.find(['-', '+']) {
        Some(i) => bare.split_at(i),
        None => (bare, ""),
    };
    let padded = match core.split('.').count() {
        1 => format!("{core}.0.0{suffix}"),
        2 => format!("{core}.0{suffix}"),
        _ => bare.to_string(),
    };
    semver::Version::parse(&padded).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(filters: &[&str], sort: SortMode) -> FilterSpec {
        FilterSpec {
            filters: filters.iter().map(ToString::to_string).collect(),
            sort,
            download_url: "https://example.com/{{ name }}/{{ tag }}/abc.tar.gz?raw=1".to_string(),
        }
    }

    const FILES: &str = "abc-0.1.2.txt\nabc-2.3.0.txt\n\nabc-1.1.2.txt\n";

    #[test]
    fn test_semver_picks_highest() {
        let ctx = TemplateContext::new("abc");
        let sel = resolve(FILES, &spec(&["abc-([0-9.]*?).txt"], SortMode::Semver), &ctx).unwrap();
        assert_eq!(sel.tag, "v2.3.0");
        assert_eq!(sel.url, "https://example.com/abc/v2.3.0/abc.tar.gz?raw=1");
        assert_eq!(sel.file, "abc.tar.gz");
    }

    #[test]
    fn test_rsemver_picks_lowest() {
        let ctx = TemplateContext::new("abc");
        let sel = resolve(FILES, &spec(&["abc-([0-9.]*?).txt"], SortMode::Rsemver), &ctx).unwrap();
        assert_eq!(sel.tag, "v0.1.2");
    }

    #[test]
    fn test_semver_ordering_is_numeric() {
        let found = vec!["1.9.0".to_string(), "1.10.0".to_string(), "1.2".to_string()];
        assert_eq!(select(found, SortMode::Semver).unwrap(), "v1.10.0");
    }

    #[test]
    fn test_semver_drops_invalid() {
        let found = vec!["latest".to_string(), "nightly-2024".to_string(), "v0.3.1".to_string()];
        assert_eq!(select(found, SortMode::Rsemver).unwrap(), "v0.3.1");

        let found = vec!["latest".to_string()];
        assert!(matches!(
            select(found, SortMode::Semver),
            Err(FilterError::NoMatchesFound)
        ));
    }

    #[test]
    fn test_lexicographic_modes() {
        let found = || vec!["b".to_string(), "c".to_string(), "a".to_string()];
        assert_eq!(select(found(), SortMode::Sort).unwrap(), "c");
        assert_eq!(select(found(), SortMode::Rsort).unwrap(), "a");
        assert_eq!(select(found(), SortMode::None).unwrap(), "b");
    }

    #[test]
    fn test_no_sort_keeps_first_match() {
        let ctx = TemplateContext::new("abc");
        let sel = resolve(FILES, &spec(&["abc-([0-9.]*?).txt"], SortMode::None), &ctx).unwrap();
        assert_eq!(sel.tag, "0.1.2");
    }

    #[test]
    fn test_every_match_in_line_counts() {
        let re = compile(&[r"v(\d+)".to_string()], &TemplateContext::new("x")).unwrap();
        let found = candidates("v1 v2 v3", &re, |l| Some(Cow::Borrowed(l)));
        assert_eq!(found, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_regex_without_groups_uses_whole_match() {
        let re = compile(&[r"\d+\.\d+".to_string()], &TemplateContext::new("x")).unwrap();
        let found = candidates("release 1.2 and 3.4", &re, |l| Some(Cow::Borrowed(l)));
        assert_eq!(found, vec!["1.2", "3.4"]);
    }

    #[test]
    fn test_no_filters_uses_lines() {
        let ctx = TemplateContext::new("x");
        let sel = resolve(
            "https://example.com/x-1.tar.gz\n",
            &FilterSpec::default(),
            &ctx,
        )
        .unwrap();
        assert_eq!(sel.url, "https://example.com/x-1.tar.gz");
        assert_eq!(sel.file, "x-1.tar.gz");
    }

    #[test]
    fn test_adapter_drops_lines() {
        let ctx = TemplateContext::new("x");
        let sel = resolve_with("keep-1\ndrop-2\n", &FilterSpec::default(), &ctx, |l| {
            l.starts_with("keep").then(|| Cow::Borrowed(l))
        })
        .unwrap();
        assert_eq!(sel.tag, "keep-1");
    }

    #[test]
    fn test_no_matches() {
        let ctx = TemplateContext::new("abc");
        let err = resolve(FILES, &spec(&["zzz-(.*)"], SortMode::Semver), &ctx).unwrap_err();
        assert!(matches!(err, FilterError::NoMatchesFound));
    }

    #[test]
    fn test_invalid_regex() {
        let ctx = TemplateContext::new("abc");
        let err = resolve(FILES, &spec(&["(unclosed"], SortMode::None), &ctx).unwrap_err();
        assert!(matches!(err, FilterError::InvalidRegex { .. }));
    }

    #[test]
    fn test_filters_are_templated() {
        let ctx = TemplateContext::new("abc");
        let sel = resolve(FILES, &spec(&["{{ name }}-(2[0-9.]*?).txt"], SortMode::None), &ctx).unwrap();
        assert_eq!(sel.tag, "2.3.0");
    }

    #[test]
    fn test_parse_semver_shorthand() {
        assert_eq!(parse_semver("v1").unwrap(), semver::Version::new(1, 0, 0));
        assert_eq!(parse_semver("v1.2").unwrap(), semver::Version::new(1, 2, 0));
        assert!(parse_semver("v1.2.3-rc.1").is_some());
        assert!(parse_semver("1.2.3").is_none());
        assert!(parse_semver("vabc").is_none());
    }
}
