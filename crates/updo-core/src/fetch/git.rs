use std::borrow::Cow;

use async_trait::async_trait;
use updo_schema::GitSource;

use super::{FetchContext, FetchError, Strategy};
use crate::backend::Retriever;
use crate::filter;
use crate::resource::Resource;
use crate::template;

const TAG_PREFIX: &str = "refs/tags/";

/// Reduce a `sha\trefs/tags/name` line to `name`.
///
/// Peeled annotated-tag refs (`name^{}`) are dropped.
pub fn peel_tag_ref(line: &str) -> Option<Cow<'_, str>> {
    let reference = line.rsplit('\t').next().unwrap_or(line).trim();
    if reference.ends_with("^{}") {
        return None;
    }
    let name = reference.strip_prefix(TAG_PREFIX).unwrap_or(reference);
    (!name.is_empty()).then_some(Cow::Borrowed(name))
}

#[async_trait]
impl Strategy for GitSource {
    fn validate(&self) -> Result<(), FetchError> {
        if self.url.trim().is_empty() {
            return Err(FetchError::Required("git url"));
        }
        Ok(())
    }

    async fn fetch(&self, retriever: &dyn Retriever, ctx: &FetchContext) -> Result<Resource, FetchError> {
        let url = template::render(&self.url, &ctx.template)?;
        let args = vec![
            "ls-remote".to_string(),
            "--tags".to_string(),
            "--sort=-v:refname".to_string(),
            url,
        ];
        let out = retriever.output("git", &args).await?;
        let raw = String::from_utf8_lossy(&out);
        let sel = filter::resolve_with(&raw, &self.filter, &ctx.template, peel_tag_ref)?;
        Ok(sel.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::FakeRetriever;
    use crate::template::TemplateContext;
    use updo_schema::{FilterSpec, SortMode};

    const LS_REMOTE: &str = "\
1111111111111111111111111111111111111111\trefs/tags/v0.10.0
2222222222222222222222222222222222222222\trefs/tags/v0.10.0^{}
3333333333333333333333333333333333333333\trefs/tags/v0.9.1
4444444444444444444444444444444444444444\trefs/tags/nightly
";

    #[test]
    fn test_peel_tag_ref() {
        assert_eq!(peel_tag_ref("abc\trefs/tags/v1.0").as_deref(), Some("v1.0"));
        assert_eq!(peel_tag_ref("abc\trefs/tags/v1.0^{}"), None);
        assert_eq!(peel_tag_ref("v2").as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_git_tags() {
        let retriever = FakeRetriever::default().output("git", LS_REMOTE);
        let source = GitSource {
            url: "https://example.com/{{ name }}.git".into(),
            filter: FilterSpec {
                filters: vec![r"^v([0-9.]+)$".into()],
                sort: SortMode::Semver,
                download_url: "https://example.com/{{ name }}/archive/{{ tag }}.tar.gz".into(),
            },
        };
        let ctx = FetchContext::new(TemplateContext::new("tool"));
        let res = source.fetch(&retriever, &ctx).await.unwrap();
        assert_eq!(res.tag, "v0.10.0");
        assert_eq!(res.url, "https://example.com/tool/archive/v0.10.0.tar.gz");
        assert_eq!(res.file, "v0.10.0.tar.gz");

        let cmds = retriever.commands.lock().unwrap();
        assert_eq!(cmds[0].1.last().unwrap(), "https://example.com/tool.git");
        assert!(cmds[0].1.contains(&"--sort=-v:refname".to_string()));
    }

    #[tokio::test]
    async fn test_git_first_listed() {
        let retriever = FakeRetriever::default().output("git", LS_REMOTE);
        let source = GitSource {
            url: "https://example.com/t.git".into(),
            filter: FilterSpec::default(),
        };
        let res = source
            .fetch(&retriever, &FetchContext::new(TemplateContext::new("t")))
            .await
            .unwrap();
        assert_eq!(res.tag, "v0.10.0");
        assert_eq!(res.url, "v0.10.0");
    }
}
