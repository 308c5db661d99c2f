use async_trait::async_trait;
use updo_schema::WebSource;

use super::{FetchContext, FetchError, Strategy};
use crate::backend::{HttpRequest, Retriever};
use crate::filter;
use crate::resource::Resource;
use crate::template;

#[async_trait]
impl Strategy for WebSource {
    fn validate(&self) -> Result<(), FetchError> {
        if self.url.trim().is_empty() {
            return Err(FetchError::Required("web url"));
        }
        Ok(())
    }

    async fn fetch(&self, retriever: &dyn Retriever, ctx: &FetchContext) -> Result<Resource, FetchError> {
        let url = template::render(&self.url, &ctx.template)?;
        let resp = ctx.fetch(retriever, HttpRequest::get(url)).await?;
        Ok(filter::resolve(&resp.body, &self.filter, &ctx.template)?.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::FakeRetriever;
    use crate::template::TemplateContext;
    use updo_schema::{FilterSpec, SortMode};

    const PAGE: &str = r#"
<html><body>
<a href="/dl/abc-0.1.2.txt">abc-0.1.2.txt</a>
<a href="/dl/abc-2.3.0.txt">abc-2.3.0.txt</a>
<a href="/dl/abc-1.1.2.txt">abc-1.1.2.txt</a>
</body></html>
"#;

    fn source() -> WebSource {
        WebSource {
            url: "https://example.com/{{ name }}/".into(),
            filter: FilterSpec {
                filters: vec![r#"href="/dl/abc-([0-9.]*?)\.txt""#.into()],
                sort: SortMode::Semver,
                download_url: "https://example.com/dl/abc-{{ version }}.txt".into(),
            },
        }
    }

    #[tokio::test]
    async fn test_scrape() {
        let retriever = FakeRetriever::default().page("https://example.com/abc/", PAGE);
        let ctx = FetchContext::new(TemplateContext::new("abc"));
        let res = source().fetch(&retriever, &ctx).await.unwrap();
        assert_eq!(res.tag, "v2.3.0");
        assert_eq!(res.url, "https://example.com/dl/abc-2.3.0.txt");
        assert_eq!(res.file, "abc-2.3.0.txt");
    }

    #[tokio::test]
    async fn test_scrape_error_status() {
        let retriever = FakeRetriever::default().status("https://example.com/abc/", 503);
        let ctx = FetchContext::new(TemplateContext::new("abc"));
        let err = source().fetch(&retriever, &ctx).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 503, .. }));
    }
}
