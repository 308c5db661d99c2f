use async_trait::async_trait;
use updo_schema::StaticSource;

use super::{FetchContext, FetchError, Strategy};
use crate::backend::Retriever;
use crate::paths::filename_from_url;
use crate::resource::Resource;
use crate::template;

#[async_trait]
impl Strategy for StaticSource {
    fn validate(&self) -> Result<(), FetchError> {
        if self.tag.trim().is_empty() {
            return Err(FetchError::Required("static tag"));
        }
        if self.url.trim().is_empty() {
            return Err(FetchError::Required("static url"));
        }
        Ok(())
    }

    async fn fetch(&self, _retriever: &dyn Retriever, ctx: &FetchContext) -> Result<Resource, FetchError> {
        let tag = template::render(&self.tag, &ctx.template)?;
        let mut tctx = ctx.template.clone();
        tctx.set_tag(&tag);
        let url = template::render(&self.url, &tctx)?;
        let file = filename_from_url(&url).to_string();
        Ok(Resource::new(url, file, tag))
    }
}
