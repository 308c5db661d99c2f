use async_trait::async_trait;
use updo_schema::CommandSource;

use super::{FetchContext, FetchError, Strategy};
use crate::backend::Retriever;
use crate::filter;
use crate::resource::Resource;
use crate::template;

#[async_trait]
impl Strategy for CommandSource {
    fn validate(&self) -> Result<(), FetchError> {
        if self.program.trim().is_empty() {
            return Err(FetchError::Required("command program"));
        }
        Ok(())
    }

    async fn fetch(&self, retriever: &dyn Retriever, ctx: &FetchContext) -> Result<Resource, FetchError> {
        let program = template::render(&self.program, &ctx.template)?;
        let args = template::render_all(&self.args, &ctx.template)?;
        let out = retriever.output(&program, &args).await?;
        let raw = String::from_utf8_lossy(&out);
        Ok(filter::resolve(&raw, &self.filter, &ctx.template)?.into())
    }
}
