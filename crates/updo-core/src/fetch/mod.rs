//! Fetch strategies: turn an application's upstream into a [`Resource`].
//!
//! Every [`Source`] variant implements [`Strategy`]. Dispatch is an exhaustive
//! match over the sum type, and [`resolve`] always validates before any
//! network or process activity.

mod command;
mod git;
mod github;
mod static_url;
mod web;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use updo_schema::Source;

use crate::backend::{BackendError, HttpRequest, HttpResponse, Retriever};
use crate::filter::{FilterError, Selection};
use crate::resource::Resource;
use crate::template::{TemplateContext, TemplateError};

pub use git::peel_tag_ref;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("{0} required")]
    Required(&'static str),

    #[error("github: exactly one of asset or branch must be set")]
    GitHubMode,

    #[error("no asset matched '{pattern}'")]
    NoAssetFound { pattern: String },

    #[error("multiple assets matched '{pattern}': {}", .matches.join(", "))]
    AmbiguousAssetMatch {
        pattern: String,
        matches: Vec<String>,
    },

    #[error("commit sha '{0}' is shorter than 7 characters")]
    ShortSha(String),

    #[error("invalid asset regex '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Everything a strategy may read besides its own source table.
#[derive(Debug, Clone)]
pub struct FetchContext {
    pub template: TemplateContext,
    pub github_api: String,
    pub github_token: Option<String>,
    pub timeout: Option<Duration>,
}

impl FetchContext {
    pub fn new(template: TemplateContext) -> Self {
        Self {
            template,
            github_api: updo_schema::DEFAULT_GITHUB_API.to_string(),
            github_token: None,
            timeout: None,
        }
    }

    pub fn name(&self) -> &str {
        self.template.name()
    }

    /// GET `url` and fail on a non-2xx status.
    pub(crate) async fn fetch(
        &self,
        retriever: &dyn Retriever,
        req: HttpRequest,
    ) -> Result<HttpResponse, FetchError> {
        let url = req.url.clone();
        let resp = retriever.get(req.timeout(self.timeout)).await?;
        if !resp.is_success() {
            return Err(FetchError::Status {
                url,
                status: resp.status,
            });
        }
        Ok(resp)
    }
}

#[async_trait]
pub trait Strategy: Send + Sync {
    /// Check required fields. Performs no I/O.
    fn validate(&self) -> Result<(), FetchError>;

    /// Resolve the upstream into a concrete artifact.
    async fn fetch(&self, retriever: &dyn Retriever, ctx: &FetchContext) -> Result<Resource, FetchError>;
}

/// The strategy backing `source`.
pub fn strategy(source: &Source) -> &dyn Strategy {
    match source {
        Source::GitHub(s) => s,
        Source::Git(s) => s,
        Source::Web(s) => s,
        Source::Command(s) => s,
        Source::Static(s) => s,
    }
}

/// Validate, then resolve `source`.
pub async fn resolve(
    source: &Source,
    retriever: &dyn Retriever,
    ctx: &FetchContext,
) -> Result<Resource, FetchError> {
    let strategy = strategy(source);
    strategy.validate()?;
    let resource = strategy.fetch(retriever, ctx).await?;
    tracing::debug!(
        app = ctx.name(),
        source = source.kind(),
        tag = %resource.tag,
        url = %resource.url,
        "resolved"
    );
    Ok(resource)
}

impl From<Selection> for Resource {
    fn from(sel: Selection) -> Self {
        Resource::new(sel.url, sel.file, sel.tag)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::backend::{BackendError, HttpRequest, HttpResponse, Retriever};

    /// Canned responses keyed by URL or program name.
    #[derive(Default)]
    pub struct FakeRetriever {
        pub pages: HashMap<String, (u16, String)>,
        pub outputs: HashMap<String, String>,
        pub requests: Mutex<Vec<HttpRequest>>,
        pub commands: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl FakeRetriever {
        pub fn page(mut self, url: &str, body: &str) -> Self {
            self.pages.insert(url.to_string(), (200, body.to_string()));
            self
        }

        pub fn status(mut self, url: &str, status: u16) -> Self {
            self.pages.insert(url.to_string(), (status, String::new()));
            self
        }

        pub fn output(mut self, program: &str, stdout: &str) -> Self {
            self.outputs.insert(program.to_string(), stdout.to_string());
            self
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len() + self.commands.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Retriever for FakeRetriever {
        async fn get(&self, req: HttpRequest) -> Result<HttpResponse, BackendError> {
            let page = self.pages.get(&req.url).cloned();
            self.requests.lock().unwrap().push(req.clone());
            let (status, body) = page.ok_or_else(|| BackendError::Other(format!("unexpected GET {}", req.url)))?;
            Ok(HttpResponse { status, body })
        }

        async fn output(&self, program: &str, args: &[String]) -> Result<Vec<u8>, BackendError> {
            self.commands
                .lock()
                .unwrap()
                .push((program.to_string(), args.to_vec()));
            self.outputs
                .get(program)
                .map(|s| s.as_bytes().to_vec())
                .ok_or_else(|| BackendError::Other(format!("unexpected exec {program}")))
        }

        async fn download(&self, req: HttpRequest, _dest: &Path) -> Result<u64, BackendError> {
            Err(BackendError::Other(format!("unexpected download {}", req.url)))
        }
    }
}
