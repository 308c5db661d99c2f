use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use updo_schema::GitHubSource;

use super::{FetchContext, FetchError, Strategy};
use crate::backend::{HttpRequest, Retriever};
use crate::paths::filename_from_url;
use crate::resource::Resource;
use crate::template;

/// Asset filter selecting the release's source tarball.
pub const SOURCE_ASSET: &str = "source";

const SHORT_SHA_LEN: usize = 7;

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
    #[serde(default)]
    tarball_url: String,
    #[serde(default)]
    assets: Vec<Asset>,
}

#[derive(Debug, Deserialize)]
struct Asset {
    name: String,
    browser_download_url: String,
}

#[derive(Debug, Deserialize)]
struct Commit {
    sha: String,
}

#[async_trait]
impl Strategy for GitHubSource {
    fn validate(&self) -> Result<(), FetchError> {
        if self.project.trim().is_empty() {
            return Err(FetchError::Required("github project"));
        }
        match (&self.asset, &self.branch) {
            (Some(_), None) | (None, Some(_)) => Ok(()),
            _ => Err(FetchError::GitHubMode),
        }
    }

    async fn fetch(&self, retriever: &dyn Retriever, ctx: &FetchContext) -> Result<Resource, FetchError> {
        match (&self.asset, &self.branch) {
            (Some(asset), None) => latest_release(&self.project, asset, retriever, ctx).await,
            (None, Some(branch)) => branch_head(&self.project, branch, retriever, ctx).await,
            _ => Err(FetchError::GitHubMode),
        }
    }
}

fn api_request(ctx: &FetchContext, url: String) -> HttpRequest {
    let req = HttpRequest::get(url).header("Accept", "application/vnd.github+json");
    match &ctx.github_token {
        Some(token) if !token.is_empty() => req.header("Authorization", format!("Bearer {token}")),
        _ => req,
    }
}

async fn get_json<T: DeserializeOwned>(
    retriever: &dyn Retriever,
    ctx: &FetchContext,
    url: String,
) -> Result<T, FetchError> {
    let resp = ctx.fetch(retriever, api_request(ctx, url.clone())).await?;
    serde_json::from_str(&resp.body).map_err(|source| FetchError::Decode { url, source })
}

async fn latest_release(
    project: &str,
    asset_filter: &str,
    retriever: &dyn Retriever,
    ctx: &FetchContext,
) -> Result<Resource, FetchError> {
    let url = format!("{}/repos/{project}/releases/latest", api_base(ctx));
    let release: Release = get_json(retriever, ctx, url).await?;
    let tag = release.tag_name;

    if asset_filter == SOURCE_ASSET {
        let file = format!("{}-{}.tar.gz", ctx.name(), tag);
        return Ok(Resource::new(release.tarball_url, file, tag));
    }

    let mut tctx = ctx.template.clone();
    tctx.set_tag(&tag);
    let pattern = template::render(asset_filter, &tctx)?;
    let re = Regex::new(&pattern).map_err(|source| FetchError::InvalidRegex {
        pattern: pattern.clone(),
        source,
    })?;

    let mut matched: Vec<Asset> = release
        .assets
        .into_iter()
        .filter(|a| re.is_match(filename_from_url(&a.name)))
        .collect();
    match matched.len() {
        0 => Err(FetchError::NoAssetFound { pattern }),
        1 => {
            let asset = matched.remove(0);
            Ok(Resource::new(asset.browser_download_url, asset.name, tag))
        }
        _ => Err(FetchError::AmbiguousAssetMatch {
            pattern,
            matches: matched.into_iter().map(|a| a.name).collect(),
        }),
    }
}

async fn branch_head(
    project: &str,
    branch: &str,
    retriever: &dyn Retriever,
    ctx: &FetchContext,
) -> Result<Resource, FetchError> {
    let base = api_base(ctx);
    let url = format!("{base}/repos/{project}/commits/{branch}");
    let commit: Commit = get_json(retriever, ctx, url).await?;

    let Some(tag) = commit.sha.get(..SHORT_SHA_LEN) else {
        return Err(FetchError::ShortSha(commit.sha.clone()));
    };
    let url = format!("{base}/repos/{project}/tarball/{}", commit.sha);
    let file = format!("{}-{tag}.tar.gz", ctx.name());
    Ok(Resource::new(url, file, tag))
}

fn api_base(ctx: &FetchContext) -> &str {
    ctx.github_api.trim_end_matches('/')
}
