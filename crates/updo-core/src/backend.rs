//! I/O seams between the engine and the outside world.
//!
//! Fetch strategies only talk to a [`Retriever`], and every process the
//! pipeline spawns (extraction, build and deploy steps) goes through a
//! [`StepRunner`]. Production code uses [`HttpRetriever`] and
//! [`ProcessRunner`]; tests substitute in-memory doubles.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("{program} failed ({status}): {stderr}")]
    Exit {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("empty command")]
    EmptyCommand,

    #[error("{0}")]
    Other(String),
}

/// A GET request with optional headers and timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            timeout: None,
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Network and process access used while resolving upstreams.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Perform a GET and return status and body.
    async fn get(&self, req: HttpRequest) -> Result<HttpResponse, BackendError>;

    /// Run `program` with `args` and return its stdout.
    async fn output(&self, program: &str, args: &[String]) -> Result<Vec<u8>, BackendError>;

    /// Stream the body of a GET into `dest`, returning the number of bytes written.
    async fn download(&self, req: HttpRequest, dest: &Path) -> Result<u64, BackendError>;
}

/// [`Retriever`] backed by `reqwest` and `tokio::process`.
#[derive(Debug, Clone)]
pub struct HttpRetriever {
    client: Client,
}

impl HttpRetriever {
    pub fn new() -> Result<Self, BackendError> {
        let client = Client::builder()
            .user_agent(crate::USER_AGENT)
            .tcp_nodelay(true)
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn request(&self, req: &HttpRequest) -> reqwest::RequestBuilder {
        let mut builder = self.client.get(&req.url);
        for (name, value) in &req.headers {
            builder = builder.header(name, value);
        }
        if let Some(timeout) = req.timeout {
            builder = builder.timeout(timeout);
        }
        builder
    }
}

#[async_trait]
impl Retriever for HttpRetriever {
    async fn get(&self, req: HttpRequest) -> Result<HttpResponse, BackendError> {
        debug!(url = %req.url, "GET");
        let resp = self.request(&req).send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        Ok(HttpResponse { status, body })
    }

    async fn output(&self, program: &str, args: &[String]) -> Result<Vec<u8>, BackendError> {
        debug!(program, ?args, "exec");
        let out = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?;
        if !out.status.success() {
            return Err(BackendError::Exit {
                program: program.to_string(),
                status: out.status.to_string(),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }
        Ok(out.stdout)
    }

    async fn download(&self, req: HttpRequest, dest: &Path) -> Result<u64, BackendError> {
        debug!(url = %req.url, dest = %dest.display(), "download");
        let resp = self.request(&req).send().await?;
        if !resp.status().is_success() {
            return Err(BackendError::Status {
                url: req.url,
                status: resp.status().as_u16(),
            });
        }

        let mut partial = dest.as_os_str().to_owned();
        partial.push(".part");
        let partial = PathBuf::from(partial);
        let result = async {
            let mut file = File::create(&partial).await?;
            let mut stream = resp.bytes_stream();
            let mut written: u64 = 0;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.flush().await?;
            drop(file);
            tokio::fs::rename(&partial, dest).await?;
            Ok::<u64, BackendError>(written)
        }
        .await;
        if result.is_err() {
            let _ = tokio::fs::remove_file(&partial).await;
        }
        result
    }
}

/// A process to spawn: argv, working directory and explicit environment.
///
/// The environment map is handed to the child only; the engine never mutates
/// its own process environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    pub argv: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl Invocation {
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            ..Default::default()
        }
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }
}

/// Spawns extraction, build and deploy processes.
#[async_trait]
pub trait StepRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> Result<(), BackendError>;
}

/// [`StepRunner`] that spawns real processes with inherited stdio.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl StepRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<(), BackendError> {
        let (program, args) = invocation
            .argv
            .split_first()
            .ok_or(BackendError::EmptyCommand)?;
        debug!(program, ?args, cwd = ?invocation.cwd, "spawn");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(&invocation.env)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        if let Some(cwd) = &invocation.cwd {
            cmd.current_dir(cwd);
        }

        let status = cmd.status().await?;
        if status.success() {
            Ok(())
        } else {
            Err(BackendError::Exit {
                program: program.clone(),
                status: status.to_string(),
                stderr: String::new(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[tokio::test]
    async fn test_get_sends_headers() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/page")
            .match_header("authorization", "Bearer t0k")
            .with_status(200)
            .with_body("hello")
            .create_async()
            .await;

        let retriever = HttpRetriever::new().unwrap();
        let resp = retriever
            .get(HttpRequest::get(format!("{}/page", server.url())).header("Authorization", "Bearer t0k"))
            .await
            .unwrap();
        assert!(resp.is_success());
        assert_eq!(resp.body, "hello");
    }

    #[tokio::test]
    async fn test_get_reports_status() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/missing")
            .with_status(404)
            .create_async()
            .await;

        let retriever = HttpRetriever::new().unwrap();
        let resp = retriever
            .get(HttpRequest::get(format!("{}/missing", server.url())))
            .await
            .unwrap();
        assert_eq!(resp.status, 404);
        assert!(!resp.is_success());
    }

    #[tokio::test]
    async fn test_download_writes_file() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/a.tar.gz")
            .with_status(200)
            .with_body(b"archive-bytes")
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("abc.a.tar.gz");
        let retriever = HttpRetriever::new().unwrap();
        let n = retriever
            .download(HttpRequest::get(format!("{}/a.tar.gz", server.url())), &dest)
            .await
            .unwrap();
        assert_eq!(n, 13);
        assert_eq!(std::fs::read(&dest).unwrap(), b"archive-bytes");
    }

    #[tokio::test]
    async fn test_download_rejects_error_status() {
        let mut server = Server::new_async().await;
        let _m = server.mock("GET", "/gone").with_status(500).create_async().await;

        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("gone");
        let retriever = HttpRetriever::new().unwrap();
        let err = retriever
            .download(HttpRequest::get(format!("{}/gone", server.url())), &dest)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Status { status: 500, .. }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_failed_download_removes_partial_file() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/a.zip")
            .with_status(200)
            .with_body(b"zip-bytes")
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        // A non-empty directory in the way makes the final rename fail.
        let dest = tmp.path().join("abc.a.zip");
        std::fs::create_dir(&dest).unwrap();
        std::fs::write(dest.join("occupied"), b"x").unwrap();

        let retriever = HttpRetriever::new().unwrap();
        let result = retriever
            .download(HttpRequest::get(format!("{}/a.zip", server.url())), &dest)
            .await;
        assert!(result.is_err());
        assert!(!tmp.path().join("abc.a.zip.part").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_and_run() {
        let retriever = HttpRetriever::new().unwrap();
        let out = retriever
            .output("echo", &["one".to_string()])
            .await
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&out).trim(), "one");

        let tmp = tempfile::tempdir().unwrap();
        let mut env = BTreeMap::new();
        env.insert("UPDO_TEST_VALUE".to_string(), "42".to_string());
        let inv = Invocation::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo $UPDO_TEST_VALUE > out.txt".to_string(),
        ])
        .cwd(tmp.path())
        .env(env);
        ProcessRunner.run(&inv).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("out.txt")).unwrap().trim(),
            "42"
        );
        assert!(std::env::var("UPDO_TEST_VALUE").is_err());

        let fail = Invocation::new(vec!["false".to_string()]);
        assert!(matches!(
            ProcessRunner.run(&fail).await,
            Err(BackendError::Exit { .. })
        ));
    }
}
