use std::num::NonZeroU32;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use colored::Colorize;
use governor::{Quota, RateLimiter};
use indicatif::ProgressBar;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::redirect;
use thiserror::Error;
use tokio::time::Instant;

use crate::detector::{self, ReturnValue};
use crate::discovery::{self, Candidate, Discoverer, DiscoveryError, PatternDiscoverer};
use crate::output;
use crate::request::{payload, RequestTemplate, TemplateLoadError};

// Headers the client negotiates itself; replaying them verbatim breaks the
// response body (compressed encodings) or the framing.
const CLIENT_MANAGED_HEADERS: [&str; 2] = ["accept-encoding", "transfer-encoding"];

#[derive(Clone, Debug)]
pub struct Options {
    pub classes_dir: PathBuf,
    pub package_xml: PathBuf,
    pub request_file: PathBuf,
    pub output_dir: PathBuf,
    pub message_field: String,
    pub class_extension: String,
    pub scheme: String,
    pub timeout_seconds: u64,
    pub rate: Option<u32>,
    pub proxy: Option<String>,
    pub header: Option<String>,
    pub follow_redirects: bool,
    pub strict_field: bool,
    pub abort_on_error: bool,
    pub verbose: u8,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            classes_dir: PathBuf::from("classes"),
            package_xml: PathBuf::from("package.xml"),
            request_file: PathBuf::from("req.txt"),
            output_dir: PathBuf::from(output::DEFAULT_OUTPUT_DIR),
            message_field: payload::DEFAULT_MESSAGE_FIELD.to_string(),
            class_extension: discovery::DEFAULT_CLASS_EXTENSION.to_string(),
            scheme: crate::request::DEFAULT_SCHEME.to_string(),
            timeout_seconds: 30,
            rate: None,
            proxy: None,
            header: None,
            follow_redirects: false,
            strict_field: false,
            abort_on_error: false,
            verbose: 0,
        }
    }
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("invalid scheme '{scheme}', expected http or https")]
    InvalidScheme { scheme: String },

    #[error("message field name must be non-empty and must not contain '=' or '&'")]
    InvalidMessageField,

    #[error("invalid rate {value}, expected a positive integer")]
    InvalidRate { value: u32 },

    #[error("invalid timeout {value}, expected a positive integer")]
    InvalidTimeout { value: u64 },

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    RequestTemplate(#[from] TemplateLoadError),

    #[error("field '{field}=' not found in the captured request body")]
    FieldNotFound { field: String },

    #[error("invalid header in request file: {name}")]
    InvalidHeader { name: String },

    #[error("invalid extra header '{header}', expected 'Key: Value'")]
    InvalidExtraHeader { header: String },

    #[error("failed to serialize action payload: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to build HTTP client: {source}")]
    HttpClientBuild {
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to setup proxy: {proxy}: {source}")]
    ProxySetup {
        proxy: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to create output directory {path}: {source}")]
    CreateOutputDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write result file {path}: {source}")]
    WriteArtifact {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("request for {candidate} failed: {source}")]
    Request {
        candidate: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Outcome of one replayed action call.
#[derive(Clone, Debug)]
pub struct ProbeResult {
    pub candidate: Candidate,
    pub status: Option<u16>,
    pub request_body: String,
    pub return_value: ReturnValue,
    pub sensitive: Vec<String>,
    pub artifact: PathBuf,
}

impl ProbeResult {
    pub fn qualified_name(&self) -> String {
        format!(
            "{}.{}",
            self.candidate.class_name, self.candidate.method_name
        )
    }

    pub fn status_label(&self) -> String {
        self.status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "ERR".to_string())
    }

    pub fn progress_line(&self) -> String {
        if self.sensitive.is_empty() {
            format!("{} -> {}", self.qualified_name(), self.status_label())
        } else {
            format!(
                "{} -> {} -> sensitive: {}",
                self.qualified_name(),
                self.status_label(),
                self.sensitive.join(", ")
            )
        }
    }

    fn styled_progress_line(&self) -> String {
        let status = match self.status {
            Some(s) if (200..300).contains(&s) => self.status_label().green(),
            Some(_) => self.status_label().yellow(),
            None => self.status_label().red(),
        };
        if self.sensitive.is_empty() {
            format!("{} -> {}", self.qualified_name().bold(), status)
        } else {
            format!(
                "{} -> {} -> {} {}",
                self.qualified_name().bold(),
                status,
                "sensitive:".bold().red(),
                self.sensitive.join(", ").red()
            )
        }
    }
}

#[derive(Clone, Debug)]
pub struct ScanResult {
    pub namespace: String,
    pub url: String,
    pub classes: usize,
    pub field_present: bool,
    pub candidates: Vec<Candidate>,
    pub results: Vec<ProbeResult>,
    /// Uncolored copy of every console line the run printed.
    pub console: Vec<String>,
    pub elapsed: Duration,
}

impl ScanResult {
    pub fn flagged(&self) -> impl Iterator<Item = &ProbeResult> {
        self.results.iter().filter(|r| !r.sensitive.is_empty())
    }
}

pub struct Runner {
    options: Options,
    discoverer: Box<dyn Discoverer + Send + Sync>,
    progress: ProgressBar,
}

impl Runner {
    pub fn new(options: Options) -> Result<Self, RunnerError> {
        if options.scheme != "http" && options.scheme != "https" {
            return Err(RunnerError::InvalidScheme {
                scheme: options.scheme.clone(),
            });
        }
        let field = options.message_field.trim();
        if field.is_empty() || field.contains('=') || field.contains('&') {
            return Err(RunnerError::InvalidMessageField);
        }
        if let Some(0) = options.rate {
            return Err(RunnerError::InvalidRate { value: 0 });
        }
        if options.timeout_seconds == 0 {
            return Err(RunnerError::InvalidTimeout { value: 0 });
        }
        let discoverer = PatternDiscoverer::new(&options.class_extension)?;
        Ok(Self {
            options,
            discoverer: Box::new(discoverer),
            progress: ProgressBar::hidden(),
        })
    }

    pub fn with_discoverer(mut self, discoverer: impl Discoverer + Send + Sync + 'static) -> Self {
        self.discoverer = Box::new(discoverer);
        self
    }

    /// Console lines are printed through `progress`; the default bar is hidden.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub async fn run(&self) -> Result<ScanResult, RunnerError> {
        let started_at = Instant::now();
        let options = &self.options;

        let namespace = discovery::resolve_namespace(&options.package_xml);
        let template = RequestTemplate::from_file(&options.request_file, &options.scheme)?;
        let headers = build_header_map(&template, options.header.as_deref())?;
        let found = self.discoverer.discover(&options.classes_dir)?;
        let candidates = found.candidates();
        let field = options.message_field.trim();
        let field_present = payload::has_field(template.body(), field);

        let mut scan = ScanResult {
            namespace,
            url: template.url().to_string(),
            classes: found.class_count(),
            field_present,
            candidates,
            results: Vec::new(),
            console: Vec::new(),
            elapsed: Duration::ZERO,
        };

        if scan.candidates.is_empty() {
            let line = "No @AuraEnabled no-parameter methods found.".to_string();
            self.emit(&mut scan.console, line.clone(), line);
            scan.elapsed = started_at.elapsed();
            return Ok(scan);
        }

        if !field_present {
            if options.strict_field {
                return Err(RunnerError::FieldNotFound {
                    field: field.to_string(),
                });
            }
            let message = format!(
                "field '{field}=' not found in the request body, every call replays the captured payload"
            );
            self.emit(
                &mut scan.console,
                format!("[WRN] {message}"),
                format!("{} {}", "[WRN]".bold().yellow(), message),
            );
        }

        let line = format!("Using namespace prefix: '{}'", scan.namespace);
        self.emit(&mut scan.console, line.clone(), format!("\n{line}\n"));
        if options.verbose > 0 {
            let line = format!(
                "POST {} ({} headers, {} candidates in {} classes)",
                scan.url,
                headers.len(),
                scan.candidates.len(),
                scan.classes
            );
            self.emit(&mut scan.console, line.clone(), line);
        }

        tokio::fs::create_dir_all(&options.output_dir)
            .await
            .map_err(|source| RunnerError::CreateOutputDir {
                path: options.output_dir.display().to_string(),
                source,
            })?;

        let client = build_client(options)?;
        let limiter = options
            .rate
            .and_then(NonZeroU32::new)
            .map(|rate| RateLimiter::direct(Quota::per_second(rate)));

        let mut names = output::ArtifactNames::default();
        self.progress.set_length(scan.candidates.len() as u64);
        for candidate in scan.candidates.iter() {
            if let Some(limiter) = limiter.as_ref() {
                limiter.until_ready().await;
            }
            let file_name = names.claim(&candidate.class_name, &candidate.method_name);
            let probe = self
                .probe(&client, &template, &headers, &scan.namespace, candidate, &file_name)
                .await?;
            self.emit(
                &mut scan.console,
                probe.progress_line(),
                probe.styled_progress_line(),
            );
            if options.verbose > 1 {
                let line = format!(
                    "   {} -> {}",
                    probe.return_value.kind().label(),
                    probe.artifact.display()
                );
                self.emit(&mut scan.console, line.clone(), line);
            }
            self.progress.inc(1);
            scan.results.push(probe);
        }

        scan.elapsed = started_at.elapsed();
        Ok(scan)
    }

    // A hidden bar (stderr not a terminal, or no bar given) drops `println`,
    // so those lines go straight to stdout.
    fn emit(&self, console: &mut Vec<String>, plain: String, styled: String) {
        if self.progress.is_hidden() {
            println!("{styled}");
        } else {
            self.progress.println(styled);
        }
        console.push(plain);
    }

    async fn probe(
        &self,
        client: &reqwest::Client,
        template: &RequestTemplate,
        headers: &HeaderMap,
        namespace: &str,
        candidate: &Candidate,
        file_name: &str,
    ) -> Result<ProbeResult, RunnerError> {
        let options = &self.options;
        let body = payload::synthesize_body(
            template.body(),
            options.message_field.trim(),
            namespace,
            &candidate.class_name,
            &candidate.method_name,
        )
        .map_err(|source| RunnerError::Serialize { source })?;

        let sent = client
            .post(template.url())
            .headers(headers.clone())
            .body(body.clone())
            .send()
            .await;

        let (status, return_value) = match sent {
            Ok(resp) => {
                let status = resp.status().as_u16();
                match resp.text().await {
                    Ok(text) => (Some(status), ReturnValue::from_response_body(&text)),
                    Err(e) => (Some(status), self.transport_failure(candidate, e)?),
                }
            }
            Err(e) => (None, self.transport_failure(candidate, e)?),
        };

        let text = return_value.text();
        let sensitive: Vec<String> = detector::sensitive_terms(&text)
            .into_iter()
            .map(String::from)
            .collect();

        let contents = output::render_artifact(&body, &text, &sensitive);
        let artifact = output::write_artifact(&options.output_dir, file_name, &contents)
            .await
            .map_err(|source| RunnerError::WriteArtifact {
                path: options.output_dir.join(file_name).display().to_string(),
                source,
            })?;

        Ok(ProbeResult {
            candidate: candidate.clone(),
            status,
            request_body: body,
            return_value,
            sensitive,
            artifact,
        })
    }

    fn transport_failure(
        &self,
        candidate: &Candidate,
        err: reqwest::Error,
    ) -> Result<ReturnValue, RunnerError> {
        if self.options.abort_on_error {
            return Err(RunnerError::Request {
                candidate: format!("{}.{}", candidate.class_name, candidate.method_name),
                source: err,
            });
        }
        Ok(ReturnValue::TransportError(err.to_string()))
    }
}

pub(crate) fn build_header_map(
    template: &RequestTemplate,
    extra_header: Option<&str>,
) -> Result<HeaderMap, RunnerError> {
    let mut headers = HeaderMap::new();
    for (name, value) in template.headers() {
        if CLIENT_MANAGED_HEADERS
            .iter()
            .any(|h| name.eq_ignore_ascii_case(h))
        {
            continue;
        }
        let key = HeaderName::from_str(name).map_err(|_| RunnerError::InvalidHeader {
            name: name.clone(),
        })?;
        let value = HeaderValue::from_str(value).map_err(|_| RunnerError::InvalidHeader {
            name: name.clone(),
        })?;
        headers.insert(key, value);
    }

    if let Some(extra) = extra_header.filter(|h| !h.trim().is_empty()) {
        let invalid = || RunnerError::InvalidExtraHeader {
            header: extra.to_string(),
        };
        let (name, value) = extra.split_once(':').ok_or_else(invalid)?;
        let key = HeaderName::from_str(name.trim()).map_err(|_| invalid())?;
        let value = HeaderValue::from_str(value.trim()).map_err(|_| invalid())?;
        headers.append(key, value);
    }
    Ok(headers)
}

fn build_client(options: &Options) -> Result<reqwest::Client, RunnerError> {
    let mut builder = reqwest::Client::builder()
        .redirect(if options.follow_redirects {
            redirect::Policy::limited(10)
        } else {
            redirect::Policy::none()
        })
        .timeout(Duration::from_secs(options.timeout_seconds))
        .danger_accept_invalid_hostnames(true)
        .danger_accept_invalid_certs(true);
    // Only an explicit proxy is used; environment proxy variables are ignored.
    match options.proxy.as_deref().filter(|p| !p.trim().is_empty()) {
        Some(proxy) => {
            let proxy_cfg =
                reqwest::Proxy::all(proxy).map_err(|source| RunnerError::ProxySetup {
                    proxy: proxy.to_string(),
                    source,
                })?;
            builder = builder.proxy(proxy_cfg);
        }
        None => builder = builder.no_proxy(),
    }
    builder
        .build()
        .map_err(|source| RunnerError::HttpClientBuild { source })
}
