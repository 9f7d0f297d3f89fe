use std::fs::File;
use std::io;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::{multipart, Client, Response};
use reqwest::header;
use serde::Deserialize;
use url::Url;

use super::{AnalysisHandle, ContainerKind, ContainerNode, FileNode, Parents, Platform, Stats};
use crate::errors::GearError;

const USER_AGENT: &str = concat!("gambas-gear/", env!("CARGO_PKG_VERSION"));

/// Flywheel-style REST client.
///
/// API keys look like `host:secret` or `host:port:secret`; everything before
/// the last colon is the site address.
pub struct HttpPlatform {
    client: Client,
    base: Url,
}

#[derive(Deserialize)]
struct NumberOf {
    #[serde(default)]
    subjects: u64,
    #[serde(default)]
    sessions: u64,
    #[serde(default)]
    acquisitions: u64,
}

#[derive(Deserialize)]
struct StatsDoc {
    number_of: Option<NumberOf>,
}

#[derive(Deserialize)]
struct ContainerDoc {
    #[serde(rename = "_id", alias = "id")]
    id: String,
    #[serde(default)]
    label: String,
    #[serde(default)]
    parents: Parents,
    #[serde(default)]
    stats: Option<StatsDoc>,
    #[serde(default)]
    files: Vec<FileDoc>,
}

#[derive(Deserialize)]
struct FileDoc {
    name: String,
    #[serde(rename = "type", default)]
    file_type: Option<String>,
}

#[derive(Deserialize)]
struct ParentRef {
    #[serde(rename = "type")]
    kind: String,
    id: String,
}

#[derive(Deserialize)]
struct AnalysisDoc {
    parent: ParentRef,
}

#[derive(Deserialize)]
struct CreatedDoc {
    #[serde(rename = "_id", alias = "id")]
    id: String,
}

/// Split an API key into (https base url, full key used for auth).
pub fn parse_api_key(key: &str) -> Result<Url, GearError> {
    let key = key.trim();
    let (site, secret) = key
        .rsplit_once(':')
        .ok_or_else(|| GearError::config("API key must look like <host>:<secret>"))?;
    if site.is_empty() || secret.is_empty() {
        return Err(GearError::config("API key must look like <host>:<secret>"));
    }
    let site = site.trim_start_matches("https://").trim_start_matches("http://");
    Url::parse(&format!("https://{site}/api/"))
        .map_err(|e| GearError::config(format!("API key host is not a valid address: {e}")))
}

impl HttpPlatform {
    pub fn new(api_key: &str) -> Result<Self, GearError> {
        let base = parse_api_key(api_key)?;
        let mut headers = header::HeaderMap::new();
        let auth = header::HeaderValue::from_str(&format!("scitran-user {}", api_key.trim()))
            .map_err(|_| GearError::config("API key contains characters not allowed in a header"))?;
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert(header::USER_AGENT, header::HeaderValue::from_static(USER_AGENT));

        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(30))
            .timeout(None)
            .build()?;
        Ok(Self { client, base })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, GearError> {
        let path = segments
            .iter()
            .map(|s| urlencoding::encode(s).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        self.base
            .join(&path)
            .map_err(|e| GearError::platform(format!("bad request path {path}: {e}")))
    }

    fn get_json<T: for<'de> Deserialize<'de>>(&self, segments: &[&str]) -> Result<T, GearError> {
        let url = self.url(segments)?;
        tracing::debug!(%url, "GET");
        let resp = check(self.client.get(url).send()?)?;
        Ok(resp.json()?)
    }

    fn collection(&self, kind: ContainerKind) -> &'static str {
        match kind {
            ContainerKind::Project => "projects",
            ContainerKind::Subject => "subjects",
            ContainerKind::Session => "sessions",
            ContainerKind::Acquisition => "acquisitions",
            ContainerKind::File => "files",
        }
    }

    fn fetch(&self, kind: ContainerKind, id: &str) -> Result<ContainerNode, GearError> {
        let doc: ContainerDoc = self.get_json(&[self.collection(kind), id])?;
        Ok(into_node(doc, kind))
    }
}

fn check(resp: Response) -> Result<Response, GearError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let url = resp.url().to_string();
    let body = resp.text().unwrap_or_default();
    let snippet: String = body.chars().take(200).collect();
    Err(GearError::platform(format!("{status} from {url}: {snippet}")))
}

fn into_node(doc: ContainerDoc, kind: ContainerKind) -> ContainerNode {
    let stats = doc.stats.and_then(|s| s.number_of).map(|n| Stats {
        subjects: n.subjects,
        sessions: n.sessions,
        acquisitions: n.acquisitions,
    });
    ContainerNode {
        id: doc.id,
        kind,
        label: doc.label,
        parents: doc.parents,
        stats,
    }
}

impl Platform for HttpPlatform {
    fn container(&self, id: &str) -> Result<ContainerNode, GearError> {
        // The generic lookup endpoint does not say which kind came back, so probe in order.
        let mut last = None;
        for kind in [
            ContainerKind::Session,
            ContainerKind::Subject,
            ContainerKind::Project,
            ContainerKind::Acquisition,
        ] {
            match self.fetch(kind, id) {
                Ok(node) => return Ok(node),
                Err(e) => last = Some(e),
            }
        }
        Err(last.unwrap_or_else(|| GearError::platform(format!("container {id} not found"))))
    }

    fn analysis_parent(&self, analysis_id: &str) -> Result<ContainerNode, GearError> {
        let doc: AnalysisDoc = self.get_json(&["analyses", analysis_id])?;
        let kind = ContainerKind::parse(&doc.parent.kind).ok_or_else(|| {
            GearError::platform(format!(
                "analysis {analysis_id} has unsupported parent type {}",
                doc.parent.kind
            ))
        })?;
        self.fetch(kind, &doc.parent.id)
    }

    fn children(&self, node: &ContainerNode) -> Result<Vec<ContainerNode>, GearError> {
        let child = match node.kind {
            ContainerKind::Project | ContainerKind::Subject | ContainerKind::Session => {
                node.kind.child().unwrap_or(ContainerKind::File)
            }
            _ => return Ok(Vec::new()),
        };
        let docs: Vec<ContainerDoc> = self.get_json(&[
            self.collection(node.kind),
            &node.id,
            self.collection(child),
        ])?;
        Ok(docs.into_iter().map(|d| into_node(d, child)).collect())
    }

    fn files(&self, acquisition: &ContainerNode) -> Result<Vec<FileNode>, GearError> {
        let doc: ContainerDoc = self.get_json(&["acquisitions", &acquisition.id])?;
        Ok(doc
            .files
            .into_iter()
            .map(|f| FileNode {
                name: f.name,
                file_type: f.file_type.unwrap_or_default(),
                acquisition_id: acquisition.id.clone(),
            })
            .collect())
    }

    fn download(&self, file: &FileNode, dest: &Path) -> Result<(), GearError> {
        let url = self.url(&["acquisitions", &file.acquisition_id, "files", &file.name])?;
        tracing::debug!(%url, dest = %dest.display(), "download");
        let mut resp = check(self.client.get(url).send()?)?;
        let mut out = File::create(dest)?;
        resp.copy_to(&mut out)?;
        io::Write::flush(&mut out)?;
        Ok(())
    }

    fn create_analysis(
        &self,
        session_id: &str,
        label: &str,
        info: &serde_json::Value,
    ) -> Result<AnalysisHandle, GearError> {
        let url = self.url(&["sessions", session_id, "analyses"])?;
        let created: CreatedDoc = check(
            self.client
                .post(url)
                .json(&serde_json::json!({ "label": label }))
                .send()?,
        )?
        .json()?;

        let info_url = self.url(&["analyses", &created.id, "info"])?;
        check(
            self.client
                .post(info_url)
                .json(&serde_json::json!({ "set": info }))
                .send()?,
        )?;

        Ok(AnalysisHandle {
            id: created.id,
            session_id: session_id.to_string(),
        })
    }

    fn upload_output(&self, analysis: &AnalysisHandle, path: &Path) -> Result<(), GearError> {
        let url = self.url(&["analyses", &analysis.id, "files"])?;
        let form = multipart::Form::new().file("file", path)?;
        check(self.client.post(url).multipart(form).send()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_api_key_host_and_port() {
        let url = parse_api_key("site.flywheel.io:8443:abcdef").expect("valid");
        assert_eq!(url.as_str(), "https://site.flywheel.io:8443/api/");
        let url = parse_api_key("site.flywheel.io:abcdef").expect("valid");
        assert_eq!(url.as_str(), "https://site.flywheel.io/api/");
    }

    #[test]
    fn test_parse_api_key_rejects_bare_secret() {
        assert!(parse_api_key("abcdef").is_err());
        assert!(parse_api_key(":abcdef").is_err());
    }

    #[test]
    fn test_url_encodes_file_names() {
        let p = HttpPlatform::new("example.org:key").expect("client");
        let url = p
            .url(&["acquisitions", "a1", "files", "T2 axi #1.nii.gz"])
            .expect("url");
        assert_eq!(
            url.as_str(),
            "https://example.org/api/acquisitions/a1/files/T2%20axi%20%231.nii.gz"
        );
    }
}
