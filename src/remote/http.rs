//! HTTP workspace client
//!
//! Signs in once, keeps the session cookie, and addresses collections under
//! `{server}/api/shared_spaces/{shared_space}/workspaces/{workspace}`.

use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::entities::{field, EntityModel};

use super::{Query, RemoteError, RemoteRecord, Workspace};

/// Page size for collection reads
const PAGE_SIZE: usize = 1000;

/// Where and how to connect
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub server: String,
    pub shared_space: u64,
    pub workspace: u64,
    pub user: String,
    pub password: String,
    pub proxy: Option<ProxySettings>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySettings {
    pub host: String,
    pub port: u16,
}

impl ProxySettings {
    pub fn url(&self) -> String {
        if self.host.contains("://") {
            format!("{}:{}", self.host, self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }
}

impl ConnectionSettings {
    /// Base URL of the workspace REST API
    pub fn workspace_url(&self) -> String {
        format!(
            "{}/api/shared_spaces/{}/workspaces/{}",
            self.server.trim_end_matches('/'),
            self.shared_space,
            self.workspace
        )
    }

    fn sign_in_url(&self) -> String {
        format!("{}/authentication/sign_in", self.server.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    total_count: Option<usize>,
    #[serde(default)]
    data: Vec<RemoteRecord>,
}

/// [`Workspace`] backed by the REST API
pub struct HttpWorkspace {
    client: Client,
    base_url: String,
}

impl HttpWorkspace {
    /// Build the client and sign in
    pub fn connect(settings: &ConnectionSettings) -> Result<Self, RemoteError> {
        reqwest::Url::parse(&settings.server).map_err(|e| RemoteError::InvalidUrl {
            url: settings.server.clone(),
            message: e.to_string(),
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("hpeclienttype"),
            HeaderValue::from_static("HPE_REST_API_TECH_PREVIEW"),
        );
        headers.insert(
            HeaderName::from_static("alm_octane_tech_preview"),
            HeaderValue::from_static("true"),
        );

        let mut builder = Client::builder()
            .cookie_store(true)
            .default_headers(headers)
            .timeout(settings.timeout);

        if let Some(proxy) = &settings.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy.url())?);
        }

        let client = builder.build()?;

        let response = client
            .post(settings.sign_in_url())
            .json(&json!({"user": settings.user, "password": settings.password}))
            .send()?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = error_message(response);
            return Err(RemoteError::Authentication(format!(
                "status {}: {}",
                status, message
            )));
        }

        Ok(Self {
            client,
            base_url: settings.workspace_url(),
        })
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{}", self.base_url, collection)
    }
}

impl Workspace for HttpWorkspace {
    fn query(
        &self,
        collection: &str,
        fields: &[&str],
        filter: Option<&Query>,
    ) -> Result<Vec<RemoteRecord>, RemoteError> {
        let url = self.collection_url(collection);
        let mut selected: Vec<&str> = vec![field::ID, field::TYPE];
        for f in fields {
            if !selected.contains(f) {
                selected.push(*f);
            }
        }
        let fields_param = selected.join(",");

        let mut records = Vec::new();
        let mut offset = 0;

        loop {
            let mut params = vec![
                ("fields", fields_param.clone()),
                ("limit", PAGE_SIZE.to_string()),
                ("offset", offset.to_string()),
            ];
            if let Some(q) = filter {
                params.push(("query", format!("\"{}\"", q)));
            }

            debug!(collection, offset, "querying collection");
            let response = self.client.get(&url).query(&params).send()?;
            let page: Page = parse_json(&url, response)?;

            let received = page.data.len();
            records.extend(page.data);
            offset += received;

            let total = page.total_count.unwrap_or(records.len());
            if received == 0 || records.len() >= total {
                break;
            }
        }

        Ok(records)
    }

    fn create(&self, collection: &str, entity: &EntityModel) -> Result<RemoteRecord, RemoteError> {
        let url = self.collection_url(collection);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "data": [entity] }))
            .send()?;

        let page: Page = parse_json(&url, response)?;
        page.data
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::NothingCreated {
                collection: collection.to_string(),
            })
    }

    fn put_script(&self, test_id: &str, body: &str) -> Result<(), RemoteError> {
        let url = format!("{}/tests/{}/script", self.base_url, test_id);
        let response = self
            .client
            .put(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .send()?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status().as_u16();
            Err(RemoteError::Status {
                url,
                status,
                message: error_message(response),
            })
        }
    }
}

fn parse_json<T: DeserializeOwned>(url: &str, response: Response) -> Result<T, RemoteError> {
    let status = response.status();
    if !status.is_success() {
        return Err(RemoteError::Status {
            url: url.to_string(),
            status: status.as_u16(),
            message: error_message(response),
        });
    }

    response
        .json::<T>()
        .map_err(|e| RemoteError::Response(format!("{}: {}", url, e)))
}

/// Pull the most useful message out of an error body
fn error_message(response: Response) -> String {
    let text = response.text().unwrap_or_default();
    describe_error_body(&text)
}

fn describe_error_body(text: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return text.trim().to_string();
    };

    // Partial failures nest their error models under "errors"
    let described = value
        .get("errors")
        .and_then(|errors| errors.as_array())
        .and_then(|errors| errors.first())
        .and_then(|first| first.get("description"))
        .or_else(|| value.get("description"))
        .and_then(Value::as_str);

    match described {
        Some(description) => description.to_string(),
        None => text.trim().to_string(),
    }
}
