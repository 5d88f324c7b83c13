use std::time::Duration;

use reqwest::blocking::{Client, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::build_info;
use crate::client::TestRailApi;
use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::model::{AddCase, AddSection, AddSharedStep, AddSuite, Case, Section, SharedStep, Suite};

const API_PREFIX: &str = "index.php?/api/v2/";

/// Blocking TestRail v2 client using basic auth with an API key.
pub struct HttpClient {
    client: Client,
    base_url: String,
    user: String,
    api_key: String,
}

impl HttpClient {
    pub fn new(config: &Config) -> Result<Self> {
        let (host, user, api_key) = config.credentials()?;
        let user_agent = match build_info::git_sha() {
            Some(sha) => format!("railsync/{} ({sha})", env!("CARGO_PKG_VERSION")),
            None => format!("railsync/{}", env!("CARGO_PKG_VERSION")),
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            base_url: normalize_host(host),
            user: user.to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_PREFIX, path)
    }

    fn get_value(&self, path: &str) -> Result<Value> {
        let url = self.url(path);
        debug!(%url, "GET");
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.user, Some(&self.api_key))
            .send()?;
        read_json(response)
    }

    fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.url(path);
        debug!(%url, "POST");
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.user, Some(&self.api_key))
            .json(body)
            .send()?;
        Ok(serde_json::from_value(read_json(response)?)?)
    }

    /// Fetch every page of a list endpoint. Accepts both the legacy bare
    /// array and the paginated `{ "<key>": [...], "_links": {"next": ...} }`.
    fn get_list<T: DeserializeOwned>(&self, path: &str, key: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(path.to_string());

        while let Some(page) = next.take() {
            let value = self.get_value(&page)?;
            let (batch, link) = split_page(value, key)?;
            items.extend(
                batch
                    .into_iter()
                    .map(serde_json::from_value)
                    .collect::<std::result::Result<Vec<T>, _>>()?,
            );
            next = link;
        }

        Ok(items)
    }
}

fn normalize_host(host: &str) -> String {
    let trimmed = host.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        format!("{trimmed}/")
    } else {
        format!("https://{trimmed}/")
    }
}

fn read_json(response: Response) -> Result<Value> {
    let status = response.status();
    let body = response.text()?;
    if !status.is_success() {
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
            .unwrap_or(body);
        return Err(SyncError::Api {
            status: status.as_u16(),
            message,
        });
    }
    Ok(serde_json::from_str(&body)?)
}

/// Split one list response into its items and the next-page path.
fn split_page(value: Value, key: &str) -> Result<(Vec<Value>, Option<String>)> {
    match value {
        Value::Array(items) => Ok((items, None)),
        Value::Object(mut map) => {
            let next = map
                .get("_links")
                .and_then(|links| links.get("next"))
                .and_then(Value::as_str)
                .map(|link| link.trim_start_matches('/').trim_start_matches("api/v2/").to_string());
            match map.remove(key) {
                Some(Value::Array(items)) => Ok((items, next)),
                _ => Err(SyncError::Api {
                    status: 200,
                    message: format!("response is missing the `{key}` list"),
                }),
            }
        }
        other => Err(SyncError::Api {
            status: 200,
            message: format!("unexpected list response: {other}"),
        }),
    }
}

impl TestRailApi for HttpClient {
    fn get_suites(&self, project_id: u64) -> Result<Vec<Suite>> {
        self.get_list(&format!("get_suites/{project_id}"), "suites")
    }

    fn get_sections(&self, project_id: u64, suite_id: u64) -> Result<Vec<Section>> {
        self.get_list(
            &format!("get_sections/{project_id}&suite_id={suite_id}"),
            "sections",
        )
    }

    fn get_shared_steps(&self, project_id: u64) -> Result<Vec<SharedStep>> {
        self.get_list(&format!("get_shared_steps/{project_id}"), "shared_steps")
    }

    fn get_cases(&self, project_id: u64, suite_id: u64) -> Result<Vec<Case>> {
        self.get_list(
            &format!("get_cases/{project_id}&suite_id={suite_id}"),
            "cases",
        )
    }

    fn add_suite(&self, project_id: u64, request: &AddSuite) -> Result<Suite> {
        self.post(&format!("add_suite/{project_id}"), request)
    }

    fn add_section(&self, project_id: u64, request: &AddSection) -> Result<Section> {
        self.post(&format!("add_section/{project_id}"), request)
    }

    fn add_shared_step(&self, project_id: u64, request: &AddSharedStep) -> Result<SharedStep> {
        self.post(&format!("add_shared_step/{project_id}"), request)
    }

    fn add_case(&self, section_id: u64, request: &AddCase) -> Result<Case> {
        self.post(&format!("add_case/{section_id}"), request)
    }
}
