//! [`RemoteSession`] over the W3C WebDriver HTTP protocol.
//!
//! The portal's page structure is not known to this module: every element it
//! touches comes from a [`PortalProfile`] loaded from JSON, and browser tweaks
//! (headless flags, download preferences) are profile settings too.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use reqwest::Method;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, instrument};

use crate::timesheet::tools::error::{Result, ToolError};
use crate::timesheet::tools::model::{Credentials, DateRange};
use crate::timesheet::tools::remote::{RemoteSession, SessionFactory};

/// Key under which WebDriver returns element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
const WAIT_STEP: Duration = Duration::from_millis(250);

/// How to find one element on a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locator {
    Xpath(String),
    Css(String),
}

impl Locator {
    fn strategy(&self) -> &'static str {
        match self {
            Locator::Xpath(_) => "xpath",
            Locator::Css(_) => "css selector",
        }
    }

    fn selector(&self) -> &str {
        match self {
            Locator::Xpath(value) | Locator::Css(value) => value,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.strategy(), self.selector())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginLocators {
    pub username: Locator,
    pub password: Locator,
    pub submit: Locator,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeLocators {
    /// Opens the scope picker.
    pub open: Locator,
    /// Free-text filter inside the picker.
    pub search: Locator,
    /// Matches every visible option; the option text is compared to the
    /// client name case-insensitively.
    pub options: Locator,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateLocators {
    pub from: Locator,
    pub to: Locator,
    pub search: Locator,
}

/// Browser launch settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserOptions {
    #[serde(default = "default_browser_name")]
    pub name: String,
    #[serde(default = "default_true")]
    pub headless: bool,
    #[serde(default = "default_headless_args")]
    pub headless_args: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
    /// Sends the Chromium `Page.setDownloadBehavior` command after start-up so
    /// headless sessions are allowed to save files.
    #[serde(default = "default_true")]
    pub allow_downloads: bool,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            name: default_browser_name(),
            headless: true,
            headless_args: default_headless_args(),
            args: Vec::new(),
            allow_downloads: true,
        }
    }
}

/// Everything the driver needs to know about one portal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalProfile {
    pub base_url: String,
    #[serde(default)]
    pub browser: BrowserOptions,
    pub login: LoginLocators,
    /// Elements clicked in order after logging in to reach the export page.
    #[serde(default)]
    pub navigation: Vec<Locator>,
    pub scope: ScopeLocators,
    pub dates: DateLocators,
    /// Matches rows of the search result table.
    pub result_rows: Locator,
    pub export: Locator,
    /// How long to wait for any single element to appear.
    #[serde(default = "default_element_timeout_secs")]
    pub element_timeout_secs: u64,
    /// Pause after typing into filters that update asynchronously.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

impl PortalProfile {
    /// Reads a profile from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ToolError::MissingInput(path.to_path_buf()));
        }
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    fn element_timeout(&self) -> Duration {
        Duration::from_secs(self.element_timeout_secs)
    }

    fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

fn default_browser_name() -> String {
    "MicrosoftEdge".to_string()
}

fn default_true() -> bool {
    true
}

fn default_headless_args() -> Vec<String> {
    ["--headless=new", "--disable-gpu", "--window-size=1920,1080"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_element_timeout_secs() -> u64 {
    30
}

fn default_settle_ms() -> u64 {
    1000
}

/// Starts one WebDriver session per client against a running driver
/// (msedgedriver, chromedriver, or a Selenium grid).
pub struct WebDriverFactory {
    endpoint: String,
    profile: Arc<PortalProfile>,
    download_dir: PathBuf,
    results_timeout: Duration,
    http: Client,
}

impl WebDriverFactory {
    /// `download_dir` should be absolute; browsers ignore relative
    /// download preferences.
    pub fn new(
        endpoint: impl Into<String>,
        profile: PortalProfile,
        download_dir: PathBuf,
        results_timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            profile: Arc::new(profile),
            download_dir,
            results_timeout,
            http,
        })
    }

    fn capabilities(&self) -> Value {
        let browser = &self.profile.browser;
        let mut args = browser.args.clone();
        if browser.headless {
            args.extend(browser.headless_args.iter().cloned());
        }
        let download_dir = self.download_dir.display().to_string();
        let options = json!({
            "args": args,
            "prefs": {
                "download.default_directory": download_dir,
                "download.prompt_for_download": false,
                "download.directory_upgrade": true,
                "safebrowsing.enabled": true,
                "profile.default_content_settings.popups": 0
            }
        });

        let mut always_match = serde_json::Map::new();
        always_match.insert("browserName".into(), Value::String(browser.name.clone()));
        always_match.insert(vendor_options_key(&browser.name).into(), options);
        json!({ "capabilities": { "alwaysMatch": Value::Object(always_match) } })
    }
}

fn vendor_options_key(browser_name: &str) -> &'static str {
    if browser_name.to_ascii_lowercase().contains("edge") {
        "ms:edgeOptions"
    } else {
        "goog:chromeOptions"
    }
}

impl SessionFactory for WebDriverFactory {
    #[instrument(level = "debug", skip_all, fields(endpoint = %self.endpoint))]
    fn open(&self) -> Result<Box<dyn RemoteSession>> {
        let response = self
            .http
            .post(format!("{}/session", self.endpoint))
            .json(&self.capabilities())
            .send()?;
        let status = response.status();
        let payload: Value = response.json()?;
        let value = payload.get("value").cloned().unwrap_or(Value::Null);
        if !status.is_success() {
            return Err(driver_error(&value));
        }
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::Remote("driver returned no session id".into()))?
            .to_string();
        debug!(%session_id, "browser session started");

        let session = WebDriverSession {
            base: format!("{}/session/{}", self.endpoint, session_id),
            profile: Arc::clone(&self.profile),
            results_timeout: self.results_timeout,
            http: self.http.clone(),
            closed: false,
        };
        if self.profile.browser.allow_downloads {
            session.allow_downloads(&self.download_dir);
        }
        Ok(Box::new(session))
    }
}

enum Reply {
    Value(Value),
    Failed { error: String, message: String },
}

pub struct WebDriverSession {
    base: String,
    profile: Arc<PortalProfile>,
    results_timeout: Duration,
    http: Client,
    closed: bool,
}

impl WebDriverSession {
    fn send(&self, method: Method, path: &str, body: Option<Value>) -> Result<Reply> {
        let url = if path.is_empty() {
            self.base.clone()
        } else {
            format!("{}/{}", self.base, path)
        };
        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send()?;
        let status = response.status();
        let payload: Value = response.json()?;
        let value = payload.get("value").cloned().unwrap_or(Value::Null);
        if status.is_success() {
            return Ok(Reply::Value(value));
        }
        Ok(Reply::Failed {
            error: field_text(&value, "error"),
            message: field_text(&value, "message"),
        })
    }

    fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        match self.send(method, path, body)? {
            Reply::Value(value) => Ok(value),
            Reply::Failed { error, message } => {
                Err(ToolError::Remote(format!("{path}: {error}: {message}")))
            }
        }
    }

    fn allow_downloads(&self, dir: &Path) {
        let body = json!({
            "cmd": "Page.setDownloadBehavior",
            "params": { "behavior": "allow", "downloadPath": dir.display().to_string() }
        });
        // Only Chromium drivers expose this endpoint.
        if let Err(error) = self.command(Method::POST, "chromium/send_command", Some(body)) {
            debug!(%error, "download behaviour override not applied");
        }
    }

    fn try_find(&self, locator: &Locator) -> Result<Option<String>> {
        let body = json!({ "using": locator.strategy(), "value": locator.selector() });
        match self.send(Method::POST, "element", Some(body))? {
            Reply::Value(value) => Ok(element_id(&value)),
            Reply::Failed { error, .. } if error == "no such element" => Ok(None),
            Reply::Failed { error, message } => {
                Err(ToolError::Remote(format!("find {locator}: {error}: {message}")))
            }
        }
    }

    fn find_all(&self, locator: &Locator) -> Result<Vec<String>> {
        let body = json!({ "using": locator.strategy(), "value": locator.selector() });
        let value = self.command(Method::POST, "elements", Some(body))?;
        Ok(value
            .as_array()
            .map(|items| items.iter().filter_map(element_id).collect())
            .unwrap_or_default())
    }

    fn wait_for(&self, locator: &Locator) -> Result<String> {
        let deadline = Instant::now() + self.profile.element_timeout();
        loop {
            if let Some(id) = self.try_find(locator)? {
                return Ok(id);
            }
            if Instant::now() >= deadline {
                return Err(ToolError::Remote(format!("timed out waiting for {locator}")));
            }
            thread::sleep(WAIT_STEP);
        }
    }

    /// Clicks once the element exists and accepts the click.
    fn click(&self, locator: &Locator) -> Result<()> {
        let deadline = Instant::now() + self.profile.element_timeout();
        loop {
            let id = self.wait_for(locator)?;
            match self.send(Method::POST, &format!("element/{id}/click"), Some(json!({})))? {
                Reply::Value(_) => return Ok(()),
                Reply::Failed { error, message } => {
                    let retryable = matches!(
                        error.as_str(),
                        "element not interactable"
                            | "element click intercepted"
                            | "stale element reference"
                    );
                    if !retryable || Instant::now() >= deadline {
                        return Err(ToolError::Remote(format!(
                            "click {locator}: {error}: {message}"
                        )));
                    }
                    thread::sleep(WAIT_STEP);
                }
            }
        }
    }

    fn type_into(&self, locator: &Locator, text: &str, clear: bool) -> Result<()> {
        let id = self.wait_for(locator)?;
        if clear {
            self.command(Method::POST, &format!("element/{id}/clear"), Some(json!({})))?;
        }
        self.command(
            Method::POST,
            &format!("element/{id}/value"),
            Some(json!({ "text": text })),
        )?;
        Ok(())
    }

    fn text_of(&self, id: &str) -> Result<String> {
        let value = self.command(Method::GET, &format!("element/{id}/text"), None)?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }
}

impl RemoteSession for WebDriverSession {
    fn authenticate(&mut self, credentials: &Credentials) -> Result<()> {
        let profile = Arc::clone(&self.profile);
        self.command(Method::POST, "url", Some(json!({ "url": profile.base_url })))?;
        self.type_into(&profile.login.username, &credentials.username, false)?;
        self.type_into(&profile.login.password, &credentials.password, false)?;
        self.click(&profile.login.submit)?;
        for step in &profile.navigation {
            self.click(step)?;
        }
        info!("logged in to portal");
        Ok(())
    }

    fn select_scope(&mut self, name: &str) -> Result<bool> {
        let profile = Arc::clone(&self.profile);
        thread::sleep(profile.settle());
        self.click(&profile.scope.open)?;
        self.type_into(&profile.scope.search, name, true)?;
        thread::sleep(profile.settle());

        let wanted = name.trim().to_lowercase();
        for id in self.find_all(&profile.scope.options)? {
            if self.text_of(&id)?.trim().to_lowercase() == wanted {
                self.command(Method::POST, &format!("element/{id}/click"), Some(json!({})))?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn set_date_range(&mut self, range: &DateRange) -> Result<()> {
        let profile = Arc::clone(&self.profile);
        self.type_into(&profile.dates.from, &range.from_text(), false)?;
        self.type_into(&profile.dates.to, &range.to_text(), false)?;
        self.click(&profile.dates.search)
    }

    fn has_result_rows(&mut self) -> Result<bool> {
        let deadline = Instant::now() + self.results_timeout;
        loop {
            if !self.find_all(&self.profile.result_rows)?.is_empty() {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            thread::sleep(WAIT_STEP);
        }
    }

    fn trigger_export(&mut self) -> Result<()> {
        let profile = Arc::clone(&self.profile);
        self.click(&profile.export)
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.command(Method::DELETE, "", None)?;
        Ok(())
    }
}

fn element_id(value: &Value) -> Option<String> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn field_text(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn driver_error(value: &Value) -> ToolError {
    ToolError::Remote(format!(
        "{}: {}",
        field_text(value, "error"),
        field_text(value, "message")
    ))
}
