//! Page transport
//!
//! `HttpTransport` talks to the live UI over HTTPS, carrying the session in a
//! cookie jar and presenting itself like a desktop browser. Test builds add
//! `ScriptedTransport`, which serves fixture pages without a network.

use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_CHARSET, ACCEPT_LANGUAGE};
use reqwest::Client;
use std::sync::Arc;
#[cfg(test)]
use std::sync::Mutex;
use std::time::Duration;

/// Browser identities rotated across accounts
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (X11; U; Linux x86_64; en-US; rv:1.9.0.5) Gecko/2008121623 Ubuntu/8.10 (intrepid) Firefox/3.0.5",
    "Mozilla/5.0 (Windows; U; Windows NT 6.0; en-US; rv:1.9.0.5) Gecko/2008120122 Firefox/3.0.5 (.NET CLR 3.5.30729)",
    "Mozilla/5.0 (Windows; U; Windows NT 5.1; en-US) AppleWebKit/525.27.1 (KHTML, like Gecko) Version/3.2.1 Safari/525.27.1",
    "Mozilla/5.0 (Windows; U; Windows NT 5.1; en-US) AppleWebKit/525.19 (KHTML, like Gecko) Chrome/1.0.154.43 Safari/525.19",
    "Opera/9.63 (Windows NT 5.1; U; en) Presto/2.1.1",
    "Mozilla/4.0 (compatible; MSIE 7.0; Windows NT 6.0; SLCC1; .NET CLR 2.0.50727; Media Center PC 5.0; .NET CLR 3.5.30729; .NET CLR 3.0.30618)",
];

/// Stable user agent for an account, so one account always looks like one browser
pub fn user_agent_for(email: &str) -> &'static str {
    let hash = email
        .bytes()
        .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
    USER_AGENTS[hash % USER_AGENTS.len()]
}

/// One page request; a form turns it into a urlencoded POST
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub url: String,
    pub form: Option<Vec<(String, String)>>,
}

impl PageRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            form: None,
        }
    }

    pub fn post(url: impl Into<String>, form: Vec<(String, String)>) -> Self {
        Self {
            url: url.into(),
            form: Some(form),
        }
    }

    /// Form field lookup (tests and logging)
    pub fn field(&self, name: &str) -> Option<&str> {
        self.form
            .as_ref()?
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Final URL after redirects plus the body text
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PageResponse {
    pub url: String,
    pub body: String,
}

impl PageResponse {
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            body: body.into(),
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, request: &PageRequest) -> Result<PageResponse>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn fetch(&self, request: &PageRequest) -> Result<PageResponse> {
        self.as_ref().fetch(request).await
    }
}

/// Cookie-carrying HTTP transport
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-us,en;q=0.5"));
        headers.insert(
            ACCEPT_CHARSET,
            HeaderValue::from_static("ISO-8859-1,utf-8;q=0.7,*;q=0.7"),
        );

        let client = Client::builder()
            .cookie_store(true)
            .user_agent(user_agent.to_string())
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, request: &PageRequest) -> Result<PageResponse> {
        tracing::debug!(url = %request.url, post = request.form.is_some(), "Remote request");

        let builder = match &request.form {
            Some(form) => self.client.post(&request.url).form(form),
            None => self.client.get(&request.url),
        };

        let response = builder.send().await?;
        let final_url = response.url().to_string();
        if final_url != request.url {
            tracing::debug!(redirected_to = %final_url, "Remote redirect");
        }
        let body = response.text().await?;

        Ok(PageResponse {
            url: final_url,
            body,
        })
    }
}

/// Fixture transport
///
/// Routes are matched in registration order by URL substring. A request with no
/// matching route is answered with its own URL and an empty body, which is what
/// plain navigation steps need.
#[cfg(test)]
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<PageRequest>>,
}

#[cfg(test)]
struct Route {
    fragment: String,
    response: PageResponse,
    once: bool,
}

#[cfg(test)]
impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every request whose URL contains `fragment`
    pub fn route(self, fragment: &str, final_url: &str, body: &str) -> Self {
        self.push(fragment, final_url, body, false);
        self
    }

    /// Answer only the first matching request, then fall through to later routes
    pub fn route_once(self, fragment: &str, final_url: &str, body: &str) -> Self {
        self.push(fragment, final_url, body, true);
        self
    }

    fn push(&self, fragment: &str, final_url: &str, body: &str, once: bool) {
        if let Ok(mut routes) = self.routes.lock() {
            routes.push(Route {
                fragment: fragment.to_string(),
                response: PageResponse::new(final_url, body),
                once,
            });
        }
    }

    /// Every request served so far, in order
    pub fn requests(&self) -> Vec<PageRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[async_trait]
impl Transport for ScriptedTransport {
    async fn fetch(&self, request: &PageRequest) -> Result<PageResponse> {
        self.requests
            .lock()
            .map_err(|_| Error::Internal("scripted transport poisoned".to_string()))?
            .push(request.clone());

        let mut routes = self
            .routes
            .lock()
            .map_err(|_| Error::Internal("scripted transport poisoned".to_string()))?;

        match routes
            .iter()
            .position(|r| request.url.contains(&r.fragment))
        {
            Some(index) if routes[index].once => Ok(routes.remove(index).response),
            Some(index) => Ok(routes[index].response.clone()),
            None => Ok(PageResponse::new(request.url.clone(), "")),
        }
    }
}
