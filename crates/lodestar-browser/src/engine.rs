use crate::egress::EgressRoute;
use crate::error::{BrowserError, Result};
use crate::session::{BrowsingSession, SessionFactory};
use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::Page;
use futures_util::stream::StreamExt;
use lodestar_core::BrowserConfig;
use std::sync::Arc;
use std::time::Duration;

/// One launched Chromium process shared by every session it hands out.
pub struct BrowserEngine {
    browser: Arc<Browser>,
    navigation_timeout: Duration,
}

impl BrowserEngine {
    /// Launch Chromium with the given settings.
    pub async fn launch(config: &BrowserConfig) -> Result<Self> {
        let navigation_timeout = Duration::from_secs(config.navigation_timeout_secs);
        let mut builder = ChromiumConfig::builder()
            .no_sandbox()
            .window_size(config.window_width, config.window_height)
            .request_timeout(navigation_timeout);
        if !config.headless {
            builder = builder.with_head();
        }
        let chromium_config = builder.build().map_err(BrowserError::ChromiumError)?;

        let (browser, mut handler) = Browser::launch(chromium_config)
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;

        // Spawn browser handler
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!(error = %e, "chromium handler event error");
                }
            }
        });

        tracing::info!(headless = config.headless, "browser launched");
        Ok(Self {
            browser: Arc::new(browser),
            navigation_timeout,
        })
    }

    /// Factory that opens a fresh tab per pooled session.
    ///
    /// Proxied routes get their own browser context so each tab's traffic
    /// leaves through the endpoint of the identity it was created for.
    pub fn session_factory(&self) -> ChromiumSessionFactory {
        ChromiumSessionFactory {
            browser: Arc::clone(&self.browser),
            navigation_timeout: self.navigation_timeout,
        }
    }
}

/// [`SessionFactory`] backed by tabs of a shared [`BrowserEngine`].
#[derive(Clone)]
pub struct ChromiumSessionFactory {
    browser: Arc<Browser>,
    navigation_timeout: Duration,
}

#[async_trait::async_trait]
impl SessionFactory<ChromiumSession> for ChromiumSessionFactory {
    async fn create(&self, route: &EgressRoute) -> Result<ChromiumSession> {
        if route.is_direct() {
            let page = self
                .browser
                .new_page("about:blank")
                .await
                .map_err(|e| BrowserError::SessionCreation(e.to_string()))?;
            return Ok(ChromiumSession {
                page,
                browser: Arc::clone(&self.browser),
                context: None,
                navigation_timeout: self.navigation_timeout,
            });
        }

        let context = self.create_proxy_context(&route.endpoint).await?;
        let params = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context.clone())
            .build()
            .map_err(BrowserError::SessionCreation)?;
        let page = match self.browser.new_page(params).await {
            Ok(page) => page,
            Err(e) => {
                dispose_context(&self.browser, context).await;
                return Err(BrowserError::SessionCreation(e.to_string()));
            }
        };
        tracing::debug!(identity = %route.identity_id, "opened proxied browser context");
        Ok(ChromiumSession {
            page,
            browser: Arc::clone(&self.browser),
            context: Some(context),
            navigation_timeout: self.navigation_timeout,
        })
    }
}

impl ChromiumSessionFactory {
    async fn create_proxy_context(&self, endpoint: &str) -> Result<BrowserContextId> {
        let params = CreateBrowserContextParams::builder()
            .proxy_server(endpoint)
            .build();
        let response = self
            .browser
            .execute(params)
            .await
            .map_err(|e| BrowserError::SessionCreation(e.to_string()))?;
        Ok(response.result.browser_context_id)
    }
}

async fn dispose_context(browser: &Browser, context: BrowserContextId) {
    if let Err(e) = browser
        .execute(DisposeBrowserContextParams::new(context))
        .await
    {
        tracing::warn!(error = %e, "failed to dispose browser context");
    }
}

/// A single Chromium tab, plus the proxy context it lives in when proxied.
pub struct ChromiumSession {
    page: Page,
    browser: Arc<Browser>,
    context: Option<BrowserContextId>,
    navigation_timeout: Duration,
}

impl ChromiumSession {
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Navigate to `url` and return the rendered HTML.
    pub async fn content(&self, url: &str) -> Result<String> {
        let navigate = async {
            self.page
                .goto(url)
                .await
                .map_err(|e| BrowserError::NavigationError(e.to_string()))?;
            self.page
                .wait_for_navigation()
                .await
                .map_err(|e| BrowserError::NavigationError(e.to_string()))?;
            self.page
                .content()
                .await
                .map_err(|e| BrowserError::ChromiumError(e.to_string()))
        };

        tokio::time::timeout(self.navigation_timeout, navigate)
            .await
            .map_err(|_| BrowserError::Timeout(url.to_string()))?
    }
}

#[async_trait::async_trait]
impl BrowsingSession for ChromiumSession {
    async fn close(&self) -> Result<()> {
        let closed = self
            .page
            .clone()
            .close()
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()));
        if let Some(context) = &self.context {
            dispose_context(&self.browser, context.clone()).await;
        }
        closed
    }
}
