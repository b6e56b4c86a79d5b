//! Headless Chromium renderer

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use chromiumoxide::cdp::browser_protocol::page::{CaptureSnapshotFormat, CaptureSnapshotParams};
use chromiumoxide::fetcher::{BrowserFetcher, BrowserFetcherOptions};
use futures::StreamExt;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tracing::{error, info, trace, warn};

use super::{RenderOutput, RenderRequest, RenderedPage, Renderer};
use crate::config::ConvertConfig;
use crate::error::SinglefileError;

/// Drives a local Chrome/Chromium through the capture relay
///
/// Sequence per page: navigate, wait `settle_delay`, scroll to the bottom
/// over `scroll_duration`, wait `settle_delay` again, capture. Startup and
/// navigation together are bounded by `dial_timeout`.
#[derive(Debug, Clone)]
pub struct ChromiumRenderer {
    headless: bool,
    settle_delay: Duration,
    scroll_duration: Duration,
    dial_timeout: Duration,
    user_agent: String,
}

impl ChromiumRenderer {
    #[must_use]
    pub fn from_config(config: &ConvertConfig) -> Self {
        Self {
            headless: config.headless(),
            settle_delay: config.settle_delay(),
            scroll_duration: config.scroll_duration(),
            dial_timeout: config.dial_timeout(),
            user_agent: config.user_agent().to_string(),
        }
    }

    async fn run(&self, request: &RenderRequest) -> Result<RenderedPage> {
        // Outlives the timed launch so a timeout still removes it
        let profile = profile_dir()?;
        let session = tokio::time::timeout(self.dial_timeout, self.open(request, profile.path()))
            .await
            .with_context(|| {
                format!(
                    "renderer did not load {} within {:?}",
                    request.page_url, self.dial_timeout
                )
            })??;

        let captured = self.settle_and_capture(&session.page, request.output).await;
        session.close().await;
        if let Err(e) = profile.close() {
            trace!("cannot remove browser profile: {e}");
        }
        captured
    }

    async fn open(&self, request: &RenderRequest, user_data_dir: &Path) -> Result<Session> {
        let (browser, handler) =
            launch_browser(self.headless, &request.proxy_url, &self.user_agent, user_data_dir)
                .await?;

        let page = browser
            .new_page(request.page_url.as_str())
            .await
            .with_context(|| format!("cannot open {}", request.page_url))?;
        page.wait_for_navigation()
            .await
            .with_context(|| format!("navigation to {} failed", request.page_url))?;

        Ok(Session {
            browser,
            handler,
            page,
        })
    }

    async fn settle_and_capture(&self, page: &Page, output: RenderOutput) -> Result<RenderedPage> {
        tokio::time::sleep(self.settle_delay).await;
        let script = scroll_script(self.scroll_duration);
        page.evaluate(script.as_str())
            .await
            .context("scroll script failed")?;
        // The scroll runs inside the page; wait it out before settling again
        tokio::time::sleep(self.scroll_duration + self.settle_delay).await;

        match output {
            RenderOutput::Document => {
                let html = page.content().await.context("cannot read rendered document")?;
                Ok(RenderedPage::Document(html))
            }
            RenderOutput::Snapshot => {
                let snapshot = page
                    .execute(CaptureSnapshotParams {
                        format: Some(CaptureSnapshotFormat::Mhtml),
                    })
                    .await
                    .context("cannot capture snapshot")?;
                Ok(RenderedPage::Snapshot(snapshot.result.data.clone().into_bytes()))
            }
        }
    }
}

impl Renderer for ChromiumRenderer {
    async fn render(&self, request: &RenderRequest) -> crate::error::Result<RenderedPage> {
        info!("rendering {} via {}", request.page_url, request.proxy_url);
        self.run(request)
            .await
            .map_err(|e| SinglefileError::Render(format!("{e:#}")))
    }
}

struct Session {
    browser: Browser,
    handler: JoinHandle<()>,
    page: Page,
}

impl Session {
    async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("browser close failed: {e}");
        }
        if let Err(e) = self.browser.wait().await {
            trace!("browser wait failed: {e}");
        }
        self.handler.abort();
    }
}

/// Fresh browser profile directory, removed when dropped
fn profile_dir() -> Result<TempDir> {
    tempfile::Builder::new()
        .prefix("webarchive_singlefile_")
        .tempdir()
        .context("cannot create browser profile directory")
}

/// Scroll from top to `scrollHeight` over `duration` using timers
fn scroll_script(duration: Duration) -> String {
    format!(
        r"(() => {{
    const total = Math.max(document.documentElement.scrollHeight, document.body ? document.body.scrollHeight : 0);
    const duration = {ms};
    const start = Date.now();
    const step = () => {{
        const t = duration > 0 ? Math.min(1, (Date.now() - start) / duration) : 1;
        window.scrollTo(0, total * t);
        if (t < 1) {{ setTimeout(step, 16); }}
    }};
    step();
    return total;
}})()",
        ms = duration.as_millis()
    )
}

/// Find a Chrome/Chromium executable: `CHROMIUM_PATH`, well-known locations, then `PATH`
pub fn find_browser_executable() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CHROMIUM_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
        warn!("CHROMIUM_PATH points to missing file {}", path.display());
    }

    let candidates: &[&str] = if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\Chromium\Application\chrome.exe",
        ]
    } else if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/opt/homebrew/bin/chromium",
        ]
    } else {
        &[
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
        ]
    };
    if let Some(found) = candidates.iter().map(PathBuf::from).find(|p| p.exists()) {
        return Some(found);
    }

    if cfg!(target_os = "windows") {
        return None;
    }
    ["chromium", "chromium-browser", "google-chrome", "chrome"]
        .iter()
        .filter_map(|cmd| Command::new("which").arg(cmd).output().ok())
        .filter(|out| out.status.success())
        .map(|out| String::from_utf8_lossy(&out.stdout).trim().to_string())
        .find(|p| !p.is_empty())
        .map(PathBuf::from)
}

/// Download a Chromium build into the user cache directory
async fn download_managed_browser() -> Result<PathBuf> {
    let cache_dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("webarchive-singlefile")
        .join("chromium");
    std::fs::create_dir_all(&cache_dir).context("cannot create browser cache directory")?;

    info!("downloading Chromium into {}", cache_dir.display());
    let fetcher = BrowserFetcher::new(
        BrowserFetcherOptions::builder()
            .with_path(&cache_dir)
            .build()
            .context("browser fetcher options")?,
    );
    let revision = fetcher.fetch().await.context("cannot download Chromium")?;
    Ok(revision.executable_path)
}

async fn launch_browser(
    headless: bool,
    proxy_url: &str,
    user_agent: &str,
    user_data_dir: &Path,
) -> Result<(Browser, JoinHandle<()>)> {
    let executable = match find_browser_executable() {
        Some(path) => path,
        None => download_managed_browser().await?,
    };
    info!("using browser {}", executable.display());

    let mut builder = BrowserConfigBuilder::default()
        .request_timeout(Duration::from_secs(30))
        .window_size(1920, 1080)
        .user_data_dir(user_data_dir)
        .chrome_executable(executable);
    builder = if headless {
        builder.headless_mode(HeadlessMode::default())
    } else {
        builder.with_head()
    };

    let config = builder
        .arg(format!("--user-agent={user_agent}"))
        .arg(format!("--proxy-server={proxy_url}"))
        // Loopback origins must be captured too
        .arg("--proxy-bypass-list=<-loopback>")
        .arg("--ignore-certificate-errors")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--disable-background-networking")
        .arg("--disable-background-timer-throttling")
        .arg("--disable-backgrounding-occluded-windows")
        .arg("--disable-renderer-backgrounding")
        .arg("--disable-breakpad")
        .arg("--disable-client-side-phishing-detection")
        .arg("--disable-default-apps")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-extensions")
        .arg("--disable-features=site-per-process,Translate")
        .arg("--disable-hang-monitor")
        .arg("--disable-ipc-flooding-protection")
        .arg("--disable-popup-blocking")
        .arg("--disable-prompt-on-repost")
        .arg("--disable-sync")
        .arg("--force-color-profile=srgb")
        .arg("--metrics-recording-only")
        .arg("--password-store=basic")
        .arg("--use-mock-keychain")
        .arg("--no-sandbox")
        .build()
        .map_err(|e| anyhow::anyhow!("cannot build browser config: {e}"))?;

    let (browser, mut handler) = Browser::launch(config)
        .await
        .context("cannot launch browser")?;

    let handler_task = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                let message = e.to_string();
                // chromiumoxide does not know every CDP message newer browsers send
                if message.contains("data did not match any variant of untagged enum Message")
                    || message.contains("Failed to deserialize WS response")
                {
                    trace!("ignored CDP message: {message}");
                } else {
                    error!("browser handler error: {e:?}");
                }
            }
        }
        trace!("browser handler finished");
    });

    Ok((browser, handler_task))
}
