//! Headless Chrome adapter for HTML/URL screenshots.
//!
//! Every request launches its own browser with a throwaway profile directory,
//! loads the page, captures one full-page PNG and shuts the browser down.
//! Nothing is shared between requests, so a crashed or hung page can only
//! take down its own render.
//!
//! The render runs in a spawned task under the page timeout. On timeout the
//! task is aborted; dropping it kills the browser and deletes the profile
//! and output files.

use crate::adapters::HtmlRenderer;
use crate::config::BrowserSettings;
use crate::error::ConvertError;
use crate::request::{HtmlSource, HtmlToImageRequest};
use crate::scratch::{ScratchDir, ScratchFile, ScratchSpace};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::handler::viewport::Viewport as CdpViewport;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// [`HtmlRenderer`] backed by chromiumoxide.
#[derive(Debug, Clone)]
pub struct ChromiumRenderer {
    settings: BrowserSettings,
    scratch: ScratchSpace,
}

impl ChromiumRenderer {
    /// `scratch` receives the per-request Chrome profile directories.
    pub fn new(settings: BrowserSettings, scratch: ScratchSpace) -> Self {
        Self { settings, scratch }
    }
}

#[async_trait]
impl HtmlRenderer for ChromiumRenderer {
    async fn screenshot(
        &self,
        request: &HtmlToImageRequest,
        output: ScratchFile,
    ) -> Result<ScratchFile, ConvertError> {
        let profile = self.scratch.acquire_dir("chrome-profile").await?;
        let settings = self.settings.clone();
        let request = request.clone();
        let secs = settings.page_timeout_secs;

        let mut task = tokio::spawn(capture(settings, request, output, profile));
        match tokio::time::timeout(Duration::from_secs(secs), &mut task).await {
            Ok(joined) => joined.map_err(ConvertError::from).and_then(|r| r),
            Err(_) => {
                task.abort();
                warn!("Browser render exceeded {}s, aborted", secs);
                Err(ConvertError::Timeout {
                    stage: "browser render",
                    secs,
                })
            }
        }
    }
}

fn browser_error(step: &'static str) -> impl Fn(chromiumoxide::error::CdpError) -> ConvertError {
    move |e| ConvertError::Browser(format!("{step}: {e}"))
}

fn browser_config(
    settings: &BrowserSettings,
    request: &HtmlToImageRequest,
    profile: &Path,
) -> Result<BrowserConfig, ConvertError> {
    let vp = request.viewport;
    let mut builder = BrowserConfig::builder()
        .window_size(vp.width, vp.height)
        .viewport(CdpViewport {
            width: vp.width,
            height: vp.height,
            device_scale_factor: None,
            emulating_mobile: false,
            is_landscape: false,
            has_touch: false,
        })
        .user_data_dir(profile)
        .arg("--hide-scrollbars");
    if let Some(exe) = &settings.chrome_executable {
        builder = builder.chrome_executable(exe);
    }
    if settings.no_sandbox {
        builder = builder.no_sandbox();
    }
    builder
        .build()
        .map_err(|e| ConvertError::Browser(format!("invalid browser config: {e}")))
}

/// Launch, load, capture, close. Owns both guards so they are dropped (and
/// the files removed) wherever this future ends.
async fn capture(
    settings: BrowserSettings,
    request: HtmlToImageRequest,
    output: ScratchFile,
    profile: ScratchDir,
) -> Result<ScratchFile, ConvertError> {
    let config = browser_config(&settings, &request, profile.path())?;
    let (mut browser, mut handler) = Browser::launch(config)
        .await
        .map_err(browser_error("launch"))?;

    let handler_task = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if event.is_err() {
                break;
            }
        }
    });
    debug!("Browser launched for {} viewport", request.viewport);

    let shot = render(&browser, &request, output.path()).await;

    if let Err(e) = browser.close().await {
        debug!("Browser close failed: {}", e);
    }
    if let Err(e) = browser.wait().await {
        debug!("Browser wait failed: {}", e);
    }
    handler_task.abort();
    drop(profile);

    shot?;
    Ok(output)
}

async fn render(
    browser: &Browser,
    request: &HtmlToImageRequest,
    output: &Path,
) -> Result<(), ConvertError> {
    let page = browser
        .new_page("about:blank")
        .await
        .map_err(browser_error("open page"))?;

    load(&page, &request.source).await?;

    if request.wait_ms > 0 {
        tokio::time::sleep(Duration::from_millis(request.wait_ms)).await;
    }

    let params = ScreenshotParams::builder()
        .format(CaptureScreenshotFormat::Png)
        .full_page(true)
        .build();
    let bytes = page
        .save_screenshot(params, output)
        .await
        .map_err(browser_error("screenshot"))?;
    info!("Captured screenshot ({} bytes)", bytes.len());

    if let Err(e) = page.close().await {
        debug!("Page close failed: {}", e);
    }
    Ok(())
}

async fn load(page: &Page, source: &HtmlSource) -> Result<(), ConvertError> {
    match source {
        HtmlSource::Url(url) => {
            debug!("Navigating to: {}", url);
            page.goto(url.as_str())
                .await
                .map_err(browser_error("navigate"))?;
            page.wait_for_navigation()
                .await
                .map_err(browser_error("wait for load"))?;
        }
        HtmlSource::Inline(html) => {
            debug!("Loading inline document ({} bytes)", html.len());
            page.set_content(html.as_str())
                .await
                .map_err(browser_error("set content"))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Viewport;

    #[test]
    fn config_honours_request_viewport() {
        let request = HtmlToImageRequest {
            source: HtmlSource::Inline("<p>hello</p>".into()),
            viewport: Viewport { width: 640, height: 480 },
            wait_ms: 0,
        };
        let settings = BrowserSettings {
            no_sandbox: true,
            chrome_executable: Some("/usr/bin/chromium".into()),
            ..BrowserSettings::default()
        };
        let tmp = tempfile::tempdir().unwrap();
        assert!(browser_config(&settings, &request, tmp.path()).is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hung_launch_times_out_and_releases_scratch() {
        use std::os::unix::fs::PermissionsExt;

        let bin = tempfile::tempdir().unwrap();
        let exe = bin.path().join("chrome");
        std::fs::write(&exe, "#!/bin/sh\nsleep 5\n").unwrap();
        std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();

        let tmp = tempfile::tempdir().unwrap();
        let scratch = ScratchSpace::new(tmp.path());
        let settings = BrowserSettings {
            page_timeout_secs: 1,
            chrome_executable: Some(exe),
            ..BrowserSettings::default()
        };
        let renderer = ChromiumRenderer::new(settings, scratch.clone());
        let request = HtmlToImageRequest {
            source: HtmlSource::Inline("<p>never rendered</p>".into()),
            viewport: Viewport { width: 320, height: 240 },
            wait_ms: 0,
        };

        let output = scratch.acquire("screenshot", "png").await.unwrap();
        let err = renderer.screenshot(&request, output).await.unwrap_err();
        assert!(matches!(err, ConvertError::Timeout { stage: "browser render", secs: 1 }));
        assert_eq!(err.code(), "timeout");

        // The aborted task drops its guards on the runtime's next turn.
        for _ in 0..50 {
            if scratch.stats().outstanding() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(scratch.stats().outstanding(), 0);
    }

    #[test]
    fn cdp_errors_are_internal() {
        let e = ConvertError::Browser("launch: no chrome".into());
        assert!(!e.is_business());
        assert_eq!(e.code(), "browser_error");
    }
}
