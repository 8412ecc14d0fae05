//! Best-effort opening of the verification URL.

use std::sync::Mutex;

/// Opens a URL for the user. Failures never abort a login.
pub trait BrowserLauncher: Send + Sync {
    fn open(&self, url: &str) -> std::io::Result<()>;
}

/// Uses the platform's default browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> std::io::Result<()> {
        webbrowser::open(url)
    }
}

/// Never opens anything; the user follows the printed link.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBrowser;

impl BrowserLauncher for NoBrowser {
    fn open(&self, _url: &str) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "browser launching disabled",
        ))
    }
}

/// Records every URL it was asked to open.
#[derive(Debug, Default)]
pub struct RecordingBrowser {
    opened: Mutex<Vec<String>>,
}

impl RecordingBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl BrowserLauncher for RecordingBrowser {
    fn open(&self, url: &str) -> std::io::Result<()> {
        if let Ok(mut opened) = self.opened.lock() {
            opened.push(url.to_string());
        }
        Ok(())
    }
}

/// Try `launcher`, always telling the user where to go.
///
/// Returns whether the launcher reported success.
pub fn open_verification_url(launcher: &dyn BrowserLauncher, url: &str) -> bool {
    match launcher.open(url) {
        Ok(()) => {
            eprintln!("Opening: {url}");
            true
        }
        Err(e) => {
            tracing::warn!(error = %e, "could not open browser");
            eprintln!("Open this link in your browser: {url}");
            false
        }
    }
}
