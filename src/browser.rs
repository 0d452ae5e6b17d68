use crate::{Result, WizardError};

/// Open a URL in the user's default web browser
///
/// Used to send the user to the Google consent screen. Callers treat a failure
/// as non-fatal and print the URL instead.
///
/// # Errors
///
/// Returns an error if the browser cannot be launched
///
/// # Example
///
/// ```no_run
/// use google_auth_wizard::open_browser;
///
/// # fn main() {
/// let url = "https://accounts.google.com/o/oauth2/auth";
/// if let Err(e) = open_browser(url) {
///     println!("{e}. Please open manually: {url}");
/// }
/// # }
/// ```
pub fn open_browser(url: &str) -> Result<()> {
    webbrowser::open(url).map_err(|e| WizardError::BrowserLaunch(e.to_string()))
}
