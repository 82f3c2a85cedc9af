use std::io::{self, Write};

use tracing::info;

use crate::error::DataMallError;

/// Presents a report link to the user.
pub trait LinkOpener {
    fn open_link(&self, url: &str) -> Result<(), DataMallError>;
}

impl<T: LinkOpener + ?Sized> LinkOpener for &T {
    fn open_link(&self, url: &str) -> Result<(), DataMallError> {
        (**self).open_link(url)
    }
}

impl<T: LinkOpener + ?Sized> LinkOpener for Box<T> {
    fn open_link(&self, url: &str) -> Result<(), DataMallError> {
        (**self).open_link(url)
    }
}

/// Hands the link to the host's default browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl LinkOpener for SystemBrowser {
    fn open_link(&self, url: &str) -> Result<(), DataMallError> {
        info!(url, "opening report link in browser");
        open::that(url).map_err(|source| DataMallError::Browser {
            url: url.to_string(),
            source,
        })
    }
}

/// Prints the link on stdout, one per line. Useful on headless hosts.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrintLink;

impl LinkOpener for PrintLink {
    fn open_link(&self, url: &str) -> Result<(), DataMallError> {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{url}")?;
        Ok(())
    }
}
