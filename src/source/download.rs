// src/source/download.rs

//! Package downloads over HTTP with retry support

use crate::error::{Error, Result};
use crate::install::retry::{RetryPolicy, Sleeper, ThreadSleeper};
use reqwest::blocking::Client;
use std::io;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::info;

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Delay growth between download attempts
const RETRY_STEP: Duration = Duration::from_secs(1);

/// Total sleep across download retries; with the step above this allows 3 attempts
const RETRY_BUDGET: Duration = Duration::from_secs(3);

/// HTTP client wrapper with retry support
pub struct DownloadClient<S: Sleeper = ThreadSleeper> {
    client: Client,
    retry: RetryPolicy,
    sleeper: S,
}

impl DownloadClient<ThreadSleeper> {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::DownloadError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            retry: RetryPolicy::new(RETRY_STEP, RETRY_BUDGET),
            sleeper: ThreadSleeper,
        })
    }
}

impl<S: Sleeper> DownloadClient<S> {
    /// Replace the retry policy and the sleeper used between attempts
    pub fn with_retry<T: Sleeper>(self, retry: RetryPolicy, sleeper: T) -> DownloadClient<T> {
        DownloadClient {
            client: self.client,
            retry,
            sleeper,
        }
    }

    /// Download `url` into a fresh temporary file
    ///
    /// Transport errors are retried; an HTTP error status is not. The file
    /// is deleted when the returned handle is dropped or closed.
    pub fn download_to_temp(&self, url: &str) -> Result<NamedTempFile> {
        info!("Downloading {}", url);

        let mut response = self
            .retry
            .run(&self.sleeper, |_| self.client.get(url).send())
            .map_err(|exhausted| {
                Error::DownloadError(format!(
                    "Failed to download {} after {} attempts: {}",
                    url, exhausted.attempts, exhausted.last_error
                ))
            })?;

        if !response.status().is_success() {
            return Err(Error::DownloadError(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        let mut temp = tempfile::Builder::new()
            .prefix("parcel-")
            .suffix(".zip")
            .tempfile()
            .map_err(|e| Error::IoError(format!("Failed to create temporary file: {}", e)))?;

        io::copy(&mut response, temp.as_file_mut()).map_err(|e| {
            Error::DownloadError(format!("Failed to write downloaded data: {}", e))
        })?;

        info!("Downloaded {} to {}", url, temp.path().display());
        Ok(temp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    #[derive(Default)]
    struct RecordingSleeper {
        sleeps: RefCell<Vec<Duration>>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.sleeps.borrow_mut().push(duration);
        }
    }

    /// Answer a single request with `response` and return the URL to fetch
    fn serve_once(response: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = [0u8; 4096];
            let _ = stream.read(&mut request);
            stream.write_all(response).unwrap();
        });

        format!("http://{}/parcel-dev/hello/raw/master/package.zip", addr)
    }

    fn client(sleeper: &RecordingSleeper) -> DownloadClient<&RecordingSleeper> {
        DownloadClient {
            client: Client::builder().no_proxy().build().unwrap(),
            retry: RetryPolicy::new(RETRY_STEP, RETRY_BUDGET),
            sleeper,
        }
    }

    #[test]
    fn test_download_to_temp() {
        let url = serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 7\r\nConnection: close\r\n\r\npackage");
        let sleeper = RecordingSleeper::default();

        let temp = client(&sleeper).download_to_temp(&url).unwrap();
        assert_eq!(std::fs::read(temp.path()).unwrap(), b"package".to_vec());
        assert!(sleeper.sleeps.borrow().is_empty());

        let path = temp.path().to_path_buf();
        temp.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_http_error_is_not_retried() {
        let url = serve_once(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        let sleeper = RecordingSleeper::default();

        let result = client(&sleeper).download_to_temp(&url);
        assert!(matches!(result, Err(Error::DownloadError(msg)) if msg.contains("404")));
        assert!(sleeper.sleeps.borrow().is_empty());
    }

    #[test]
    fn test_transport_errors_are_retried() {
        // Nothing listens on a port whose listener was dropped
        let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
        let url = format!("http://{}/package.zip", addr);
        let sleeper = RecordingSleeper::default();

        let result = client(&sleeper).download_to_temp(&url);
        assert!(
            matches!(&result, Err(Error::DownloadError(msg)) if msg.contains("after 3 attempts")),
            "got {:?}",
            result
        );
        assert_eq!(
            *sleeper.sleeps.borrow(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }
}
