//! Scripted fetcher for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{Fetcher, Request, Response};
use crate::error::FetchError;

/// Serves canned responses by URL and records every request it sees.
/// Unknown URLs fail as network errors.
#[derive(Default)]
pub struct MockFetcher {
    routes: Mutex<HashMap<String, Result<(u16, Vec<u8>), String>>>,
    requests: Mutex<Vec<Request>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, status: u16, body: impl Into<Vec<u8>>) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok((status, body.into())));
    }

    pub fn fail(&self, url: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Err("connection refused".to_string()));
    }

    pub fn calls(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.as_str() == url)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: Request) -> Result<Response, FetchError> {
        let url = request.url.to_string();
        self.requests.lock().unwrap().push(request);
        let route = self.routes.lock().unwrap().get(&url).cloned();
        match route {
            Some(Ok((status, body))) => Ok(Response::new(url, status, body)),
            Some(Err(message)) => Err(FetchError::Network { url, message }),
            None => Err(FetchError::Network {
                url,
                message: "no route".to_string(),
            }),
        }
    }
}
