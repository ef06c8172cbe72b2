//! Scripted [`HttpClient`] for tests: answers requests from a queue of canned responses.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::{Request, Response};

use super::client::HttpClient;

pub struct ScriptedClient {
    responses: Mutex<VecDeque<(u16, Vec<u8>)>>,
    requested: Mutex<Vec<String>>,
}

impl ScriptedClient {
    pub fn new<I, B>(responses: I) -> Self
    where
        I: IntoIterator<Item = (u16, B)>,
        B: Into<Vec<u8>>,
    {
        Self {
            responses: Mutex::new(
                responses
                    .into_iter()
                    .map(|(status, body)| (status, body.into()))
                    .collect(),
            ),
            requested: Mutex::new(Vec::new()),
        }
    }

    /// URLs requested so far, in order.
    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for ScriptedClient {
    async fn execute(&self, req: Request) -> reqwest::Result<Response> {
        self.requested.lock().unwrap().push(req.url().to_string());
        let (status, body) = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or((404, Vec::new()));

        let response = http::Response::builder()
            .status(status)
            .body(body)
            .unwrap();
        Ok(Response::from(response))
    }
}
