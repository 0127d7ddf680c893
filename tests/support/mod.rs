//! Shared fakes and fixtures for integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use parcelport_core::{
    Address, HttpClient, HttpError, HttpErrorKind, HttpFuture, HttpRequest, HttpResponse, Parcel,
};

/// Transport that replays a fixed script of outcomes and records every request.
#[derive(Default)]
pub struct ScriptedHttpClient {
    script: Mutex<VecDeque<Result<HttpResponse, HttpError>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttpClient {
    pub fn new(script: Vec<Result<HttpResponse, HttpError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn responding(responses: Vec<HttpResponse>) -> Self {
        Self::new(responses.into_iter().map(Ok).collect())
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().expect("request log").clone()
    }
}

impl HttpClient for ScriptedHttpClient {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
        self.requests.lock().expect("request log").push(request);
        let next = self
            .script
            .lock()
            .expect("script")
            .pop_front()
            .unwrap_or_else(|| {
                Err(HttpError::new(
                    HttpErrorKind::Request,
                    "scripted transport has no response left",
                ))
            });
        Box::pin(async move { next })
    }
}

/// Transport answering through a closure, for behavior that depends on the request.
pub struct FnHttpClient<F> {
    respond: F,
    requests: Mutex<Vec<HttpRequest>>,
    calls: AtomicUsize,
}

impl<F> FnHttpClient<F>
where
    F: Fn(&HttpRequest) -> Result<HttpResponse, HttpError> + Send + Sync,
{
    pub fn new(respond: F) -> Self {
        Self {
            respond,
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().expect("request log").clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_to(&self, url_fragment: &str) -> usize {
        self.requests()
            .iter()
            .filter(|request| request.url.contains(url_fragment))
            .count()
    }
}

impl<F> HttpClient for FnHttpClient<F>
where
    F: Fn(&HttpRequest) -> Result<HttpResponse, HttpError> + Send + Sync,
{
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = (self.respond)(&request);
        self.requests.lock().expect("request log").push(request);
        Box::pin(async move { outcome })
    }
}

pub fn address() -> Address {
    Address::new("Ada Lovelace", "Main St 1", "1011AB", "Amsterdam", "NL").expect("valid address")
}

pub fn sender() -> Address {
    Address::new("Webshop BV", "Dock 4", "3011AA", "Rotterdam", "NL").expect("valid sender")
}

pub fn parcel(reference: &str) -> Parcel {
    Parcel::new(reference, address(), 1_200).expect("valid parcel")
}
