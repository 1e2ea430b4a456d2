//! Outbound and inbound interception.
//!
//! Request interceptors run before serialization and auth, in
//! registration order; response interceptors run on the raw response
//! before deserialization. Both mutate in place and cannot suspend the
//! exchange, which keeps the chain free of re-entrancy.

use std::sync::Arc;

use crate::request::SerializedRequest;
use crate::response::RawResponse;

pub trait RequestInterceptor: Send + Sync {
    fn intercept(&self, request: &mut SerializedRequest);
}

pub trait ResponseInterceptor: Send + Sync {
    fn intercept(&self, response: &mut RawResponse);
}

impl<F: Fn(&mut SerializedRequest) + Send + Sync> RequestInterceptor for F {
    fn intercept(&self, request: &mut SerializedRequest) {
        self(request)
    }
}

impl<F: Fn(&mut RawResponse) + Send + Sync> ResponseInterceptor for F {
    fn intercept(&self, response: &mut RawResponse) {
        self(response)
    }
}

#[derive(Clone, Default)]
pub struct InterceptorChain {
    request: Vec<Arc<dyn RequestInterceptor>>,
    response: Vec<Arc<dyn ResponseInterceptor>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_request(&mut self, interceptor: Arc<dyn RequestInterceptor>) {
        self.request.push(interceptor);
    }

    pub fn add_response(&mut self, interceptor: Arc<dyn ResponseInterceptor>) {
        self.response.push(interceptor);
    }

    pub fn run_request(&self, request: &mut SerializedRequest) {
        for interceptor in &self.request {
            interceptor.intercept(request);
        }
    }

    pub fn run_response(&self, response: &mut RawResponse) {
        for interceptor in &self.response {
            interceptor.intercept(response);
        }
    }
}
